use std::fmt;

/// An outbound control message waiting for send credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PendingAction {
    CommandNotUnderstood = 1 << 0,
    ConnectionRequest = 1 << 1,
    ConnectionResponse = 1 << 2,
    NetFilterSet = 1 << 3,
    NetFilterResponse = 1 << 4,
    MultiAddrSet = 1 << 5,
    MultiAddrResponse = 1 << 6,
}

impl PendingAction {
    /// Every action, highest priority first.
    pub const PRIORITY: [PendingAction; 7] = [
        PendingAction::CommandNotUnderstood,
        PendingAction::ConnectionRequest,
        PendingAction::ConnectionResponse,
        PendingAction::NetFilterSet,
        PendingAction::NetFilterResponse,
        PendingAction::MultiAddrSet,
        PendingAction::MultiAddrResponse,
    ];

    const fn bit(self) -> u8 {
        self as u8
    }
}

/// Set of pending actions, drained one per send credit in
/// [`PendingAction::PRIORITY`] order.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingActions(u8);

impl PendingActions {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, action: PendingAction) {
        self.0 |= action.bit();
    }

    pub fn remove(&mut self, action: PendingAction) {
        self.0 &= !action.bit();
    }

    pub const fn contains(&self, action: PendingAction) -> bool {
        self.0 & action.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Remove and return the highest-priority pending action.
    pub fn pop(&mut self) -> Option<PendingAction> {
        let next = self.peek()?;
        self.remove(next);
        Some(next)
    }

    pub fn peek(&self) -> Option<PendingAction> {
        PendingAction::PRIORITY
            .into_iter()
            .find(|action| self.contains(*action))
    }

    pub fn iter(&self) -> impl Iterator<Item = PendingAction> + '_ {
        PendingAction::PRIORITY
            .into_iter()
            .filter(move |action| self.contains(*action))
    }
}

impl fmt::Debug for PendingActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
