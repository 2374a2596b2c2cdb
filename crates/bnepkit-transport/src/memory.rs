//! An in-process transport that records every call.
//!
//! `MemoryTransport` never emits events on its own; the caller (a test, or
//! the simulator in the `bnepkit` CLI) feeds lifecycle records back into the
//! engine and inspects the recorded [`TransportAction`]s.

use std::collections::HashSet;

use tracing::trace;

use crate::addr::BdAddr;
use crate::error::{Result, TransportError};
use crate::traits::L2capTransport;

/// Default MTU reported by [`MemoryTransport::max_mtu`].
pub const DEFAULT_MEMORY_MTU: u16 = 1691;

/// One call made against a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAction {
    Register { psm: u16, mtu: u16 },
    Unregister { psm: u16 },
    Create { addr: BdAddr, psm: u16, mtu: u16 },
    Accept { cid: u16 },
    Decline { cid: u16 },
    Disconnect { cid: u16 },
    RequestCanSendNow { cid: u16 },
    Sent { cid: u16, bytes: Vec<u8> },
}

#[derive(Debug)]
pub struct MemoryTransport {
    local_addr: BdAddr,
    max_mtu: u16,
    blocked: HashSet<u16>,
    refuse_create: bool,
    actions: Vec<TransportAction>,
}

impl MemoryTransport {
    pub fn new(local_addr: BdAddr) -> Self {
        Self {
            local_addr,
            max_mtu: DEFAULT_MEMORY_MTU,
            blocked: HashSet::new(),
            refuse_create: false,
            actions: Vec::new(),
        }
    }

    pub fn with_max_mtu(mut self, mtu: u16) -> Self {
        self.max_mtu = mtu;
        self
    }

    /// Grant or withdraw send credit on a channel. Channels have credit
    /// until withdrawn.
    pub fn set_credit(&mut self, cid: u16, available: bool) {
        if available {
            self.blocked.remove(&cid);
        } else {
            self.blocked.insert(cid);
        }
    }

    /// Make subsequent `create_channel` calls fail.
    pub fn refuse_create(&mut self, refuse: bool) {
        self.refuse_create = refuse;
    }

    pub fn actions(&self) -> &[TransportAction] {
        &self.actions
    }

    /// Drain the recorded actions.
    pub fn take_actions(&mut self) -> Vec<TransportAction> {
        std::mem::take(&mut self.actions)
    }

    /// Packets written so far on `cid`, oldest first.
    pub fn sent_packets(&self, cid: u16) -> Vec<&[u8]> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                TransportAction::Sent { cid: c, bytes } if *c == cid => Some(bytes.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Drain only the packets sent on any channel, keeping other actions.
    pub fn take_sent(&mut self) -> Vec<(u16, Vec<u8>)> {
        let mut sent = Vec::new();
        self.actions.retain(|action| match action {
            TransportAction::Sent { cid, bytes } => {
                sent.push((*cid, bytes.clone()));
                false
            }
            _ => true,
        });
        sent
    }

    fn record(&mut self, action: TransportAction) {
        trace!(?action, "memory transport");
        self.actions.push(action);
    }
}

impl L2capTransport for MemoryTransport {
    fn register_service(&mut self, psm: u16, mtu: u16) -> Result<()> {
        self.record(TransportAction::Register { psm, mtu });
        Ok(())
    }

    fn unregister_service(&mut self, psm: u16) {
        self.record(TransportAction::Unregister { psm });
    }

    fn create_channel(&mut self, addr: BdAddr, psm: u16, mtu: u16) -> Result<()> {
        if self.refuse_create {
            return Err(TransportError::CreateFailed(format!(
                "memory transport refuses channels to {addr}"
            )));
        }
        self.record(TransportAction::Create { addr, psm, mtu });
        Ok(())
    }

    fn accept_connection(&mut self, cid: u16) {
        self.record(TransportAction::Accept { cid });
    }

    fn decline_connection(&mut self, cid: u16) {
        self.record(TransportAction::Decline { cid });
    }

    fn disconnect(&mut self, cid: u16) {
        self.record(TransportAction::Disconnect { cid });
    }

    fn can_send_now(&self, cid: u16) -> bool {
        !self.blocked.contains(&cid)
    }

    fn request_can_send_now(&mut self, cid: u16) {
        self.record(TransportAction::RequestCanSendNow { cid });
    }

    fn send_prepared(&mut self, cid: u16, packet: &[u8]) -> Result<()> {
        if self.blocked.contains(&cid) {
            return Err(TransportError::NoCredit(cid));
        }
        if packet.len() > self.max_mtu as usize {
            return Err(TransportError::PacketTooLarge {
                size: packet.len(),
                mtu: self.max_mtu,
            });
        }
        self.record(TransportAction::Sent {
            cid,
            bytes: packet.to_vec(),
        });
        Ok(())
    }

    fn max_mtu(&self) -> u16 {
        self.max_mtu
    }

    fn local_addr(&self) -> BdAddr {
        self.local_addr
    }
}
