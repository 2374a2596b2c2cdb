//! Per-peer channel record.

use std::fmt;

use bnepkit_frame::{
    FilterResponseCode, MulticastFilter, MulticastRange, NetTypeFilter, NetTypeRange,
    SetupResponseCode,
};
use bnepkit_transport::{BdAddr, PSM_BNEP};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::events::PacketHandler;
use crate::pending::PendingActions;

/// Channel lifecycle. The discriminants appear in channel-timeout records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChannelState {
    Closed = 1,
    WaitForConnectionRequest = 2,
    WaitForConnectionResponse = 3,
    Connected = 4,
}

impl ChannelState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ChannelState::Closed),
            2 => Some(ChannelState::WaitForConnectionRequest),
            3 => Some(ChannelState::WaitForConnectionResponse),
            4 => Some(ChannelState::Connected),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Closed => "closed",
            ChannelState::WaitForConnectionRequest => "wait-for-connection-request",
            ChannelState::WaitForConnectionResponse => "wait-for-connection-response",
            ChannelState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// One BNEP connection to a remote device.
pub struct Channel {
    pub(crate) remote_addr: BdAddr,
    pub(crate) local_addr: BdAddr,
    pub(crate) psm: u16,
    pub(crate) cid: Option<u16>,
    pub(crate) con_handle: u16,
    pub(crate) source_uuid: u16,
    pub(crate) dest_uuid: u16,
    pub(crate) state: ChannelState,
    pub(crate) pending: PendingActions,
    pub(crate) last_control_type: u8,
    pub(crate) setup_response: SetupResponseCode,
    pub(crate) net_filter_response: FilterResponseCode,
    pub(crate) multicast_filter_response: FilterResponseCode,
    pub(crate) retry_count: u8,
    pub(crate) max_frame_size: u16,
    pub(crate) net_filter: NetTypeFilter,
    pub(crate) multicast_filter: MulticastFilter,
    pub(crate) net_filter_out: Vec<NetTypeRange>,
    pub(crate) multicast_filter_out: Vec<MulticastRange>,
    pub(crate) handler: Option<PacketHandler>,
    pub(crate) timer_active: bool,
    pub(crate) waiting_for_can_send_now: bool,
}

impl Channel {
    pub(crate) fn new(remote_addr: BdAddr, local_addr: BdAddr, config: &EngineConfig) -> Self {
        Self {
            remote_addr,
            local_addr,
            psm: PSM_BNEP,
            cid: None,
            con_handle: 0,
            source_uuid: 0,
            dest_uuid: 0,
            state: ChannelState::Closed,
            pending: PendingActions::new(),
            last_control_type: 0,
            setup_response: SetupResponseCode::SUCCESS,
            net_filter_response: FilterResponseCode::SUCCESS,
            multicast_filter_response: FilterResponseCode::SUCCESS,
            retry_count: 0,
            max_frame_size: 0,
            net_filter: NetTypeFilter::new(config.net_filter_capacity),
            multicast_filter: MulticastFilter::new(config.multicast_filter_capacity),
            net_filter_out: Vec::new(),
            multicast_filter_out: Vec::new(),
            handler: None,
            timer_active: false,
            waiting_for_can_send_now: false,
        }
    }

    pub fn remote_addr(&self) -> BdAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> BdAddr {
        self.local_addr
    }

    /// PSM the transport channel was opened on.
    pub fn psm(&self) -> u16 {
        self.psm
    }

    /// Local channel id, once the transport has assigned one.
    pub fn cid(&self) -> Option<u16> {
        self.cid
    }

    pub fn con_handle(&self) -> u16 {
        self.con_handle
    }

    pub fn source_uuid(&self) -> u16 {
        self.source_uuid
    }

    pub fn dest_uuid(&self) -> u16 {
        self.dest_uuid
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    pub fn pending(&self) -> PendingActions {
        self.pending
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// Largest Ethernet payload the channel carries.
    pub fn max_frame_size(&self) -> u16 {
        self.max_frame_size
    }

    /// Protocol-type ranges the peer asked us to apply to outbound frames.
    pub fn net_filter(&self) -> &NetTypeFilter {
        &self.net_filter
    }

    pub fn multicast_filter(&self) -> &MulticastFilter {
        &self.multicast_filter
    }

    pub fn timer_active(&self) -> bool {
        self.timer_active
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            remote_addr: self.remote_addr,
            cid: self.cid,
            state: self.state,
            source_uuid: self.source_uuid,
            dest_uuid: self.dest_uuid,
            max_frame_size: self.max_frame_size,
            net_filters: self.net_filter.len(),
            multicast_filters: self.multicast_filter.len(),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("remote_addr", &self.remote_addr)
            .field("cid", &self.cid)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("source_uuid", &format_args!("0x{:04x}", self.source_uuid))
            .field("dest_uuid", &format_args!("0x{:04x}", self.dest_uuid))
            .field("max_frame_size", &self.max_frame_size)
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub remote_addr: BdAddr,
    pub cid: Option<u16>,
    pub state: ChannelState,
    pub source_uuid: u16,
    pub dest_uuid: u16,
    pub max_frame_size: u16,
    pub net_filters: usize,
    pub multicast_filters: usize,
}
