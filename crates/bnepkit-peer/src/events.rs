//! Notifications and data delivered to application handlers.

use std::fmt;
use std::sync::Arc;

use bnepkit_event::catalog::bnep;
use bnepkit_event::{Arg, EventError};
use bnepkit_frame::EthernetFrame;
use bnepkit_transport::endian::read_u16_le;
use bnepkit_transport::BdAddr;
use serde::Serialize;

/// What a handler receives.
#[derive(Debug, Clone, Copy)]
pub enum Packet<'a> {
    /// An encoded notification record; decode with [`BnepEvent::parse`].
    Event(&'a [u8]),
    /// An Ethernet frame received on a connected channel.
    Data { cid: u16, frame: &'a EthernetFrame },
}

/// Application callback bound to a service or an outgoing channel.
pub type PacketHandler = Arc<dyn Fn(Packet<'_>) + Send + Sync>;

/// Wrap a closure as a [`PacketHandler`].
pub fn handler<F>(f: F) -> PacketHandler
where
    F: Fn(Packet<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// BNEP notification records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BnepEvent {
    ChannelOpened {
        status: u8,
        cid: u16,
        source_uuid: u16,
        dest_uuid: u16,
        max_frame_size: u16,
        remote_addr: BdAddr,
        con_handle: u16,
    },
    ChannelClosed {
        cid: u16,
        source_uuid: u16,
        dest_uuid: u16,
        remote_addr: BdAddr,
    },
    ChannelTimeout {
        cid: u16,
        source_uuid: u16,
        dest_uuid: u16,
        remote_addr: BdAddr,
        state: u8,
    },
    CanSendNow {
        cid: u16,
    },
}

impl BnepEvent {
    pub fn code(&self) -> u8 {
        match self {
            BnepEvent::ChannelOpened { .. } => bnep::EVENT_CHANNEL_OPENED,
            BnepEvent::ChannelClosed { .. } => bnep::EVENT_CHANNEL_CLOSED,
            BnepEvent::ChannelTimeout { .. } => bnep::EVENT_CHANNEL_TIMEOUT,
            BnepEvent::CanSendNow { .. } => bnep::EVENT_CAN_SEND_NOW,
        }
    }

    /// Render the record through the event catalog.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        match *self {
            BnepEvent::ChannelOpened {
                status,
                cid,
                source_uuid,
                dest_uuid,
                max_frame_size,
                remote_addr,
                con_handle,
            } => bnep::CHANNEL_OPENED.render_to_vec(&[
                Arg::from(status),
                Arg::from(cid),
                Arg::from(source_uuid),
                Arg::from(dest_uuid),
                Arg::from(max_frame_size),
                Arg::from(remote_addr),
                Arg::from(con_handle),
            ]),
            BnepEvent::ChannelClosed {
                cid,
                source_uuid,
                dest_uuid,
                remote_addr,
            } => bnep::CHANNEL_CLOSED.render_to_vec(&[
                Arg::from(cid),
                Arg::from(source_uuid),
                Arg::from(dest_uuid),
                Arg::from(remote_addr),
            ]),
            BnepEvent::ChannelTimeout {
                cid,
                source_uuid,
                dest_uuid,
                remote_addr,
                state,
            } => bnep::CHANNEL_TIMEOUT.render_to_vec(&[
                Arg::from(cid),
                Arg::from(source_uuid),
                Arg::from(dest_uuid),
                Arg::from(remote_addr),
                Arg::from(state),
            ]),
            BnepEvent::CanSendNow { cid } => bnep::CAN_SEND_NOW.render_to_vec(&[Arg::from(cid)]),
        }
    }

    /// Decode a record produced by [`encode`](Self::encode). Returns `None`
    /// for other codes and for short records.
    pub fn parse(record: &[u8]) -> Option<Self> {
        let code = *record.first()?;
        let u16_at = |pos| read_u16_le(record, pos);
        let addr_at = |pos: usize| {
            record
                .get(pos..pos + 6)
                .and_then(|bytes| BdAddr::from_reversed_slice(bytes).ok())
        };

        let event = match code {
            bnep::EVENT_CHANNEL_OPENED => BnepEvent::ChannelOpened {
                status: *record.get(2)?,
                cid: u16_at(3)?,
                source_uuid: u16_at(5)?,
                dest_uuid: u16_at(7)?,
                max_frame_size: u16_at(9)?,
                remote_addr: addr_at(11)?,
                con_handle: u16_at(17)?,
            },
            bnep::EVENT_CHANNEL_CLOSED => BnepEvent::ChannelClosed {
                cid: u16_at(2)?,
                source_uuid: u16_at(4)?,
                dest_uuid: u16_at(6)?,
                remote_addr: addr_at(8)?,
            },
            bnep::EVENT_CHANNEL_TIMEOUT => BnepEvent::ChannelTimeout {
                cid: u16_at(2)?,
                source_uuid: u16_at(4)?,
                dest_uuid: u16_at(6)?,
                remote_addr: addr_at(8)?,
                state: *record.get(14)?,
            },
            bnep::EVENT_CAN_SEND_NOW => BnepEvent::CanSendNow { cid: u16_at(2)? },
            _ => return None,
        };
        Some(event)
    }
}

impl fmt::Display for BnepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BnepEvent::ChannelOpened {
                status,
                cid,
                remote_addr,
                max_frame_size,
                ..
            } => write!(
                f,
                "channel-opened cid=0x{cid:04x} peer={remote_addr} status={status} mfs={max_frame_size}"
            ),
            BnepEvent::ChannelClosed {
                cid, remote_addr, ..
            } => write!(f, "channel-closed cid=0x{cid:04x} peer={remote_addr}"),
            BnepEvent::ChannelTimeout {
                cid,
                remote_addr,
                state,
                ..
            } => write!(
                f,
                "channel-timeout cid=0x{cid:04x} peer={remote_addr} state={state}"
            ),
            BnepEvent::CanSendNow { cid } => write!(f, "can-send-now cid=0x{cid:04x}"),
        }
    }
}
