//! L2CAP channel lifecycle records.
//!
//! Transports report channel lifecycle changes as opaque event records
//! (`[code, len, fields...]`). Fields sit at fixed offsets, integers are
//! little-endian and addresses are stored byte-reversed.

use crate::addr::BdAddr;
use crate::endian::{read_u16_le, write_u16_le};
use crate::error::{Result, TransportError};

pub const L2CAP_EVENT_CHANNEL_OPENED: u8 = 0x70;
pub const L2CAP_EVENT_CHANNEL_CLOSED: u8 = 0x71;
pub const L2CAP_EVENT_INCOMING_CONNECTION: u8 = 0x72;
pub const L2CAP_EVENT_CAN_SEND_NOW: u8 = 0x78;

const CHANNEL_OPENED_LEN: usize = 21;
const CHANNEL_CLOSED_LEN: usize = 4;
const INCOMING_CONNECTION_LEN: usize = 16;
const CAN_SEND_NOW_LEN: usize = 4;

/// A parsed L2CAP lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2capEvent {
    /// A remote device wants to open a channel on a registered PSM.
    IncomingConnection {
        addr: BdAddr,
        handle: u16,
        psm: u16,
        local_cid: u16,
        remote_cid: u16,
    },
    /// A channel finished opening (or failed to, when `status != 0`).
    ChannelOpened {
        status: u8,
        addr: BdAddr,
        handle: u16,
        psm: u16,
        local_cid: u16,
        remote_cid: u16,
        local_mtu: u16,
        remote_mtu: u16,
    },
    /// A channel was closed by either side.
    ChannelClosed { local_cid: u16 },
    /// One packet may now be sent on the channel.
    CanSendNow { local_cid: u16 },
}

impl L2capEvent {
    /// Parse an event record.
    ///
    /// Returns `Ok(None)` for event codes that are not L2CAP lifecycle
    /// events, and an error when a known record is shorter than its layout.
    pub fn parse(record: &[u8]) -> Result<Option<Self>> {
        let Some(&code) = record.first() else {
            return Ok(None);
        };

        let event = match code {
            L2CAP_EVENT_INCOMING_CONNECTION => {
                check_len(record, INCOMING_CONNECTION_LEN, "incoming-connection event")?;
                L2capEvent::IncomingConnection {
                    addr: BdAddr::from_reversed_slice(&record[2..8])?,
                    handle: field(record, 8)?,
                    psm: field(record, 10)?,
                    local_cid: field(record, 12)?,
                    remote_cid: field(record, 14)?,
                }
            }
            L2CAP_EVENT_CHANNEL_OPENED => {
                check_len(record, CHANNEL_OPENED_LEN, "channel-opened event")?;
                L2capEvent::ChannelOpened {
                    status: record[2],
                    addr: BdAddr::from_reversed_slice(&record[3..9])?,
                    handle: field(record, 9)?,
                    psm: field(record, 11)?,
                    local_cid: field(record, 13)?,
                    remote_cid: field(record, 15)?,
                    local_mtu: field(record, 17)?,
                    remote_mtu: field(record, 19)?,
                }
            }
            L2CAP_EVENT_CHANNEL_CLOSED => {
                check_len(record, CHANNEL_CLOSED_LEN, "channel-closed event")?;
                L2capEvent::ChannelClosed {
                    local_cid: field(record, 2)?,
                }
            }
            L2CAP_EVENT_CAN_SEND_NOW => {
                check_len(record, CAN_SEND_NOW_LEN, "can-send-now event")?;
                L2capEvent::CanSendNow {
                    local_cid: field(record, 2)?,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    /// Serialize into the record layout [`parse`](Self::parse) accepts.
    pub fn to_record(&self) -> Vec<u8> {
        match *self {
            L2capEvent::IncomingConnection {
                addr,
                handle,
                psm,
                local_cid,
                remote_cid,
            } => {
                let mut record = header(L2CAP_EVENT_INCOMING_CONNECTION, INCOMING_CONNECTION_LEN);
                record[2..8].copy_from_slice(addr.reversed().as_bytes());
                write_u16_le(&mut record, 8, handle);
                write_u16_le(&mut record, 10, psm);
                write_u16_le(&mut record, 12, local_cid);
                write_u16_le(&mut record, 14, remote_cid);
                record
            }
            L2capEvent::ChannelOpened {
                status,
                addr,
                handle,
                psm,
                local_cid,
                remote_cid,
                local_mtu,
                remote_mtu,
            } => {
                let mut record = header(L2CAP_EVENT_CHANNEL_OPENED, CHANNEL_OPENED_LEN);
                record[2] = status;
                record[3..9].copy_from_slice(addr.reversed().as_bytes());
                write_u16_le(&mut record, 9, handle);
                write_u16_le(&mut record, 11, psm);
                write_u16_le(&mut record, 13, local_cid);
                write_u16_le(&mut record, 15, remote_cid);
                write_u16_le(&mut record, 17, local_mtu);
                write_u16_le(&mut record, 19, remote_mtu);
                record
            }
            L2capEvent::ChannelClosed { local_cid } => {
                let mut record = header(L2CAP_EVENT_CHANNEL_CLOSED, CHANNEL_CLOSED_LEN);
                write_u16_le(&mut record, 2, local_cid);
                record
            }
            L2capEvent::CanSendNow { local_cid } => {
                let mut record = header(L2CAP_EVENT_CAN_SEND_NOW, CAN_SEND_NOW_LEN);
                write_u16_le(&mut record, 2, local_cid);
                record
            }
        }
    }
}

fn header(code: u8, len: usize) -> Vec<u8> {
    let mut record = vec![0u8; len];
    record[0] = code;
    record[1] = (len - 2) as u8;
    record
}

fn check_len(record: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if record.len() < needed {
        return Err(TransportError::Truncated {
            what,
            needed,
            available: record.len(),
        });
    }
    Ok(())
}

fn field(record: &[u8], pos: usize) -> Result<u16> {
    read_u16_le(record, pos).ok_or(TransportError::Truncated {
        what: "event field",
        needed: pos + 2,
        available: record.len(),
    })
}
