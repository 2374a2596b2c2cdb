use bnepkit_transport::endian::read_u16_be;
use bnepkit_transport::{BdAddr, BD_ADDR_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::packet::ETHERTYPE_VLAN;

/// Destination (6) + source (6) + protocol type (2).
pub const ETHERNET_HEADER_LEN: usize = 2 * BD_ADDR_LEN + 2;

/// Bytes of an 802.1Q tag that stay on the wire when a tagged frame is
/// filtered.
pub const VLAN_TAG_LEN: usize = 4;

/// An Ethernet frame as exchanged with the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthernetFrame {
    pub dst: BdAddr,
    pub src: BdAddr,
    pub ethertype: u16,
    #[serde(serialize_with = "crate::hex::serialize")]
    pub payload: Bytes,
}

impl EthernetFrame {
    pub fn new(dst: BdAddr, src: BdAddr, ethertype: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            dst,
            src,
            ethertype,
            payload: payload.into(),
        }
    }

    /// Parse `dst(6) src(6) type(2) payload`.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < ETHERNET_HEADER_LEN {
            return Err(FrameError::EthernetTooShort(frame.len()));
        }
        let dst = BdAddr::from_slice(&frame[..BD_ADDR_LEN])?;
        let src = BdAddr::from_slice(&frame[BD_ADDR_LEN..2 * BD_ADDR_LEN])?;
        let ethertype =
            read_u16_be(frame, 2 * BD_ADDR_LEN).ok_or(FrameError::EthernetTooShort(frame.len()))?;
        Ok(Self {
            dst,
            src,
            ethertype,
            payload: Bytes::copy_from_slice(&frame[ETHERNET_HEADER_LEN..]),
        })
    }

    /// Protocol type the filters see.
    ///
    /// For 802.1Q frames this is the type inside the tag. Returns `None` for
    /// a tagged frame too short to carry one.
    pub fn filter_protocol(&self) -> Option<u16> {
        if self.is_vlan_tagged() {
            read_u16_be(&self.payload, 2)
        } else {
            Some(self.ethertype)
        }
    }

    pub fn is_vlan_tagged(&self) -> bool {
        self.ethertype == ETHERTYPE_VLAN
    }

    /// Same frame with the payload cut to at most `len` bytes.
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.payload.len());
        Self {
            payload: self.payload.slice(..len),
            ..self.clone()
        }
    }

    pub fn wire_len(&self) -> usize {
        ETHERNET_HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        dst.put_slice(self.dst.as_bytes());
        dst.put_slice(self.src.as_bytes());
        dst.put_u16(self.ethertype);
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}
