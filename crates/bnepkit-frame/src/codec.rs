use bnepkit_transport::endian::read_u16_be;
use bnepkit_transport::{BdAddr, BD_ADDR_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::control::ControlMessage;
use crate::error::{FrameError, Result};
use crate::ethernet::EthernetFrame;
use crate::packet::{PacketType, BNEP_EXT_FLAG, BNEP_TYPE_MASK, EXT_HEADER_TYPE_CONTROL};

/// Smallest packet worth looking at: a header byte and one more byte.
pub const MIN_PACKET_LEN: usize = 2;

/// One `{type|flag, len, data}` extension header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionHeader {
    /// Extension type with the chain flag stripped.
    pub ext_type: u8,
    #[serde(serialize_with = "crate::hex::serialize")]
    pub data: Bytes,
}

impl ExtensionHeader {
    pub fn new(ext_type: u8, data: impl Into<Bytes>) -> Self {
        Self {
            ext_type: ext_type & BNEP_TYPE_MASK,
            data: data.into(),
        }
    }

    /// Control extension wrapping a single control message.
    pub fn control(message: &ControlMessage) -> Self {
        let mut data = BytesMut::with_capacity(message.wire_len());
        message.encode(&mut data);
        Self::new(EXT_HEADER_TYPE_CONTROL, data.freeze())
    }

    pub fn is_control(&self) -> bool {
        self.ext_type == EXT_HEADER_TYPE_CONTROL
    }
}

/// What follows the header byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacketBody {
    /// Addresses left out by compression are `None`.
    Ethernet {
        dst: Option<BdAddr>,
        src: Option<BdAddr>,
        ethertype: u16,
    },
    Control(ControlMessage),
}

/// A decoded BNEP packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BnepPacket {
    pub packet_type: PacketType,
    pub body: PacketBody,
    pub extensions: Vec<ExtensionHeader>,
    #[serde(serialize_with = "crate::hex::serialize")]
    pub payload: Bytes,
}

impl BnepPacket {
    /// Rebuild the Ethernet frame this packet carries, filling addresses the
    /// sender compressed away: a missing destination is the receiver's
    /// `local` address and a missing source is the sender's `remote` one.
    pub fn ethernet_frame(&self, local: BdAddr, remote: BdAddr) -> Option<EthernetFrame> {
        match self.body {
            PacketBody::Ethernet { dst, src, ethertype } => Some(EthernetFrame {
                dst: dst.unwrap_or(local),
                src: src.unwrap_or(remote),
                ethertype,
                payload: self.payload.clone(),
            }),
            PacketBody::Control(_) => None,
        }
    }

    /// Append the wire form of this packet.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut header = self.packet_type.as_u8();
        if !self.extensions.is_empty() {
            header |= BNEP_EXT_FLAG;
        }
        dst.put_u8(header);

        match &self.body {
            PacketBody::Ethernet {
                dst: dst_addr,
                src: src_addr,
                ethertype,
            } => {
                if self.packet_type.carries_dst() {
                    dst.put_slice(dst_addr.unwrap_or_default().as_bytes());
                }
                if self.packet_type.carries_src() {
                    dst.put_slice(src_addr.unwrap_or_default().as_bytes());
                }
                dst.put_u16(*ethertype);
            }
            PacketBody::Control(message) => message.encode(dst),
        }

        encode_extensions(&self.extensions, dst)?;
        dst.put_slice(&self.payload);
        Ok(())
    }
}

fn encode_extensions(extensions: &[ExtensionHeader], dst: &mut BytesMut) -> Result<()> {
    for (i, extension) in extensions.iter().enumerate() {
        let len = u8::try_from(extension.data.len())
            .map_err(|_| FrameError::ExtensionTooLong(extension.data.len()))?;
        let mut ext_type = extension.ext_type & BNEP_TYPE_MASK;
        if i + 1 < extensions.len() {
            ext_type |= BNEP_EXT_FLAG;
        }
        dst.put_u8(ext_type);
        dst.put_u8(len);
        dst.put_slice(&extension.data);
    }
    Ok(())
}

fn take<'a>(buf: &'a [u8], pos: usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    buf.get(pos..pos + len).ok_or(FrameError::Truncated {
        what,
        needed: pos + len,
        available: buf.len(),
    })
}

fn read_ethernet_header(
    buf: &[u8],
    pos: &mut usize,
    packet_type: PacketType,
) -> Result<PacketBody> {
    let mut len = 2;
    if packet_type.carries_dst() {
        len += BD_ADDR_LEN;
    }
    if packet_type.carries_src() {
        len += BD_ADDR_LEN;
    }
    let header = take(buf, *pos, len, "ethernet header")?;
    *pos += len;

    let mut at = 0;
    let dst = if packet_type.carries_dst() {
        at += BD_ADDR_LEN;
        Some(BdAddr::from_slice(header)?)
    } else {
        None
    };
    let src = if packet_type.carries_src() {
        Some(BdAddr::from_slice(&header[at..])?)
    } else {
        None
    };
    let ethertype = read_u16_be(header, len - 2).ok_or(FrameError::Truncated {
        what: "protocol type",
        needed: len,
        available: header.len(),
    })?;

    Ok(PacketBody::Ethernet {
        dst,
        src,
        ethertype,
    })
}

/// Decode a BNEP packet received on a channel.
///
/// Fails on packets under two bytes, unknown packet types, truncated
/// headers, malformed control messages in the base header, and extension
/// chains that run past the end of the packet.
pub fn decode_packet(buf: &[u8]) -> Result<BnepPacket> {
    if buf.len() < MIN_PACKET_LEN {
        return Err(FrameError::TooShort {
            size: buf.len(),
            min: MIN_PACKET_LEN,
        });
    }

    let packet_type = PacketType::try_from(buf[0] & BNEP_TYPE_MASK)?;
    let mut has_extension = buf[0] & BNEP_EXT_FLAG != 0;
    let mut pos = 1;

    let body = match packet_type {
        PacketType::Control => {
            let (message, consumed) = ControlMessage::decode(&buf[pos..])?;
            pos += consumed;
            PacketBody::Control(message)
        }
        _ => read_ethernet_header(buf, &mut pos, packet_type)?,
    };

    let mut extensions = Vec::new();
    while has_extension {
        let head = take(buf, pos, 2, "extension header")?;
        has_extension = head[0] & BNEP_EXT_FLAG != 0;
        let ext_type = head[0] & BNEP_TYPE_MASK;
        let len = head[1] as usize;
        pos += 2;

        let data = take(buf, pos, len, "extension body")?;
        pos += len;
        extensions.push(ExtensionHeader {
            ext_type,
            data: Bytes::copy_from_slice(data),
        });
    }

    Ok(BnepPacket {
        packet_type,
        body,
        extensions,
        payload: Bytes::copy_from_slice(&buf[pos..]),
    })
}

/// Encode an outbound Ethernet frame, choosing the smallest header variant.
///
/// The source is compressed away when it equals `local` (the sender's own
/// address) and the destination when it equals `remote` (the receiver's).
pub fn encode_ethernet(
    frame: &EthernetFrame,
    local: BdAddr,
    remote: BdAddr,
    dst: &mut BytesMut,
) -> PacketType {
    let packet_type = PacketType::for_addresses(frame.src != local, frame.dst != remote);

    dst.reserve(1 + 2 * BD_ADDR_LEN + 2 + frame.payload.len());
    dst.put_u8(packet_type.as_u8());
    if packet_type.carries_dst() {
        dst.put_slice(frame.dst.as_bytes());
    }
    if packet_type.carries_src() {
        dst.put_slice(frame.src.as_bytes());
    }
    dst.put_u16(frame.ethertype);
    dst.put_slice(&frame.payload);
    packet_type
}

/// Encode `[0x01, control type, body]`.
pub fn encode_control_packet(message: &ControlMessage, dst: &mut BytesMut) {
    dst.reserve(1 + message.wire_len());
    dst.put_u8(PacketType::Control.as_u8());
    message.encode(dst);
}
