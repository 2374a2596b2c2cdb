use bnepkit_transport::endian::read_u16_be;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::ControlError;
use crate::filter::{FilterRange, MulticastRange, NetTypeRange};
use crate::packet::{ControlType, FilterResponseCode, SetupResponseCode};

/// A BNEP control message (the bytes after a control header or inside a
/// control extension header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    CommandNotUnderstood {
        control_type: u8,
    },
    /// UUIDs are kept as received: `uuid_size` bytes each, big-endian.
    SetupConnectionRequest {
        uuid_size: u8,
        #[serde(serialize_with = "crate::hex::serialize")]
        dest_uuid: Bytes,
        #[serde(serialize_with = "crate::hex::serialize")]
        source_uuid: Bytes,
    },
    SetupConnectionResponse {
        code: SetupResponseCode,
    },
    FilterNetTypeSet {
        ranges: Vec<NetTypeRange>,
    },
    FilterNetTypeResponse {
        code: FilterResponseCode,
    },
    FilterMultiAddrSet {
        ranges: Vec<MulticastRange>,
    },
    FilterMultiAddrResponse {
        code: FilterResponseCode,
    },
}

impl ControlMessage {
    /// Setup request with 16-bit UUIDs, the only form sent by this stack.
    pub fn setup_request(source_uuid: u16, dest_uuid: u16) -> Self {
        ControlMessage::SetupConnectionRequest {
            uuid_size: 2,
            dest_uuid: Bytes::copy_from_slice(&dest_uuid.to_be_bytes()),
            source_uuid: Bytes::copy_from_slice(&source_uuid.to_be_bytes()),
        }
    }

    pub fn control_type(&self) -> ControlType {
        match self {
            ControlMessage::CommandNotUnderstood { .. } => ControlType::CommandNotUnderstood,
            ControlMessage::SetupConnectionRequest { .. } => ControlType::SetupConnectionRequest,
            ControlMessage::SetupConnectionResponse { .. } => ControlType::SetupConnectionResponse,
            ControlMessage::FilterNetTypeSet { .. } => ControlType::FilterNetTypeSet,
            ControlMessage::FilterNetTypeResponse { .. } => ControlType::FilterNetTypeResponse,
            ControlMessage::FilterMultiAddrSet { .. } => ControlType::FilterMultiAddrSet,
            ControlMessage::FilterMultiAddrResponse { .. } => ControlType::FilterMultiAddrResponse,
        }
    }

    /// Decode one control message starting at the control-type byte.
    ///
    /// Returns the message and the number of bytes it occupies, including
    /// the control-type byte. Filter-set lists whose length is not a whole
    /// number of entries consume the declared length; the trailing partial
    /// entry is ignored.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ControlError> {
        let &raw_type = buf.first().ok_or(ControlError::Empty)?;
        let control_type =
            ControlType::from_u8(raw_type).ok_or(ControlError::UnknownType(raw_type))?;
        let truncated = ControlError::Truncated {
            control_type: raw_type,
        };

        match control_type {
            ControlType::CommandNotUnderstood => {
                let &rejected = buf.get(1).ok_or(truncated)?;
                Ok((
                    ControlMessage::CommandNotUnderstood {
                        control_type: rejected,
                    },
                    2,
                ))
            }
            ControlType::SetupConnectionRequest => {
                let uuid_size = *buf.get(1).ok_or(truncated)? as usize;
                let consumed = 2 + 2 * uuid_size;
                let uuids = buf.get(2..consumed).ok_or(truncated)?;
                let (dest, source) = uuids.split_at(uuid_size);
                Ok((
                    ControlMessage::SetupConnectionRequest {
                        uuid_size: uuid_size as u8,
                        dest_uuid: Bytes::copy_from_slice(dest),
                        source_uuid: Bytes::copy_from_slice(source),
                    },
                    consumed,
                ))
            }
            ControlType::SetupConnectionResponse => {
                let code = read_u16_be(buf, 1).ok_or(truncated)?;
                Ok((
                    ControlMessage::SetupConnectionResponse {
                        code: SetupResponseCode(code),
                    },
                    3,
                ))
            }
            ControlType::FilterNetTypeSet => {
                let (ranges, consumed) = decode_ranges::<NetTypeRange>(buf).ok_or(truncated)?;
                Ok((ControlMessage::FilterNetTypeSet { ranges }, consumed))
            }
            ControlType::FilterMultiAddrSet => {
                let (ranges, consumed) = decode_ranges::<MulticastRange>(buf).ok_or(truncated)?;
                Ok((ControlMessage::FilterMultiAddrSet { ranges }, consumed))
            }
            ControlType::FilterNetTypeResponse => {
                let code = read_u16_be(buf, 1).ok_or(truncated)?;
                Ok((
                    ControlMessage::FilterNetTypeResponse {
                        code: FilterResponseCode(code),
                    },
                    3,
                ))
            }
            ControlType::FilterMultiAddrResponse => {
                let code = read_u16_be(buf, 1).ok_or(truncated)?;
                Ok((
                    ControlMessage::FilterMultiAddrResponse {
                        code: FilterResponseCode(code),
                    },
                    3,
                ))
            }
        }
    }

    /// Encoded size, including the control-type byte.
    pub fn wire_len(&self) -> usize {
        match self {
            ControlMessage::CommandNotUnderstood { .. } => 2,
            ControlMessage::SetupConnectionRequest { uuid_size, .. } => {
                2 + 2 * *uuid_size as usize
            }
            ControlMessage::FilterNetTypeSet { ranges } => {
                3 + ranges.len() * NetTypeRange::WIRE_LEN
            }
            ControlMessage::FilterMultiAddrSet { ranges } => {
                3 + ranges.len() * MulticastRange::WIRE_LEN
            }
            ControlMessage::SetupConnectionResponse { .. }
            | ControlMessage::FilterNetTypeResponse { .. }
            | ControlMessage::FilterMultiAddrResponse { .. } => 3,
        }
    }

    /// Append the message, starting with its control-type byte.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        dst.put_u8(self.control_type().as_u8());
        match self {
            ControlMessage::CommandNotUnderstood { control_type } => dst.put_u8(*control_type),
            ControlMessage::SetupConnectionRequest {
                uuid_size,
                dest_uuid,
                source_uuid,
            } => {
                dst.put_u8(*uuid_size);
                dst.put_slice(dest_uuid);
                dst.put_slice(source_uuid);
            }
            ControlMessage::SetupConnectionResponse { code } => dst.put_u16(code.0),
            ControlMessage::FilterNetTypeSet { ranges } => encode_ranges(ranges, dst),
            ControlMessage::FilterMultiAddrSet { ranges } => encode_ranges(ranges, dst),
            ControlMessage::FilterNetTypeResponse { code }
            | ControlMessage::FilterMultiAddrResponse { code } => dst.put_u16(code.0),
        }
    }
}

fn decode_ranges<R: FilterRange>(buf: &[u8]) -> Option<(Vec<R>, usize)> {
    let list_length = read_u16_be(buf, 1)? as usize;
    let consumed = 3 + list_length;
    let list = buf.get(3..consumed)?;
    let ranges = list
        .chunks_exact(R::WIRE_LEN)
        .map(R::decode)
        .collect::<Option<Vec<_>>>()?;
    Some((ranges, consumed))
}

fn encode_ranges<R: FilterRange>(ranges: &[R], dst: &mut BytesMut) {
    dst.put_u16((ranges.len() * R::WIRE_LEN) as u16);
    for range in ranges {
        range.encode(dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnepkit_transport::BdAddr;

    fn encoded(message: &ControlMessage) -> Vec<u8> {
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn setup_request_layout() {
        let bytes = encoded(&ControlMessage::setup_request(0x1115, 0x1116));
        assert_eq!(bytes, vec![0x01, 0x02, 0x11, 0x16, 0x11, 0x15]);

        let (message, consumed) = ControlMessage::decode(&bytes).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(message, ControlMessage::setup_request(0x1115, 0x1116));
    }

    #[test]
    fn consumed_length_ignores_trailing_bytes() {
        let buf = [0x02, 0x00, 0x01, 0xAA, 0xBB];
        let (message, consumed) = ControlMessage::decode(&buf).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(
            message,
            ControlMessage::SetupConnectionResponse {
                code: SetupResponseCode::INVALID_DEST_UUID
            }
        );
    }

    #[test]
    fn truncated_messages_name_their_type() {
        let cases: [&[u8]; 6] = [
            &[0x00],
            &[0x01, 0x10, 0x00],
            &[0x02, 0x00],
            &[0x03, 0x00, 0x08, 0x08, 0x00, 0x08, 0x00],
            &[0x05, 0x00],
            &[0x06],
        ];
        for buf in cases {
            let err = ControlMessage::decode(buf).unwrap_err();
            let control_type = buf[0];
            assert_eq!(err, ControlError::Truncated { control_type });
        }
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(
            ControlMessage::decode(&[0x07, 0x00]).unwrap_err(),
            ControlError::UnknownType(0x07)
        );
        let err = ControlMessage::decode(&[]).unwrap_err();
        assert_eq!(err, ControlError::Empty);
        assert_eq!(ControlError::Empty.control_type(), None);
    }

    #[test]
    fn net_type_set_partial_entry_is_consumed() {
        let buf = [0x03, 0x00, 0x06, 0x08, 0x00, 0x08, 0x00, 0xFF, 0xFF];
        let (message, consumed) = ControlMessage::decode(&buf).unwrap();
        assert_eq!(consumed, 9);
        assert_eq!(
            message,
            ControlMessage::FilterNetTypeSet {
                ranges: vec![NetTypeRange::single(0x0800)]
            }
        );
    }

    #[test]
    fn multi_addr_set_roundtrip() {
        let start = BdAddr::new([0x01, 0x00, 0x5E, 0x00, 0x00, 0x00]);
        let end = BdAddr::new([0x01, 0x00, 0x5E, 0x7F, 0xFF, 0xFF]);
        let message = ControlMessage::FilterMultiAddrSet {
            ranges: vec![MulticastRange::new(start, end)],
        };
        let bytes = encoded(&message);
        assert_eq!(&bytes[..3], &[0x05, 0x00, 0x0C]);
        assert_eq!(bytes.len(), message.wire_len());
        assert_eq!(ControlMessage::decode(&bytes).unwrap(), (message, 15));
    }

    #[test]
    fn responses_and_not_understood() {
        assert_eq!(
            encoded(&ControlMessage::FilterNetTypeResponse {
                code: FilterResponseCode::INVALID_RANGE
            }),
            vec![0x04, 0x00, 0x02]
        );
        assert_eq!(
            encoded(&ControlMessage::CommandNotUnderstood { control_type: 0x09 }),
            vec![0x00, 0x09]
        );
    }
}
