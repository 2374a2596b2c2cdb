use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::FrameError;

/// Header flag: an extension header follows.
pub const BNEP_EXT_FLAG: u8 = 0x80;
/// Header mask selecting the packet (or extension) type.
pub const BNEP_TYPE_MASK: u8 = 0x7F;
/// Extension header type carrying one control message.
pub const EXT_HEADER_TYPE_CONTROL: u8 = 0x00;

/// Worst-case BNEP header: type (1) + two addresses (12) + protocol type (2).
pub const BNEP_HEADER_OVERHEAD: u16 = 15;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

/// Largest Ethernet payload that fits a channel with the given MTU.
pub const fn max_frame_size_for_mtu(mtu: u16) -> u16 {
    mtu.saturating_sub(BNEP_HEADER_OVERHEAD)
}

/// BNEP packet type (header byte without the extension flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PacketType {
    GeneralEthernet = 0x00,
    Control = 0x01,
    CompressedEthernet = 0x02,
    CompressedSourceOnly = 0x03,
    CompressedDestOnly = 0x04,
}

impl PacketType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Destination address is carried on the wire.
    pub const fn carries_dst(self) -> bool {
        matches!(
            self,
            PacketType::GeneralEthernet | PacketType::CompressedDestOnly
        )
    }

    /// Source address is carried on the wire.
    pub const fn carries_src(self) -> bool {
        matches!(
            self,
            PacketType::GeneralEthernet | PacketType::CompressedSourceOnly
        )
    }

    /// Smallest variant able to carry a frame, given whether its source and
    /// destination differ from what the receiver can infer.
    pub const fn for_addresses(needs_src: bool, needs_dst: bool) -> Self {
        match (needs_src, needs_dst) {
            (true, true) => PacketType::GeneralEthernet,
            (true, false) => PacketType::CompressedSourceOnly,
            (false, true) => PacketType::CompressedDestOnly,
            (false, false) => PacketType::CompressedEthernet,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PacketType::GeneralEthernet),
            0x01 => Ok(PacketType::Control),
            0x02 => Ok(PacketType::CompressedEthernet),
            0x03 => Ok(PacketType::CompressedSourceOnly),
            0x04 => Ok(PacketType::CompressedDestOnly),
            other => Err(FrameError::UnknownPacketType(other)),
        }
    }
}

/// BNEP control message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ControlType {
    CommandNotUnderstood = 0x00,
    SetupConnectionRequest = 0x01,
    SetupConnectionResponse = 0x02,
    FilterNetTypeSet = 0x03,
    FilterNetTypeResponse = 0x04,
    FilterMultiAddrSet = 0x05,
    FilterMultiAddrResponse = 0x06,
}

impl ControlType {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ControlType::CommandNotUnderstood),
            0x01 => Some(ControlType::SetupConnectionRequest),
            0x02 => Some(ControlType::SetupConnectionResponse),
            0x03 => Some(ControlType::FilterNetTypeSet),
            0x04 => Some(ControlType::FilterNetTypeResponse),
            0x05 => Some(ControlType::FilterMultiAddrSet),
            0x06 => Some(ControlType::FilterMultiAddrResponse),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Response code of a setup connection response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SetupResponseCode(pub u16);

impl SetupResponseCode {
    pub const SUCCESS: Self = Self(0x0000);
    pub const INVALID_DEST_UUID: Self = Self(0x0001);
    pub const INVALID_SOURCE_UUID: Self = Self(0x0002);
    pub const INVALID_SERVICE_UUID_SIZE: Self = Self(0x0003);
    pub const CONNECTION_NOT_ALLOWED: Self = Self(0x0004);

    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    pub const fn name(self) -> &'static str {
        match self.0 {
            0x0000 => "success",
            0x0001 => "invalid destination service uuid",
            0x0002 => "invalid source service uuid",
            0x0003 => "invalid service uuid size",
            0x0004 => "connection not allowed",
            _ => "unknown",
        }
    }
}

impl fmt::Debug for SetupResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetupResponseCode(0x{:04x} {})", self.0, self.name())
    }
}

impl fmt::Display for SetupResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04x})", self.name(), self.0)
    }
}

/// Response code of a filter set response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FilterResponseCode(pub u16);

impl FilterResponseCode {
    pub const SUCCESS: Self = Self(0x0000);
    pub const UNSUPPORTED_REQUEST: Self = Self(0x0001);
    pub const INVALID_RANGE: Self = Self(0x0002);
    pub const TOO_MANY_FILTERS: Self = Self(0x0003);
    pub const SECURITY: Self = Self(0x0004);

    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    pub const fn name(self) -> &'static str {
        match self.0 {
            0x0000 => "success",
            0x0001 => "unsupported request",
            0x0002 => "invalid range",
            0x0003 => "too many filters",
            0x0004 => "security",
            _ => "unknown",
        }
    }
}

impl fmt::Debug for FilterResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterResponseCode(0x{:04x} {})", self.0, self.name())
    }
}

impl fmt::Display for FilterResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04x})", self.name(), self.0)
    }
}

/// PAN service roles BNEP connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum ServiceClass {
    /// PAN user.
    Panu = 0x1115,
    /// Network access point.
    Nap = 0x1116,
    /// Group ad-hoc network.
    Gn = 0x1117,
}

impl ServiceClass {
    pub const fn from_uuid16(uuid: u16) -> Option<Self> {
        match uuid {
            0x1115 => Some(ServiceClass::Panu),
            0x1116 => Some(ServiceClass::Nap),
            0x1117 => Some(ServiceClass::Gn),
            _ => None,
        }
    }

    pub const fn uuid16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceClass::Panu => "PANU",
            ServiceClass::Nap => "NAP",
            ServiceClass::Gn => "GN",
        };
        f.write_str(name)
    }
}

impl FromStr for ServiceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "panu" | "0x1115" => Ok(ServiceClass::Panu),
            "nap" | "0x1116" => Ok(ServiceClass::Nap),
            "gn" | "0x1117" => Ok(ServiceClass::Gn),
            _ => Err(format!("unknown PAN role '{s}' (expected panu, nap or gn)")),
        }
    }
}
