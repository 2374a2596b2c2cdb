//! BNEP packet codec, control messages and outbound filters.
//!
//! A BNEP packet on the wire is:
//! - One header byte: packet type in the low 7 bits, extension flag `0x80`
//! - Addresses and a protocol type, depending on the compression variant,
//!   or a single control message for control packets
//! - An optional chain of `{type|flag, len, data}` extension headers
//! - The Ethernet payload
//!
//! All multi-byte BNEP fields are big-endian.

pub mod codec;
pub mod control;
pub mod error;
pub mod ethernet;
pub mod filter;
pub mod hex;
pub mod packet;

pub use codec::{
    decode_packet, encode_control_packet, encode_ethernet, BnepPacket, ExtensionHeader, PacketBody,
    MIN_PACKET_LEN,
};
pub use control::ControlMessage;
pub use error::{ControlError, FrameError, Result};
pub use ethernet::{EthernetFrame, ETHERNET_HEADER_LEN, VLAN_TAG_LEN};
pub use filter::{
    FilterList, FilterRange, FilterUpdatePolicy, MulticastFilter, MulticastRange, NetTypeFilter,
    NetTypeRange, DEFAULT_MULTICAST_FILTER_CAPACITY, DEFAULT_NET_FILTER_CAPACITY,
};
pub use packet::{
    max_frame_size_for_mtu, ControlType, FilterResponseCode, PacketType, ServiceClass,
    SetupResponseCode, BNEP_EXT_FLAG, BNEP_HEADER_OVERHEAD, BNEP_TYPE_MASK, ETHERTYPE_ARP,
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, ETHERTYPE_VLAN, EXT_HEADER_TYPE_CONTROL,
};
