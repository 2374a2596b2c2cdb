//! Byte primitives and the L2CAP channel abstraction.
//!
//! This is the lowest layer of bnepkit. It provides:
//! - [`BdAddr`], the 6-byte hardware address shared by every layer
//! - Checked big/little-endian helpers for fixed-offset record parsing
//! - The [`L2capTransport`] trait the BNEP engine drives
//! - [`L2capEvent`], the channel lifecycle records a transport delivers
//!
//! The transport itself (connection setup, MTU negotiation, credits) lives
//! outside this workspace; [`MemoryTransport`] is an in-memory stand-in for
//! tests and simulations.

pub mod addr;
pub mod endian;
pub mod error;
pub mod event;
pub mod memory;
pub mod traits;

pub use addr::{BdAddr, BD_ADDR_LEN};
pub use error::{Result, TransportError};
pub use event::{
    L2capEvent, L2CAP_EVENT_CAN_SEND_NOW, L2CAP_EVENT_CHANNEL_CLOSED, L2CAP_EVENT_CHANNEL_OPENED,
    L2CAP_EVENT_INCOMING_CONNECTION,
};
pub use memory::{MemoryTransport, TransportAction, DEFAULT_MEMORY_MTU};
pub use traits::{L2capTransport, PSM_BNEP};
