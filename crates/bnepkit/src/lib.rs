//! Bluetooth BNEP protocol engine and stack event-record encoder.
//!
//! bnepkit implements the Bluetooth Network Encapsulation Protocol on top of
//! an abstract L2CAP transport, plus the compact template encoder the stack
//! uses for its event records.
//!
//! # Crate Structure
//!
//! - [`transport`]: addresses, endian helpers, the L2CAP transport trait
//! - [`event`]: event-record templates and the typed builder
//! - [`frame`]: BNEP packet codec, control messages, filters
//! - [`peer`]: the channel state machine and its registries
//! - [`sim`]: two engines joined by an in-memory link

/// Re-export transport types.
pub mod transport {
    pub use bnepkit_transport::*;
}

/// Re-export event encoder types.
pub mod event {
    pub use bnepkit_event::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bnepkit_frame::*;
}

/// Re-export engine types.
pub mod peer {
    pub use bnepkit_peer::*;
}

pub mod sim;
