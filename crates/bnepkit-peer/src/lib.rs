//! BNEP channel state machine, service registry and deferred-send scheduler.
//!
//! [`Bnep`] is the engine. It owns an [`L2capTransport`](bnepkit_transport::L2capTransport)
//! and a [`TimerService`], and is driven entirely by calls:
//! - [`Bnep::handle_event`] for L2CAP lifecycle records
//! - [`Bnep::handle_data`] for packets received on a channel
//! - [`Bnep::handle_timeout`] when a channel timer fires
//!
//! Applications receive encoded notification records ([`BnepEvent`]) and
//! rebuilt Ethernet frames through the handler they register.
//!
//! With the `async` feature, [`driver::EngineDriver`] runs an engine on a
//! single tokio task.

pub mod channel;
pub mod config;
#[cfg(feature = "async")]
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod handshake;
pub mod pending;
pub mod registry;
pub mod timer;

pub use channel::{Channel, ChannelInfo, ChannelState};
pub use config::EngineConfig;
#[cfg(feature = "async")]
pub use driver::{DriverHandle, EngineDriver};
pub use engine::{Bnep, SendStatus};
pub use error::{PeerError, Result};
pub use events::{handler, BnepEvent, Packet, PacketHandler};
pub use handshake::{evaluate_setup_request, SetupDecision};
pub use pending::{PendingAction, PendingActions};
pub use registry::{ChannelTable, Service, ServiceRegistry};
pub use timer::{DeadlineTimers, ManualTimers, TimerService};
