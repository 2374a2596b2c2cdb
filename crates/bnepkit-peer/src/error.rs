use bnepkit_transport::BdAddr;

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] bnepkit_transport::TransportError),

    /// Packet or frame codec error.
    #[error("frame error: {0}")]
    Frame(#[from] bnepkit_frame::FrameError),

    /// Notification record could not be encoded.
    #[error("event error: {0}")]
    Event(#[from] bnepkit_event::EventError),

    /// No channel has this local channel id.
    #[error("unknown channel 0x{0:04x}")]
    UnknownChannel(u16),

    /// No channel exists for this remote address.
    #[error("no channel to {0}")]
    UnknownPeer(BdAddr),

    /// The channel has not completed its setup handshake.
    #[error("channel 0x{0:04x} not connected")]
    NotConnected(u16),

    /// A service is already registered for this role.
    #[error("service 0x{0:04x} already registered")]
    ServiceAlreadyRegistered(u16),

    /// Only PANU, NAP and GN can be registered.
    #[error("invalid service uuid 0x{0:04x}")]
    InvalidServiceUuid(u16),

    /// A channel to this address already exists.
    #[error("channel to {0} already exists")]
    ChannelExists(BdAddr),

    /// The channel table is at capacity.
    #[error("channel table full ({0} channels)")]
    ChannelTableFull(usize),

    /// Ethernet payload larger than the channel's maximum frame size.
    #[error("frame payload too large ({len} bytes, max {max})")]
    DataLenExceedsMtu { len: usize, max: u16 },

    /// Filter list larger than the outbound maximum.
    #[error("too many filter ranges ({len}, max {max})")]
    TooManyFilters { len: usize, max: usize },

    /// The transport has no send credit for the channel.
    #[error("no send credit on channel 0x{0:04x}")]
    NoCredit(u16),

    /// The async driver has shut down.
    #[cfg(feature = "async")]
    #[error("engine driver stopped")]
    DriverStopped,
}

pub type Result<T> = std::result::Result<T, PeerError>;
