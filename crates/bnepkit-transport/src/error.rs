/// Errors that can occur at the L2CAP transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel has no send credit right now.
    #[error("no send credit on channel 0x{0:04x}")]
    NoCredit(u16),

    /// The transport does not know the given channel id.
    #[error("unknown L2CAP channel 0x{0:04x}")]
    UnknownChannel(u16),

    /// An outbound packet exceeds the channel MTU.
    #[error("packet too large for channel ({size} bytes, mtu {mtu})")]
    PacketTooLarge { size: usize, mtu: u16 },

    /// The transport refused to open a channel.
    #[error("channel creation failed: {0}")]
    CreateFailed(String),

    /// A record or field is shorter than its fixed layout requires.
    #[error("truncated {what} ({available} bytes, need {needed})")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// Text could not be parsed as a hardware address.
    #[error("invalid hardware address '{0}'")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
