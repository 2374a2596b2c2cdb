use bnepkit_transport::TransportError;

/// Errors that can occur while decoding or encoding BNEP packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Packets need at least a header byte and one more byte.
    #[error("packet too short ({size} bytes, min {min})")]
    TooShort { size: usize, min: usize },

    /// The header carries a packet type outside 0x00..=0x04.
    #[error("unknown BNEP packet type 0x{0:02x}")]
    UnknownPacketType(u8),

    /// A fixed-size field runs past the end of the packet.
    #[error("truncated {what} ({available} bytes, need {needed})")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// The control message in a control packet is malformed.
    #[error("control message: {0}")]
    Control(#[from] ControlError),

    /// An Ethernet frame is shorter than its 14-byte header.
    #[error("ethernet frame too short ({0} bytes, min 14)")]
    EthernetTooShort(usize),

    /// An extension header body does not fit its one-byte length.
    #[error("extension header too long ({0} bytes, max 255)")]
    ExtensionTooLong(usize),

    /// Address or integer read failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised by [`ControlMessage::decode`](crate::ControlMessage::decode).
///
/// Every variant names the control type that should be reported back to the
/// peer in a command-not-understood message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// No control type byte at all.
    #[error("empty control message")]
    Empty,

    /// The message is shorter than its declared length.
    #[error("truncated control message type 0x{control_type:02x}")]
    Truncated { control_type: u8 },

    /// The control type is not defined.
    #[error("unknown control type 0x{0:02x}")]
    UnknownType(u8),
}

impl ControlError {
    /// Control type to name in a command-not-understood reply, if known.
    pub fn control_type(&self) -> Option<u8> {
        match *self {
            ControlError::Empty => None,
            ControlError::Truncated { control_type } => Some(control_type),
            ControlError::UnknownType(control_type) => Some(control_type),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
