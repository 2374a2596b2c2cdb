use std::fmt;

use bnepkit_event::EventError;
use bnepkit_frame::FrameError;
use bnepkit_peer::PeerError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

/// Template and argument problems are the caller's; buffer limits are the data's.
pub fn event_error(context: &str, err: EventError) -> CliError {
    match err {
        EventError::ArgumentMismatch { .. }
        | EventError::MissingArgument { .. }
        | EventError::SurplusArguments { .. }
        | EventError::UnknownTag { .. }
        | EventError::BlobWithoutLength { .. } => CliError::usage(format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Event(err) => event_error(context, err),
        PeerError::InvalidServiceUuid(_)
        | PeerError::TooManyFilters { .. }
        | PeerError::DataLenExceedsMtu { .. } => CliError::usage(format!("{context}: {err}")),
        PeerError::Transport(_)
        | PeerError::UnknownChannel(_)
        | PeerError::UnknownPeer(_)
        | PeerError::NotConnected(_)
        | PeerError::NoCredit(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
