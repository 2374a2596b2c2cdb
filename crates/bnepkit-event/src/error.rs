/// Errors raised while rendering an event record.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    /// A field would have been written past the end of the buffer.
    #[error("event overruns buffer ({needed} bytes needed, capacity {capacity})")]
    Overrun { needed: usize, capacity: usize },

    /// The argument at `index` does not fit the field tag.
    #[error("argument {index} does not match field '{tag}'")]
    ArgumentMismatch { index: usize, tag: char },

    /// The template has more fields than arguments were supplied.
    #[error("missing argument {index} for field '{tag}'")]
    MissingArgument { index: usize, tag: char },

    /// More arguments were supplied than the template consumes.
    #[error("{given} arguments supplied, template consumes {expected}")]
    SurplusArguments { expected: usize, given: usize },

    /// A blob argument is shorter than the length declared for it.
    #[error("blob has {available} bytes, {declared} declared")]
    BlobTooShort { declared: usize, available: usize },

    /// A declared blob length does not fit in one byte.
    #[error("blob length {0} exceeds 255")]
    LengthOutOfRange(u32),

    /// A format string contains an unknown tag.
    #[error("unknown field tag '{tag}' at position {position}")]
    UnknownTag { tag: char, position: usize },

    /// A `V` field appears before any `J` or `K` field.
    #[error("blob field at position {position} has no declared length")]
    BlobWithoutLength { position: usize },

    /// The rendered parameters do not fit the one-byte length field.
    #[error("event parameters too long ({0} bytes, max 255)")]
    TooLong(usize),
}

pub type Result<T> = std::result::Result<T, EventError>;
