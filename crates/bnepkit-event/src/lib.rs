//! Byte-exact event records built from compact format templates.
//!
//! Every record has the layout `[code, len, (subevent)?, fields...]` where
//! `len` counts everything after byte 1. Fields are described by a string
//! of one-character tags:
//!
//! | Tag | Field |
//! |-----|-------|
//! | `1` `2` `3` `4` | little-endian unsigned integer of that width |
//! | `H` | connection handle (2 bytes) |
//! | `B` | 6-byte address, stored byte-reversed |
//! | `Q` | 32-byte block, stored byte-reversed |
//! | `J` | blob length, written as one byte |
//! | `K` | blob length, not written |
//! | `V` | blob of the most recently declared length |
//!
//! Two front ends share one writer: [`EventTemplate`] renders a runtime
//! argument list against a const-validated format, and [`EventBuilder`]
//! writes fields directly with the blob/length ordering enforced by its
//! type.

pub mod builder;
pub mod catalog;
pub mod error;
pub mod template;
mod writer;

pub use builder::{EventBuilder, LengthDeclared, NoLength};
pub use error::{EventError, Result};
pub use template::{Arg, EventTemplate};

/// Bytes before the first field: event code and length.
pub const EVENT_HEADER_SIZE: usize = 2;

/// Largest record the one-byte length field can describe.
pub const MAX_EVENT_SIZE: usize = EVENT_HEADER_SIZE + u8::MAX as usize;
