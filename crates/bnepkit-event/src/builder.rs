use bnepkit_transport::BdAddr;

use crate::error::{EventError, Result};
use crate::template::BLOCK32_LEN;
use crate::writer::EventWriter;

/// Builder state before any blob length has been declared.
#[derive(Debug)]
pub struct NoLength;

/// Builder state after `declare_length` or `hidden_length`.
#[derive(Debug)]
pub struct LengthDeclared(usize);

/// Writes an event record field by field.
///
/// `blob` is only available once a length has been declared, so a blob
/// without a length does not compile:
///
/// ```compile_fail
/// use bnepkit_event::EventBuilder;
/// let mut buf = [0u8; 8];
/// EventBuilder::new(&mut buf, 0x0E, 0).unwrap().blob(&[1, 2]);
/// ```
///
/// ```
/// use bnepkit_event::EventBuilder;
/// let mut buf = [0u8; 16];
/// let len = EventBuilder::new(&mut buf, 0x0E, 0)?
///     .u8(1)?
///     .u16(0x0C03)?
///     .u8(0)?
///     .hidden_length(2)?
///     .blob(&[0xAA, 0xBB])?
///     .finish()?;
/// assert_eq!(&buf[..len], &[0x0E, 6, 1, 0x03, 0x0C, 0, 0xAA, 0xBB]);
/// # Ok::<(), bnepkit_event::EventError>(())
/// ```
pub struct EventBuilder<'b, L = NoLength> {
    writer: EventWriter<'b>,
    length: L,
}

impl<'b> EventBuilder<'b, NoLength> {
    pub fn new(buf: &'b mut [u8], code: u8, subevent: u8) -> Result<Self> {
        Ok(Self {
            writer: EventWriter::start(buf, code, subevent)?,
            length: NoLength,
        })
    }
}

impl<'b, L> EventBuilder<'b, L> {
    pub fn u8(mut self, value: u8) -> Result<Self> {
        self.writer.put_uint(1, value.into())?;
        Ok(self)
    }

    pub fn u16(mut self, value: u16) -> Result<Self> {
        self.writer.put_uint(2, value.into())?;
        Ok(self)
    }

    /// Low three bytes of `value`.
    pub fn u24(mut self, value: u32) -> Result<Self> {
        self.writer.put_uint(3, value)?;
        Ok(self)
    }

    pub fn u32(mut self, value: u32) -> Result<Self> {
        self.writer.put_uint(4, value)?;
        Ok(self)
    }

    pub fn con_handle(self, handle: u16) -> Result<Self> {
        self.u16(handle)
    }

    pub fn bd_addr(mut self, addr: BdAddr) -> Result<Self> {
        self.writer.put_reversed(addr.as_bytes())?;
        Ok(self)
    }

    pub fn block32(mut self, block: &[u8; BLOCK32_LEN]) -> Result<Self> {
        self.writer.put_reversed(block)?;
        Ok(self)
    }

    /// Write a one-byte blob length and remember it.
    pub fn declare_length(mut self, len: u8) -> Result<EventBuilder<'b, LengthDeclared>> {
        self.writer.put_uint(1, len.into())?;
        Ok(self.with_length(len))
    }

    /// Remember a blob length without writing it.
    pub fn hidden_length(self, len: u8) -> Result<EventBuilder<'b, LengthDeclared>> {
        Ok(self.with_length(len))
    }

    /// Finalize the length byte and return the record size.
    pub fn finish(self) -> Result<usize> {
        self.writer.finish()
    }

    fn with_length(self, len: u8) -> EventBuilder<'b, LengthDeclared> {
        EventBuilder {
            writer: self.writer,
            length: LengthDeclared(len.into()),
        }
    }
}

impl EventBuilder<'_, LengthDeclared> {
    /// Copy exactly the declared number of bytes from `data`.
    pub fn blob(mut self, data: &[u8]) -> Result<Self> {
        let declared = self.length.0;
        let bytes = data.get(..declared).ok_or(EventError::BlobTooShort {
            declared,
            available: data.len(),
        })?;
        self.writer.put_slice(bytes)?;
        Ok(self)
    }
}
