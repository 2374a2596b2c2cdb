use bnepkit_transport::endian::reverse_bytes;

use crate::error::{EventError, Result};
use crate::EVENT_HEADER_SIZE;

/// Bounds-checked cursor shared by the template renderer and the builder.
///
/// Byte 1 stays zero until [`finish`](EventWriter::finish); a writer that is
/// dropped after an error leaves an unfinalized record behind.
pub(crate) struct EventWriter<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> EventWriter<'b> {
    pub(crate) fn start(buf: &'b mut [u8], code: u8, subevent: u8) -> Result<Self> {
        let header = if subevent != 0 {
            EVENT_HEADER_SIZE + 1
        } else {
            EVENT_HEADER_SIZE
        };
        if buf.len() < header {
            return Err(EventError::Overrun {
                needed: header,
                capacity: buf.len(),
            });
        }
        buf[0] = code;
        buf[1] = 0;
        if subevent != 0 {
            buf[2] = subevent;
        }
        Ok(Self { buf, pos: header })
    }

    fn claim(&mut self, n: usize) -> Result<&mut [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(EventError::Overrun {
                needed: end,
                capacity: self.buf.len(),
            });
        }
        let slot = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(slot)
    }

    /// Little-endian integer truncated to `width` bytes.
    pub(crate) fn put_uint(&mut self, width: usize, value: u32) -> Result<()> {
        let bytes = value.to_le_bytes();
        self.claim(width)?.copy_from_slice(&bytes[..width]);
        Ok(())
    }

    pub(crate) fn put_reversed(&mut self, src: &[u8]) -> Result<()> {
        let slot = self.claim(src.len())?;
        reverse_bytes(src, slot);
        Ok(())
    }

    pub(crate) fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.claim(src.len())?.copy_from_slice(src);
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<usize> {
        let params = self.pos - EVENT_HEADER_SIZE;
        let len = u8::try_from(params).map_err(|_| EventError::TooLong(params))?;
        self.buf[1] = len;
        Ok(self.pos)
    }
}
