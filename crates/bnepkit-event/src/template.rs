use bnepkit_transport::BdAddr;

use crate::error::{EventError, Result};
use crate::writer::EventWriter;
use crate::MAX_EVENT_SIZE;

/// Size of a `Q` block.
pub const BLOCK32_LEN: usize = 32;

/// An event code, optional subevent code (`0` for none) and field format.
///
/// Templates built with [`EventTemplate::new`] in a `const` item are checked
/// at compile time: an unknown tag, or a `V` with no preceding `J`/`K`,
/// fails the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTemplate<'a> {
    code: u8,
    subevent: u8,
    format: &'a str,
}

/// One argument for [`EventTemplate::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    /// Value for `1`-`4`, `H`, `J` and `K` fields. Wider values are truncated
    /// to the field width.
    Int(u32),
    /// Value for a `B` field.
    Addr(BdAddr),
    /// Value for `Q` (exactly 32 bytes) and `V` fields.
    Bytes(&'a [u8]),
}

impl From<u8> for Arg<'_> {
    fn from(value: u8) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u16> for Arg<'_> {
    fn from(value: u16) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Arg::Int(value)
    }
}

impl From<BdAddr> for Arg<'_> {
    fn from(addr: BdAddr) -> Self {
        Arg::Addr(addr)
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Arg::Bytes(bytes)
    }
}

enum FormatDefect {
    UnknownTag { position: usize, tag: u8 },
    BlobWithoutLength { position: usize },
}

const fn check_format(format: &[u8]) -> Option<FormatDefect> {
    let mut position = 0;
    let mut length_declared = false;
    while position < format.len() {
        match format[position] {
            b'1' | b'2' | b'3' | b'4' | b'H' | b'B' | b'Q' => {}
            b'J' | b'K' => length_declared = true,
            b'V' => {
                if !length_declared {
                    return Some(FormatDefect::BlobWithoutLength { position });
                }
            }
            tag => return Some(FormatDefect::UnknownTag { position, tag }),
        }
        position += 1;
    }
    None
}

impl<'a> EventTemplate<'a> {
    /// Build a template, panicking on a malformed format.
    pub const fn new(code: u8, subevent: u8, format: &'a str) -> Self {
        match check_format(format.as_bytes()) {
            None => {}
            Some(FormatDefect::UnknownTag { .. }) => panic!("unknown event field tag"),
            Some(FormatDefect::BlobWithoutLength { .. }) => {
                panic!("'V' field without a preceding 'J' or 'K'")
            }
        }
        Self {
            code,
            subevent,
            format,
        }
    }

    /// Build a template from a format supplied at runtime.
    pub fn try_new(code: u8, subevent: u8, format: &'a str) -> Result<Self> {
        match check_format(format.as_bytes()) {
            None => Ok(Self {
                code,
                subevent,
                format,
            }),
            Some(FormatDefect::UnknownTag { position, tag }) => Err(EventError::UnknownTag {
                tag: tag as char,
                position,
            }),
            Some(FormatDefect::BlobWithoutLength { position }) => {
                Err(EventError::BlobWithoutLength { position })
            }
        }
    }

    pub const fn code(&self) -> u8 {
        self.code
    }

    pub const fn subevent(&self) -> u8 {
        self.subevent
    }

    pub const fn format(&self) -> &'a str {
        self.format
    }

    /// Number of arguments [`render`](Self::render) consumes.
    pub const fn arity(&self) -> usize {
        self.format.len()
    }

    /// Render into `buf`, returning the record length.
    ///
    /// Byte 1 is written only after every field fits; on error the buffer
    /// holds a partial record whose length byte is still zero.
    pub fn render(&self, buf: &mut [u8], args: &[Arg<'_>]) -> Result<usize> {
        if args.len() > self.arity() {
            return Err(EventError::SurplusArguments {
                expected: self.arity(),
                given: args.len(),
            });
        }

        let mut writer = EventWriter::start(buf, self.code, self.subevent)?;
        let mut declared: Option<usize> = None;

        for (index, tag) in self.format.chars().enumerate() {
            let arg = args
                .get(index)
                .ok_or(EventError::MissingArgument { index, tag })?;
            let mismatch = EventError::ArgumentMismatch { index, tag };

            match (tag, *arg) {
                ('1', Arg::Int(value)) => writer.put_uint(1, value)?,
                ('2' | 'H', Arg::Int(value)) => writer.put_uint(2, value)?,
                ('3', Arg::Int(value)) => writer.put_uint(3, value)?,
                ('4', Arg::Int(value)) => writer.put_uint(4, value)?,
                ('B', Arg::Addr(addr)) => writer.put_reversed(addr.as_bytes())?,
                ('Q', Arg::Bytes(block)) => {
                    if block.len() != BLOCK32_LEN {
                        return Err(mismatch);
                    }
                    writer.put_reversed(block)?;
                }
                ('J' | 'K', Arg::Int(value)) => {
                    let len = u8::try_from(value).map_err(|_| EventError::LengthOutOfRange(value))?;
                    if tag == 'J' {
                        writer.put_uint(1, len.into())?;
                    }
                    declared = Some(len.into());
                }
                ('V', Arg::Bytes(blob)) => {
                    let len = declared.ok_or(EventError::BlobWithoutLength { position: index })?;
                    let data = blob.get(..len).ok_or(EventError::BlobTooShort {
                        declared: len,
                        available: blob.len(),
                    })?;
                    writer.put_slice(data)?;
                }
                _ => return Err(mismatch),
            }
        }

        writer.finish()
    }

    /// Render into a freshly allocated record.
    pub fn render_to_vec(&self, args: &[Arg<'_>]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_EVENT_SIZE];
        let len = self.render(&mut buf, args)?;
        buf.truncate(len);
        Ok(buf)
    }
}
