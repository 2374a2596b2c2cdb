//! Checked fixed-offset integer access.
//!
//! Event records and control messages are parsed at fixed byte offsets. The
//! readers return `None` instead of panicking when the slice is too short;
//! the writers return `false` and leave the destination untouched.

pub fn read_u16_le(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn read_u16_be(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_u24_le(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(3)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
}

pub fn read_u32_le(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn read_u32_be(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u16_le(buf: &mut [u8], pos: usize, value: u16) -> bool {
    store(buf, pos, &value.to_le_bytes())
}

pub fn write_u16_be(buf: &mut [u8], pos: usize, value: u16) -> bool {
    store(buf, pos, &value.to_be_bytes())
}

pub fn write_u24_le(buf: &mut [u8], pos: usize, value: u32) -> bool {
    store(buf, pos, &value.to_le_bytes()[..3])
}

pub fn write_u32_le(buf: &mut [u8], pos: usize, value: u32) -> bool {
    store(buf, pos, &value.to_le_bytes())
}

/// Copy `src` into `dst` in reverse order. Both slices must have equal length.
pub fn reverse_bytes(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, s) in dst.iter_mut().zip(src.iter().rev()) {
        *d = *s;
    }
}

fn store(buf: &mut [u8], pos: usize, bytes: &[u8]) -> bool {
    let Some(end) = pos.checked_add(bytes.len()) else {
        return false;
    };
    match buf.get_mut(pos..end) {
        Some(slot) => {
            slot.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_byte_orders() {
        let buf = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_u16_le(&buf, 0), Some(0x3412));
        assert_eq!(read_u16_be(&buf, 0), Some(0x1234));
        assert_eq!(read_u16_be(&buf, 2), Some(0x5678));
        assert_eq!(read_u24_le(&buf, 1), Some(0x78_5634));
        assert_eq!(read_u32_le(&buf, 0), Some(0x7856_3412));
        assert_eq!(read_u32_be(&buf, 0), Some(0x1234_5678));
    }

    #[test]
    fn reads_past_end_return_none() {
        let buf = [0u8; 3];
        assert_eq!(read_u16_le(&buf, 2), None);
        assert_eq!(read_u32_le(&buf, 0), None);
        assert_eq!(read_u16_be(&buf, usize::MAX), None);
    }

    #[test]
    fn writes_respect_bounds() {
        let mut buf = [0u8; 4];
        assert!(write_u16_be(&mut buf, 0, 0x0800));
        assert!(write_u16_le(&mut buf, 2, 0x0040));
        assert_eq!(buf, [0x08, 0x00, 0x40, 0x00]);

        assert!(!write_u32_le(&mut buf, 1, 0xFFFF_FFFF));
        assert_eq!(buf, [0x08, 0x00, 0x40, 0x00]);

        let mut wide = [0u8; 3];
        assert!(write_u24_le(&mut wide, 0, 0x00AB_CDEF));
        assert_eq!(wide, [0xEF, 0xCD, 0xAB]);
    }

    #[test]
    fn reverse_copy() {
        let mut out = [0u8; 6];
        reverse_bytes(&[1, 2, 3, 4, 5, 6], &mut out);
        assert_eq!(out, [6, 5, 4, 3, 2, 1]);
    }
}
