//! Fixed-width little-endian records for layer serialization.
//!
//! Records are concatenated without length prefixes or version tags, so the
//! order in which a layer writes them is the format.

use std::io::{self, Read, Write};

pub fn write_u32(sink: &mut dyn Write, value: u32) -> io::Result<()> {
    sink.write_all(&value.to_le_bytes())
}

/// Reads one `u32`, returning `None` when the source ends before four bytes.
pub fn try_read_u32(source: &mut dyn Read) -> Option<u32> {
    let mut bytes = [0u8; 4];
    match source.read_exact(&mut bytes) {
        Ok(()) => Some(u32::from_le_bytes(bytes)),
        Err(e) => {
            tracing::trace!(error = %e, "short read while decoding u32 record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian() {
        let mut buffer = Vec::new();
        write_u32(&mut buffer, 0x0102_0304).unwrap();
        assert_eq!(buffer, vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!(try_read_u32(&mut buffer.as_slice()), Some(0x0102_0304));
    }

    #[test]
    fn test_short_read() {
        let bytes = [1u8, 2, 3];
        assert_eq!(try_read_u32(&mut &bytes[..]), None);
        let empty: &[u8] = &[];
        assert_eq!(try_read_u32(&mut &*empty), None);
    }
}
