//! ID1 section reader (§4.5): header and per-segment byte-map extents only.
//! Per-byte attribute data is intentionally not interpreted further
//! (Non-goal: "deep ID1 ... parsing beyond headers").

use crate::error::{ContainerError, Result};
use std::io::{Cursor, Read};
use std::ops::Range;

#[derive(Clone, Debug)]
pub struct Id1Section {
    pub segments: Vec<Range<u64>>,
    /// Length in bytes of the raw per-byte attribute blob that follows the
    /// segment table; not decoded further.
    pub attribute_data_len: u64,
}

fn read_word<R: Read>(input: &mut R, word_size: u8) -> std::io::Result<u64> {
    if word_size == 8 {
        let mut buf = [0u8; 8];
        input.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    } else {
        let mut buf = [0u8; 4];
        input.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf).into())
    }
}

impl Id1Section {
    pub fn read(data: &[u8], word_size: u8) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != b"VA*\0" {
            return Err(ContainerError::InvalidMagic.into());
        }
        let mut buf4 = [0u8; 4];
        cursor.read_exact(&mut buf4)?;
        let segment_count = u32::from_le_bytes(buf4);
        cursor.read_exact(&mut buf4)?;
        let _page_count = u32::from_le_bytes(buf4);

        let mut segments = Vec::with_capacity(segment_count as usize);
        let mut total_len: u64 = 0;
        for _ in 0..segment_count {
            let start = read_word(&mut cursor, word_size)?;
            let end = read_word(&mut cursor, word_size)?;
            total_len += end.saturating_sub(start) * 4;
            segments.push(start..end);
        }

        Ok(Self {
            segments,
            attribute_data_len: total_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id1_bytes(word_size: u8, segments: &[(u64, u64)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"VA*\0");
        buf.extend_from_slice(&(segments.len() as u32).to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // page_count
        for &(start, end) in segments {
            if word_size == 8 {
                buf.extend_from_slice(&start.to_le_bytes());
                buf.extend_from_slice(&end.to_le_bytes());
            } else {
                buf.extend_from_slice(&(start as u32).to_le_bytes());
                buf.extend_from_slice(&(end as u32).to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn reads_segment_extents_and_attribute_len() {
        let bytes = sample_id1_bytes(4, &[(0x1000, 0x1010), (0x2000, 0x2004)]);
        let id1 = Id1Section::read(&bytes, 4).unwrap();
        assert_eq!(id1.segments, vec![0x1000..0x1010, 0x2000..0x2004]);
        // (0x10 + 0x04) bytes of range * 4 bytes of attribute data per byte
        assert_eq!(id1.attribute_data_len, (0x10 + 0x04) * 4);
    }

    #[test]
    fn reads_64_bit_segment_extents() {
        let bytes = sample_id1_bytes(8, &[(0x1_0000_0000, 0x1_0000_1000)]);
        let id1 = Id1Section::read(&bytes, 8).unwrap();
        assert_eq!(id1.segments, vec![0x1_0000_0000..0x1_0000_1000]);
        assert_eq!(id1.attribute_data_len, 0x1000 * 4);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_id1_bytes(4, &[]);
        bytes[0..4].copy_from_slice(b"NOPE");
        assert!(Id1Section::read(&bytes, 4).is_err());
    }
}
