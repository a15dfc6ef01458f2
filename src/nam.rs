//! NAM section reader (§4.5): the name-address list.

use crate::error::{ContainerError, Result};
use std::io::{Cursor, Read};

const PAGE_SIZE: u64 = 0x2000;

#[derive(Clone, Debug)]
pub struct NamSection {
    pub addresses: Vec<u64>,
}

impl NamSection {
    pub fn read(data: &[u8], word_size: u8) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != b"VA*\0" {
            return Err(ContainerError::InvalidMagic.into());
        }
        let mut pad4 = [0u8; 4];
        cursor.read_exact(&mut pad4)?; // non_empty flag's padding
        let mut buf4 = [0u8; 4];
        cursor.read_exact(&mut buf4)?;
        let _non_empty = u32::from_le_bytes(buf4);
        cursor.read_exact(&mut pad4)?;
        cursor.read_exact(&mut buf4)?;
        let _page_count = u32::from_le_bytes(buf4);
        let mut word_pad = vec![0u8; word_size as usize];
        cursor.read_exact(&mut word_pad)?;
        cursor.read_exact(&mut buf4)?;
        let mut name_count = u32::from_le_bytes(buf4) as u64;
        if word_size == 8 {
            name_count /= 2;
        }

        let header_len = 24 + u64::from(word_size);
        let skip = PAGE_SIZE
            .checked_sub(header_len)
            .ok_or(ContainerError::InvalidMagic)?;
        let mut discard = vec![0u8; skip as usize];
        cursor.read_exact(&mut discard)?;

        let mut addresses = Vec::with_capacity(name_count as usize);
        for _ in 0..name_count {
            let addr = if word_size == 8 {
                let mut buf = [0u8; 8];
                cursor.read_exact(&mut buf)?;
                u64::from_le_bytes(buf)
            } else {
                let mut buf = [0u8; 4];
                cursor.read_exact(&mut buf)?;
                u32::from_le_bytes(buf).into()
            };
            addresses.push(addr);
        }

        Ok(Self { addresses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_nam_bytes(word_size: u8, name_count_raw: u32, addresses: &[u64]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"VA*\0");
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&1u32.to_le_bytes()); // non_empty
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&1u32.to_le_bytes()); // page_count
        buf.extend_from_slice(&vec![0u8; word_size as usize]);
        buf.extend_from_slice(&name_count_raw.to_le_bytes());

        let header_len = 24 + u64::from(word_size);
        let skip = PAGE_SIZE - header_len;
        buf.extend_from_slice(&vec![0u8; skip as usize]);

        for &addr in addresses {
            if word_size == 8 {
                buf.extend_from_slice(&addr.to_le_bytes());
            } else {
                buf.extend_from_slice(&(addr as u32).to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn reads_32_bit_address_list() {
        let bytes = sample_nam_bytes(4, 2, &[0x1000, 0x2000]);
        let nam = NamSection::read(&bytes, 4).unwrap();
        assert_eq!(nam.addresses, vec![0x1000, 0x2000]);
    }

    #[test]
    fn reads_64_bit_address_list_with_halved_name_count() {
        // word_size == 8 stores name_count doubled; the reader halves it.
        let bytes = sample_nam_bytes(8, 4, &[0x1000, 0x2000]);
        let nam = NamSection::read(&bytes, 8).unwrap();
        assert_eq!(nam.addresses, vec![0x1000, 0x2000]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_nam_bytes(4, 0, &[]);
        bytes[0..4].copy_from_slice(b"NOPE");
        assert!(NamSection::read(&bytes, 4).is_err());
    }
}
