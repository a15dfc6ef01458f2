//! Raw B-tree page decoding (§4.2): turns one `page_size`-byte buffer into
//! either leaf entries (key-compressed via indent prefix sharing) or index
//! entries (verbatim keys plus child page pointers).

use crate::error::{PageError, Result};

#[derive(Clone, Debug)]
pub struct RawLeafEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct RawIndexEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// The page to the right of this entry; the entry at index *i-1*'s
    /// `child_page` is the left child of entry *i* (or `first_child_page`
    /// for entry 0).
    pub child_page: u32,
}

#[derive(Clone, Debug)]
pub enum RawPage {
    Leaf(Vec<RawLeafEntry>),
    Index {
        first_child_page: u32,
        entries: Vec<RawIndexEntry>,
    },
}

fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or(PageError::Truncated)?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(PageError::Truncated)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Reads the `key_length`/`key`/`value_length`/`value` record stored at
/// `record_offset` bytes into the page.
fn read_record(data: &[u8], record_offset: u16) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut offset = usize::from(record_offset);
    if offset >= data.len() {
        return Err(PageError::RecordOffsetOutOfRange(record_offset).into());
    }
    let key_len = usize::from(read_u16_le(data, offset)?);
    offset += 2;
    let key = data
        .get(offset..offset + key_len)
        .ok_or(PageError::Truncated)?
        .to_vec();
    offset += key_len;
    let value_len = usize::from(read_u16_le(data, offset)?);
    offset += 2;
    let value = data
        .get(offset..offset + value_len)
        .ok_or(PageError::Truncated)?
        .to_vec();
    Ok((key, value))
}

/// Decodes one raw page. `data` must be exactly `page_size` bytes.
pub fn decode_page(data: &[u8]) -> Result<RawPage> {
    let first_child_page = read_u32_le(data, 0)?;
    let count = read_u16_le(data, 4)?;

    if usize::from(count) > data.len() / 6 {
        return Err(PageError::EntryCountOverflow.into());
    }

    if first_child_page == 0 {
        let mut entries = Vec::with_capacity(count.into());
        let mut last_key: Vec<u8> = Vec::new();
        for i in 0..usize::from(count) {
            let descriptor_offset = 6 * (i + 1);
            let indent = read_u16_le(data, descriptor_offset)?;
            // bytes [descriptor_offset+2 .. descriptor_offset+4] are padding
            let record_offset = read_u16_le(data, descriptor_offset + 4)?;
            let (suffix, value) = read_record(data, record_offset)?;

            let indent = usize::from(indent);
            if indent > last_key.len() {
                return Err(PageError::InvalidIndent {
                    indent: indent as u16,
                    prev_len: last_key.len(),
                }
                .into());
            }
            let mut key = last_key[..indent].to_vec();
            key.extend_from_slice(&suffix);

            last_key = key.clone();
            entries.push(RawLeafEntry { key, value });
        }
        Ok(RawPage::Leaf(entries))
    } else {
        let mut entries = Vec::with_capacity(count.into());
        for i in 0..usize::from(count) {
            let descriptor_offset = 6 * (i + 1);
            let child_page = read_u32_le(data, descriptor_offset)?;
            let record_offset = read_u16_le(data, descriptor_offset + 4)?;
            let (key, value) = read_record(data, record_offset)?;
            entries.push(RawIndexEntry {
                key,
                value,
                child_page,
            });
        }
        Ok(RawPage::Index {
            first_child_page,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_page_bytes() -> Vec<u8> {
        // one leaf entry, indent 0, key "ab", value "cd"
        let mut page = vec![0u8; 64];
        page[0..4].copy_from_slice(&0u32.to_le_bytes()); // first_child_page = 0 (leaf)
        page[4..6].copy_from_slice(&1u16.to_le_bytes()); // count = 1
        let descriptor_offset = 6;
        let record_offset: u16 = 20;
        page[descriptor_offset..descriptor_offset + 2].copy_from_slice(&0u16.to_le_bytes()); // indent
        page[descriptor_offset + 4..descriptor_offset + 6]
            .copy_from_slice(&record_offset.to_le_bytes());
        let mut rec = Vec::new();
        rec.extend_from_slice(&2u16.to_le_bytes());
        rec.extend_from_slice(b"ab");
        rec.extend_from_slice(&2u16.to_le_bytes());
        rec.extend_from_slice(b"cd");
        page[usize::from(record_offset)..usize::from(record_offset) + rec.len()]
            .copy_from_slice(&rec);
        page
    }

    #[test]
    fn decodes_single_leaf_entry() {
        let page = decode_page(&leaf_page_bytes()).unwrap();
        match page {
            RawPage::Leaf(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].key, b"ab");
                assert_eq!(entries[0].value, b"cd");
            }
            RawPage::Index { .. } => panic!("expected leaf page"),
        }
    }

    #[test]
    fn indent_prefix_sharing() {
        let mut page = vec![0u8; 64];
        page[4..6].copy_from_slice(&2u16.to_le_bytes()); // count = 2

        // entry 0: indent 0, key "abc"
        let rec0_offset: u16 = 24;
        page[6..8].copy_from_slice(&0u16.to_le_bytes());
        page[10..12].copy_from_slice(&rec0_offset.to_le_bytes());
        let mut rec0 = Vec::new();
        rec0.extend_from_slice(&3u16.to_le_bytes());
        rec0.extend_from_slice(b"abc");
        rec0.extend_from_slice(&0u16.to_le_bytes());
        page[usize::from(rec0_offset)..usize::from(rec0_offset) + rec0.len()]
            .copy_from_slice(&rec0);

        // entry 1: indent 2 (shares "ab"), suffix "x" -> key "abx"
        let rec1_offset: u16 = 40;
        page[12..14].copy_from_slice(&2u16.to_le_bytes());
        page[16..18].copy_from_slice(&rec1_offset.to_le_bytes());
        let mut rec1 = Vec::new();
        rec1.extend_from_slice(&1u16.to_le_bytes());
        rec1.extend_from_slice(b"x");
        rec1.extend_from_slice(&0u16.to_le_bytes());
        page[usize::from(rec1_offset)..usize::from(rec1_offset) + rec1.len()]
            .copy_from_slice(&rec1);

        let page = decode_page(&page).unwrap();
        match page {
            RawPage::Leaf(entries) => {
                assert_eq!(entries[0].key, b"abc");
                assert_eq!(entries[1].key, b"abx");
            }
            RawPage::Index { .. } => panic!("expected leaf page"),
        }
    }

    #[test]
    fn rejects_indent_past_previous_key() {
        let mut page = vec![0u8; 64];
        page[4..6].copy_from_slice(&1u16.to_le_bytes());
        page[6..8].copy_from_slice(&5u16.to_le_bytes()); // indent 5 with no previous key
        page[10..12].copy_from_slice(&20u16.to_le_bytes());
        let mut rec = Vec::new();
        rec.extend_from_slice(&1u16.to_le_bytes());
        rec.push(b'x');
        rec.extend_from_slice(&0u16.to_le_bytes());
        page[20..20 + rec.len()].copy_from_slice(&rec);
        assert!(decode_page(&page).is_err());
    }
}
