//! ID0 section reader (§4.5): the B-tree header, the page-reading loop that
//! tolerates an unreliable `page_count` (Design Note), and the root page
//! handle used by the netnode layer.

use crate::btree::{decode_page, BTree, RawPage};
use crate::error::{ContainerError, Result};
use log::trace;
use std::io::{Cursor, Read};

#[derive(Clone, Copy, Debug)]
pub struct Id0Header {
    pub next_free_offset: u32,
    pub page_size: u16,
    pub root_page_index: u32,
    pub record_count: u32,
    pub page_count: u32,
}

impl Id0Header {
    fn read(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut buf4 = [0u8; 4];
        let mut buf2 = [0u8; 2];
        let mut buf1 = [0u8; 1];
        let mut buf9 = [0u8; 9];

        cursor.read_exact(&mut buf4)?;
        let next_free_offset = u32::from_le_bytes(buf4);
        cursor.read_exact(&mut buf2)?;
        let page_size = u16::from_le_bytes(buf2);
        cursor.read_exact(&mut buf4)?;
        let root_page_index = u32::from_le_bytes(buf4);
        cursor.read_exact(&mut buf4)?;
        let record_count = u32::from_le_bytes(buf4);
        cursor.read_exact(&mut buf4)?;
        let page_count = u32::from_le_bytes(buf4);
        cursor.read_exact(&mut buf1)?; // pad byte
        cursor.read_exact(&mut buf9)?;
        if &buf9 != b"B-tree v2" {
            return Err(ContainerError::InvalidMagic.into());
        }

        Ok(Self {
            next_free_offset,
            page_size,
            root_page_index,
            record_count,
            page_count,
        })
    }
}

pub struct Id0Section {
    pub header: Id0Header,
    pub tree: BTree,
}

impl Id0Section {
    /// `data` is the entire decompressed ID0 section payload.
    pub fn read(data: &[u8]) -> Result<Self> {
        let header = Id0Header::read(data)?;
        let page_size = usize::from(header.page_size);

        let mut raw_pages: Vec<RawPage> = Vec::new();
        // The header occupies the whole first page; real pages start after it.
        let mut offset = page_size;
        let mut page_index: u32 = 1;
        let mut highest_page_index = header
            .page_count
            .saturating_sub(1)
            .max(header.root_page_index)
            .max(1);
        while page_index <= highest_page_index {
            let end = offset + page_size;
            let page_bytes = data
                .get(offset..end)
                .ok_or(crate::error::PageError::Truncated)?;
            let page = decode_page(page_bytes)?;
            trace!("decoded ID0 page {page_index}");

            if let RawPage::Index {
                first_child_page,
                entries,
            } = &page
            {
                if *first_child_page != 0 {
                    highest_page_index = highest_page_index.max(*first_child_page);
                }
                for entry in entries {
                    highest_page_index = highest_page_index.max(entry.child_page);
                }
            }

            raw_pages.push(page);
            offset = end;
            page_index += 1;
        }

        let tree = BTree::materialize(&raw_pages, header.root_page_index)?;

        Ok(Self { header, tree })
    }

    /// Convenience lookup built on `.{node_id}N`: the display name of a
    /// netnode, or `None` if it has none.
    pub fn name_of(&self, node_id: u64, word_size: u8) -> Option<Vec<u8>> {
        let key = crate::netnode::make_key(node_id, b'N', None, word_size);
        self.tree
            .search(Some(&key), Some(&key), true, true, true)
            .map(|(_, value)| value.to_vec())
    }
}
