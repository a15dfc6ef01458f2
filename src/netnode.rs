//! Netnode layer (§4.6): typed accessor over the ID0 B-tree. Composes keys
//! `('.', node_id, tag[, index])`, resolves node names, enumerates entries
//! under a tag, and decodes packed values per the format DSL in [`crate::pack`].

use crate::btree::BTree;
use crate::error::{NetnodeError, Result};
use crate::pack::{self, Field};

fn push_word_be(buf: &mut Vec<u8>, value: u64, word_size: u8) {
    if word_size == 8 {
        buf.extend_from_slice(&value.to_be_bytes());
    } else {
        buf.extend_from_slice(&(value as u32).to_be_bytes());
    }
}

fn push_word_be_signed(buf: &mut Vec<u8>, value: i64, word_size: u8) {
    if word_size == 8 {
        buf.extend_from_slice(&value.to_be_bytes());
    } else {
        buf.extend_from_slice(&(value as i32).to_be_bytes());
    }
}

fn read_word_be(bytes: &[u8]) -> u64 {
    if bytes.len() == 8 {
        u64::from_be_bytes(bytes.try_into().unwrap())
    } else {
        u32::from_be_bytes(bytes.try_into().unwrap()).into()
    }
}

fn read_word_be_signed(bytes: &[u8]) -> i64 {
    if bytes.len() == 8 {
        i64::from_be_bytes(bytes.try_into().unwrap())
    } else {
        i32::from_be_bytes(bytes.try_into().unwrap()).into()
    }
}

fn read_word_le_signed(bytes: &[u8]) -> i64 {
    if bytes.len() == 8 {
        i64::from_le_bytes(bytes.try_into().unwrap())
    } else {
        i32::from_le_bytes(bytes[..4].try_into().unwrap()).into()
    }
}

/// `> byte('.'), word(node_id), byte(tag)[, word(index)]`, big-endian. A
/// negative `index` is serialized with the signed word format (same width,
/// two's complement).
pub fn make_key(node_id: u64, tag: u8, index: Option<i64>, word_size: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 2 * usize::from(word_size));
    key.push(b'.');
    push_word_be(&mut key, node_id, word_size);
    key.push(tag);
    if let Some(index) = index {
        push_word_be_signed(&mut key, index, word_size);
    }
    key
}

/// Inverts [`make_key`]; verifies the `.` prefix and `node_id` equality.
pub fn break_key(
    key: &[u8],
    node_id: u64,
    word_size: u8,
    signed: bool,
) -> Result<(u8, Option<i64>)> {
    let w = usize::from(word_size);
    if key.first() != Some(&b'.') {
        return Err(NetnodeError::BadKeyPrefix.into());
    }
    let rest = &key[1..];
    if rest.len() < w + 1 {
        return Err(NetnodeError::BadKeyLength.into());
    }
    let key_node_id = read_word_be(&rest[..w]);
    if key_node_id != node_id {
        return Err(NetnodeError::NodeIdMismatch.into());
    }
    let tag = rest[w];
    let after_tag = &rest[w + 1..];
    match after_tag.len() {
        0 => Ok((tag, None)),
        n if n == w => {
            let index = if signed {
                read_word_be_signed(after_tag)
            } else {
                read_word_be(after_tag) as i64
            };
            Ok((tag, Some(index)))
        }
        _ => Err(NetnodeError::BadKeyLength.into()),
    }
}

/// The root-level key `N<name>` used to look up a named netnode's id; not
/// to be confused with a netnode's own name entry (`.<node_id>N`).
fn root_name_key(name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(b'N');
    key.extend_from_slice(name);
    key
}

pub struct Netnode<'a> {
    tree: &'a BTree,
    pub node_id: u64,
    word_size: u8,
}

impl<'a> Netnode<'a> {
    pub fn from_id(tree: &'a BTree, node_id: u64, word_size: u8) -> Self {
        Self {
            tree,
            node_id,
            word_size,
        }
    }

    pub fn from_name(tree: &'a BTree, name: &[u8], word_size: u8) -> Result<Self> {
        let key = root_name_key(name);
        let (_, value) = tree
            .search(Some(&key), Some(&key), true, true, true)
            .ok_or_else(|| NetnodeError::UnknownNode(String::from_utf8_lossy(name).into_owned()))?;
        let node_id = read_word_le_word(value, word_size);
        Ok(Self::from_id(tree, node_id, word_size))
    }

    pub fn make_key(&self, tag: u8, index: Option<i64>) -> Vec<u8> {
        make_key(self.node_id, tag, index, self.word_size)
    }

    pub fn name(&self) -> Result<Vec<u8>> {
        self.entry(b'N', None).map_err(|_| NetnodeError::NoName.into())
    }

    pub fn entry(&self, tag: u8, index: Option<i64>) -> Result<Vec<u8>> {
        let key = self.make_key(tag, index);
        self.tree
            .search(Some(&key), Some(&key), true, true, true)
            .map(|(_, value)| value.to_vec())
            .ok_or_else(|| NetnodeError::NoEntry.into())
    }

    /// Lazy forward iteration over every entry whose key starts with
    /// `make_key(tag)`.
    pub fn entries(&self, tag: u8) -> EntriesIter<'a> {
        EntriesIter {
            tree: self.tree,
            prefix: self.make_key(tag, None),
            last_key: None,
            done: false,
        }
    }

    pub fn alt(&self, index: i64) -> Result<i64> {
        self.entry(b'A', Some(index))
            .map(|v| read_word_le_signed(&v))
    }

    pub fn hash(&self, index: i64) -> Result<Vec<u8>> {
        self.entry(b'H', Some(index))
    }

    pub fn sup(&self, index: i64) -> Result<Vec<u8>> {
        self.entry(b'S', Some(index))
    }

    pub fn value(&self, index: i64) -> Result<Vec<u8>> {
        self.entry(b'V', Some(index))
    }

    /// Iterator form of [`Self::alt`]: every `(index, value)` pair stored
    /// under the `'A'` tag.
    pub fn alts(&self) -> impl Iterator<Item = (i64, i64)> + 'a {
        let node_id = self.node_id;
        let word_size = self.word_size;
        self.entries(b'A').filter_map(move |(key, value)| {
            let (_, index) = break_key(&key, node_id, word_size, true).ok()?;
            Some((index?, read_word_le_signed(&value)))
        })
    }

    /// Iterator form of [`Self::hash`]: every `(index, value)` pair stored
    /// under the `'H'` tag.
    pub fn hashes(&self) -> impl Iterator<Item = (i64, Vec<u8>)> + 'a {
        let node_id = self.node_id;
        let word_size = self.word_size;
        self.entries(b'H').filter_map(move |(key, value)| {
            let (_, index) = break_key(&key, node_id, word_size, false).ok()?;
            Some((index?, value))
        })
    }

    /// Iterator form of [`Self::sup`]: every `(index, value)` pair stored
    /// under the `'S'` tag.
    pub fn sups(&self) -> impl Iterator<Item = (i64, Vec<u8>)> + 'a {
        let node_id = self.node_id;
        let word_size = self.word_size;
        self.entries(b'S').filter_map(move |(key, value)| {
            let (_, index) = break_key(&key, node_id, word_size, false).ok()?;
            Some((index?, value))
        })
    }

    /// Iterator form of [`Self::value`]: every `(index, value)` pair stored
    /// under the `'V'` tag.
    pub fn values(&self) -> impl Iterator<Item = (i64, Vec<u8>)> + 'a {
        let node_id = self.node_id;
        let word_size = self.word_size;
        self.entries(b'V').filter_map(move |(key, value)| {
            let (_, index) = break_key(&key, node_id, word_size, false).ok()?;
            Some((index?, value))
        })
    }

    /// Decodes `data` per the packed-record format DSL (§4.1), big-endian
    /// by default, reversible with a leading `<`.
    pub fn unpack(&self, format: &str, data: &[u8]) -> Result<Vec<Field>> {
        let tokens = pack::parse_format(format)?;
        let (fields, _) = pack::unpack(&tokens, data, self.word_size)?;
        Ok(fields)
    }

    /// As [`Self::unpack`], but also reports how many bytes were consumed
    /// so the caller can keep parsing past a variable-width run.
    pub fn unpack_with_offset(&self, format: &str, data: &[u8]) -> Result<(Vec<Field>, usize)> {
        let tokens = pack::parse_format(format)?;
        pack::unpack(&tokens, data, self.word_size)
    }
}

fn read_word_le_word(bytes: &[u8], word_size: u8) -> u64 {
    if word_size == 8 && bytes.len() >= 8 {
        u64::from_le_bytes(bytes[..8].try_into().unwrap())
    } else {
        let mut buf = [0u8; 4];
        let n = bytes.len().min(4);
        buf[..n].copy_from_slice(&bytes[..n]);
        u32::from_le_bytes(buf).into()
    }
}

pub struct EntriesIter<'a> {
    tree: &'a BTree,
    prefix: Vec<u8>,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl<'a> Iterator for EntriesIter<'a> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let min: &[u8] = self.last_key.as_deref().unwrap_or(&self.prefix);
        let found = self.tree.search(Some(min), None, false, true, true);
        match found {
            None => {
                self.done = true;
                None
            }
            Some((key, value)) => {
                if !key.starts_with(&self.prefix) {
                    self.done = true;
                    return None;
                }
                self.last_key = Some(key.to_vec());
                Some((key.to_vec(), value.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{BTree, RawLeafEntry, RawPage};

    fn single_leaf_tree(entries: Vec<RawLeafEntry>) -> BTree {
        BTree::materialize(&[RawPage::Leaf(entries)], 1).unwrap()
    }

    #[test]
    fn key_composition_concrete() {
        // 32-bit node_id = 0xFF000010, tag = 'S', index = 5
        let key = make_key(0xFF00_0010, b'S', Some(5), 4);
        assert_eq!(
            key,
            vec![0x2E, 0xFF, 0x00, 0x00, 0x10, 0x53, 0x00, 0x00, 0x00, 0x05]
        );
    }

    #[test]
    fn round_trip_key_codec_unsigned() {
        let key = make_key(0x1234, b'S', Some(42), 4);
        let (tag, index) = break_key(&key, 0x1234, 4, false).unwrap();
        assert_eq!(tag, b'S');
        assert_eq!(index, Some(42));
    }

    #[test]
    fn round_trip_key_codec_signed() {
        let key = make_key(0x1234, b'A', Some(-7), 4);
        let (tag, index) = break_key(&key, 0x1234, 4, true).unwrap();
        assert_eq!(tag, b'A');
        assert_eq!(index, Some(-7));
    }

    #[test]
    fn round_trip_key_codec_no_index() {
        let key = make_key(0x1234, b'N', None, 8);
        let (tag, index) = break_key(&key, 0x1234, 8, false).unwrap();
        assert_eq!(tag, b'N');
        assert_eq!(index, None);
    }

    #[test]
    fn alts_iterates_every_stored_index() {
        let entries = vec![
            RawLeafEntry {
                key: make_key(0x1234, b'A', Some(1), 4),
                value: (-7i32).to_le_bytes().to_vec(),
            },
            RawLeafEntry {
                key: make_key(0x1234, b'A', Some(2), 4),
                value: 42i32.to_le_bytes().to_vec(),
            },
        ];
        let tree = single_leaf_tree(entries);
        let node = Netnode::from_id(&tree, 0x1234, 4);
        let collected: Vec<_> = node.alts().collect();
        assert_eq!(collected, vec![(1, -7), (2, 42)]);
    }

    #[test]
    fn hashes_sups_values_iterate_in_key_order() {
        let entries = vec![
            RawLeafEntry {
                key: make_key(0x1234, b'H', Some(0), 4),
                value: b"first".to_vec(),
            },
            RawLeafEntry {
                key: make_key(0x1234, b'H', Some(1), 4),
                value: b"second".to_vec(),
            },
            RawLeafEntry {
                key: make_key(0x1234, b'S', Some(0), 4),
                value: b"sup0".to_vec(),
            },
            RawLeafEntry {
                key: make_key(0x1234, b'V', Some(0), 4),
                value: b"val0".to_vec(),
            },
        ];
        let tree = single_leaf_tree(entries);
        let node = Netnode::from_id(&tree, 0x1234, 4);

        let hashes: Vec<_> = node.hashes().collect();
        assert_eq!(
            hashes,
            vec![(0, b"first".to_vec()), (1, b"second".to_vec())]
        );

        let sups: Vec<_> = node.sups().collect();
        assert_eq!(sups, vec![(0, b"sup0".to_vec())]);

        let values: Vec<_> = node.values().collect();
        assert_eq!(values, vec![(0, b"val0".to_vec())]);
    }
}
