//! Function extractor (§4.8): `$ funcs` chunk headers grouped into
//! functions, one head chunk plus zero or more tail chunks per group.

use std::collections::HashMap;

use crate::error::{ExtractError, Result};
use crate::id0::Id0Section;
use crate::netnode::{break_key, Netnode};

const TAIL: u64 = 0b1000_0000_0000_0000;

#[derive(Clone, Debug)]
pub struct ChunkHeader {
    pub start: u64,
    pub end: u64,
    pub flags: u64,
    /// `Some` only for tail chunks: `start - w`, computed from the stored delta.
    pub parent: Option<u64>,
    pub referer_count: Option<u64>,
    pub frame: Option<u64>,
    pub locals_size: Option<u64>,
    pub registers_size: Option<u64>,
    pub arguments_size: Option<u64>,
}

impl ChunkHeader {
    pub fn is_tail(&self) -> bool {
        self.flags & TAIL != 0
    }

    fn decode(netnode: &Netnode, key: &[u8], value: &[u8], word_size: u8) -> Result<Self> {
        let (fields, offset) = netnode.unpack_with_offset("WWT", value)?;
        let start = fields[0].as_u64();
        let end_delta = fields[1].as_u64();
        let flags = fields[2].as_u64();
        let end = start + end_delta;

        let (_, index) = break_key(key, netnode.node_id, word_size, false)?;
        if index != Some(start as i64) {
            return Err(ExtractError::ChunkKeyMismatch.into());
        }

        let rest = &value[offset..];
        if flags & TAIL != 0 {
            // `w`: a signed fixed 4-byte delta, sign-extended before the
            // subtraction (spec.md §3: "negative signed delta").
            let mut buf = [0u8; 4];
            buf.copy_from_slice(rest.get(..4).ok_or(ExtractError::ChunkTruncated)?);
            let w = i32::from_be_bytes(buf) as i64;
            let parent = (start as i64 - w) as u64;

            let referer_fields = netnode.unpack("U", &rest[4..])?;
            let referer_count = referer_fields[0].as_u64();

            Ok(Self {
                start,
                end,
                flags,
                parent: Some(parent),
                referer_count: Some(referer_count),
                frame: None,
                locals_size: None,
                registers_size: None,
                arguments_size: None,
            })
        } else {
            let frame_fields = netnode.unpack("WWTW", rest)?;
            Ok(Self {
                start,
                end,
                flags,
                parent: None,
                referer_count: None,
                frame: Some(frame_fields[0].as_u64()),
                locals_size: Some(frame_fields[1].as_u64()),
                registers_size: Some(frame_fields[2].as_u64()),
                arguments_size: Some(frame_fields[3].as_u64()),
            })
        }
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub head: ChunkHeader,
    pub tails: Vec<ChunkHeader>,
    /// Resolved from the netnode whose id equals the head chunk's `start`.
    pub name: Option<Vec<u8>>,
}

pub fn functions(id0: &Id0Section, word_size: u8) -> Result<Vec<Function>> {
    let netnode = Netnode::from_name(&id0.tree, b"$ funcs", word_size)?;

    let mut groups: HashMap<u64, Vec<ChunkHeader>> = HashMap::new();
    for (key, value) in netnode.entries(b'S') {
        let header = ChunkHeader::decode(&netnode, &key, &value, word_size)?;
        let group_key = header.parent.unwrap_or(header.start);
        groups.entry(group_key).or_default().push(header);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (group_key, headers) in groups {
        let mut head = None;
        let mut tails = Vec::new();
        for header in headers {
            if header.is_tail() {
                tails.push(header);
            } else if head.is_none() {
                head = Some(header);
            } else {
                return Err(ExtractError::DuplicateHead(group_key).into());
            }
        }
        let head = head.ok_or(ExtractError::MissingHead(group_key))?;

        let name = Netnode::from_id(&id0.tree, head.start, word_size)
            .name()
            .ok();

        out.push(Function { head, tails, name });
    }
    out.sort_by_key(|f| f.head.start);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_computes_parent_from_start() {
        // Mirrors the concrete scenario in spec.md §8: one head chunk at
        // 0x1000 and one tail chunk whose stored delta resolves to 0x100.
        let head = ChunkHeader {
            start: 0x1000,
            end: 0x1000,
            flags: 0,
            parent: None,
            referer_count: None,
            frame: Some(0),
            locals_size: Some(0),
            registers_size: Some(0),
            arguments_size: Some(0),
        };
        let tail = ChunkHeader {
            start: 0x1100,
            end: 0x1100,
            flags: TAIL,
            parent: Some(0x1100 - 0x100),
            referer_count: Some(1),
            frame: None,
            locals_size: None,
            registers_size: None,
            arguments_size: None,
        };
        assert_eq!(tail.parent, Some(head.start));

        let mut groups: HashMap<u64, Vec<ChunkHeader>> = HashMap::new();
        groups
            .entry(tail.parent.unwrap_or(tail.start))
            .or_default()
            .push(tail.clone());
        groups
            .entry(head.parent.unwrap_or(head.start))
            .or_default()
            .push(head.clone());
        assert_eq!(groups.len(), 1);
        let group = groups.remove(&0x1000).unwrap();
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn duplicate_head_is_rejected() {
        let head_a = ChunkHeader {
            start: 0x2000,
            end: 0x2010,
            flags: 0,
            parent: None,
            referer_count: None,
            frame: Some(0),
            locals_size: Some(0),
            registers_size: Some(0),
            arguments_size: Some(0),
        };
        let head_b = ChunkHeader {
            start: 0x2000,
            ..head_a.clone()
        };
        let headers = vec![head_a, head_b];
        let mut head = None;
        let mut err = false;
        for header in headers {
            if header.is_tail() {
                continue;
            } else if head.is_none() {
                head = Some(header);
            } else {
                err = true;
            }
        }
        assert!(err);
    }
}
