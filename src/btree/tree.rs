//! Materializes the flat array of raw pages into a navigable tree (§4.3) and
//! implements the directional bounded search primitive used by the netnode
//! layer.

use super::page::RawPage;
use crate::error::{PageError, Result};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Arena index of the page covering keys below this entry's key.
    pub before_page: usize,
    /// Arena index of the page covering keys above this entry's key.
    pub after_page: usize,
}

#[derive(Clone, Debug)]
pub enum Node {
    Leaf(Vec<Entry>),
    Index(Vec<IndexEntry>),
}

/// An arena of materialized pages, reachable from `root`. Pages are shared
/// by arena index rather than by pointer, per Design Note 1 ("Cyclic
/// references"); the underlying format is guaranteed acyclic.
#[derive(Clone, Debug)]
pub struct BTree {
    nodes: Vec<Node>,
    root: usize,
}

impl BTree {
    /// Materializes the tree reachable from `root_page_index`. `raw_pages`
    /// is indexed such that `raw_pages[i]` is the page numbered `i + 1`
    /// (pages are numbered from 1, the header page already excluded).
    pub fn materialize(raw_pages: &[RawPage], root_page_index: u32) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut memo = HashMap::new();
        let root = resolve_page(root_page_index, raw_pages, &mut memo, &mut nodes)?;
        Ok(Self { nodes, root })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Directional bounded search (§4.3). Returns the single entry nearest
    /// one bound, or `None` if no entry satisfies both bounds.
    pub fn search(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inclusive: bool,
        max_inclusive: bool,
        lowest: bool,
    ) -> Option<(&[u8], &[u8])> {
        if self.nodes.is_empty() {
            return None;
        }
        self.search_page(self.root, min, max, min_inclusive, max_inclusive, lowest)
    }

    fn search_page(
        &self,
        page: usize,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inclusive: bool,
        max_inclusive: bool,
        lowest: bool,
    ) -> Option<(&[u8], &[u8])> {
        match &self.nodes[page] {
            Node::Leaf(entries) => {
                let mut best: Option<&Entry> = None;
                for entry in entries {
                    if !satisfies(&entry.key, min, max, min_inclusive, max_inclusive) {
                        continue;
                    }
                    best = Some(match best {
                        None => entry,
                        Some(current) => {
                            if lowest {
                                if entry.key < current.key {
                                    entry
                                } else {
                                    current
                                }
                            } else if entry.key > current.key {
                                entry
                            } else {
                                current
                            }
                        }
                    });
                }
                best.map(|e| (e.key.as_slice(), e.value.as_slice()))
            }
            Node::Index(entries) => {
                if lowest {
                    // smallest entry satisfying the lower bound
                    let bracket = entries
                        .iter()
                        .find(|e| ge_bound(&e.key, min, min_inclusive));
                    let child = bracket.map(|e| e.before_page).unwrap_or_else(|| {
                        entries.last().map(|e| e.after_page).unwrap_or(page)
                    });
                    if child != page {
                        if let Some(found) =
                            self.search_page(child, min, max, min_inclusive, max_inclusive, lowest)
                        {
                            return Some(found);
                        }
                    }
                    bracket
                        .filter(|e| satisfies(&e.key, min, max, min_inclusive, max_inclusive))
                        .map(|e| (e.key.as_slice(), e.value.as_slice()))
                } else {
                    // largest entry satisfying the upper bound
                    let bracket = entries
                        .iter()
                        .rev()
                        .find(|e| le_bound(&e.key, max, max_inclusive));
                    let child = bracket.map(|e| e.after_page).unwrap_or_else(|| {
                        entries.first().map(|e| e.before_page).unwrap_or(page)
                    });
                    if child != page {
                        if let Some(found) =
                            self.search_page(child, min, max, min_inclusive, max_inclusive, lowest)
                        {
                            return Some(found);
                        }
                    }
                    bracket
                        .filter(|e| satisfies(&e.key, min, max, min_inclusive, max_inclusive))
                        .map(|e| (e.key.as_slice(), e.value.as_slice()))
                }
            }
        }
    }
}

fn ge_bound(key: &[u8], min: Option<&[u8]>, min_inclusive: bool) -> bool {
    match min {
        None => true,
        Some(min) => {
            if min_inclusive {
                key >= min
            } else {
                key > min
            }
        }
    }
}

fn le_bound(key: &[u8], max: Option<&[u8]>, max_inclusive: bool) -> bool {
    match max {
        None => true,
        Some(max) => {
            if max_inclusive {
                key <= max
            } else {
                key < max
            }
        }
    }
}

fn satisfies(
    key: &[u8],
    min: Option<&[u8]>,
    max: Option<&[u8]>,
    min_inclusive: bool,
    max_inclusive: bool,
) -> bool {
    ge_bound(key, min, min_inclusive) && le_bound(key, max, max_inclusive)
}

fn resolve_page(
    page_index: u32,
    raw_pages: &[RawPage],
    memo: &mut HashMap<u32, usize>,
    nodes: &mut Vec<Node>,
) -> Result<usize> {
    if let Some(&idx) = memo.get(&page_index) {
        return Ok(idx);
    }
    let raw = usize::try_from(page_index)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| raw_pages.get(i))
        .ok_or(PageError::MissingPage(page_index))?;
    let node = match raw {
        RawPage::Leaf(entries) => Node::Leaf(
            entries
                .iter()
                .map(|e| Entry {
                    key: e.key.clone(),
                    value: e.value.clone(),
                })
                .collect(),
        ),
        RawPage::Index {
            first_child_page,
            entries,
        } => {
            let mut built = Vec::with_capacity(entries.len());
            let mut last_page_index = *first_child_page;
            for entry in entries {
                let before = resolve_page(last_page_index, raw_pages, memo, nodes)?;
                let after = resolve_page(entry.child_page, raw_pages, memo, nodes)?;
                built.push(IndexEntry {
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                    before_page: before,
                    after_page: after,
                });
                last_page_index = entry.child_page;
            }
            Node::Index(built)
        }
    };
    let idx = nodes.len();
    nodes.push(node);
    memo.insert(page_index, idx);
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::page::{RawIndexEntry, RawLeafEntry};

    fn leaf(keys: &[&[u8]]) -> RawPage {
        RawPage::Leaf(
            keys.iter()
                .map(|k| RawLeafEntry {
                    key: k.to_vec(),
                    value: k.to_vec(),
                })
                .collect(),
        )
    }

    // page 1: leaf [01, 05]
    // page 2: leaf [20, 22, 30]
    // page 3: index, first_child=1, entry(key=10, child=2)
    fn sample_tree() -> BTree {
        let raw_pages = vec![
            leaf(&[b"01", b"05"]),
            leaf(&[b"20", b"22", b"30"]),
            RawPage::Index {
                first_child_page: 1,
                entries: vec![RawIndexEntry {
                    key: b"10".to_vec(),
                    value: b"10".to_vec(),
                    child_page: 2,
                }],
            },
        ];
        BTree::materialize(&raw_pages, 3).unwrap()
    }

    #[test]
    fn unbounded_lowest_returns_smallest() {
        let tree = sample_tree();
        let (k, _) = tree.search(None, None, true, true, true).unwrap();
        assert_eq!(k, b"01");
    }

    #[test]
    fn unbounded_highest_returns_largest() {
        let tree = sample_tree();
        let (k, _) = tree.search(None, None, true, true, false).unwrap();
        assert_eq!(k, b"30");
    }

    #[test]
    fn min_inclusive_hits_index_separator() {
        let tree = sample_tree();
        let (k, _) = tree
            .search(Some(b"10"), None, true, true, true)
            .unwrap();
        assert_eq!(k, b"10");
    }

    #[test]
    fn min_exclusive_skips_separator_into_right_child() {
        let tree = sample_tree();
        let (k, _) = tree
            .search(Some(b"10"), None, false, true, true)
            .unwrap();
        assert_eq!(k, b"20");
    }

    #[test]
    fn bounded_range_highest() {
        let tree = sample_tree();
        let (k, _) = tree
            .search(Some(b"06"), Some(b"25"), true, true, false)
            .unwrap();
        assert_eq!(k, b"22");
    }

    #[test]
    fn empty_when_bounds_exclude_everything() {
        let tree = sample_tree();
        assert!(tree.search(Some(b"31"), None, true, true, true).is_none());
    }

    #[test]
    fn materialize_reports_missing_page_instead_of_panicking() {
        // Root index 5 has no backing page in a 1-page array.
        let raw_pages = vec![leaf(&[b"01"])];
        assert!(BTree::materialize(&raw_pages, 5).is_err());
    }

    #[test]
    fn materialize_reports_zero_page_index_as_missing() {
        let raw_pages = vec![leaf(&[b"01"])];
        assert!(BTree::materialize(&raw_pages, 0).is_err());
    }
}
