//! Bundle model (§3, module 8): the source-agnostic intermediate
//! representation exchanged between the IDB/Ghidra importers and the
//! ELF/JSON/text writers.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use crate::container::{IdbContainer, SectionSelection};
use crate::error::{ContainerError, Result};
use crate::extract::{function, segment};
use crate::id0::Id0Section;
use crate::nam::NamSection;
use crate::netnode::Netnode;

/// Bit0 = X, bit1 = W, bit2 = R (matches the raw segment permission layout).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectionFlags {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl SectionFlags {
    pub const NONE: Self = Self {
        read: false,
        write: false,
        execute: false,
    };
    pub const RWX: Self = Self {
        read: true,
        write: true,
        execute: true,
    };

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

#[derive(Clone, Debug)]
pub struct Section {
    pub name: Vec<u8>,
    /// Half-open `[start, end)`.
    pub start: u64,
    pub end: u64,
    pub flags: SectionFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Global,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Vec<u8>,
    pub address: u64,
    pub kind: SymbolKind,
}

#[derive(Clone, Debug, Default)]
pub struct Bundle {
    pub word_64: Option<bool>,
    pub big_endian: Option<bool>,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// First containing section wins, per the data-model invariant that a
    /// symbol belongs to at most one section.
    pub fn section_index_for(&self, address: u64) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| s.start <= address && address < s.end)
    }
}

/// Options controlling which symbols the IDB importer emits (CLI options
/// `--no-functions`/`--auto-functions`/`--no-globals`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImportOptions {
    pub no_functions: bool,
    pub auto_functions: bool,
    pub no_globals: bool,
    pub verify_checksum: bool,
}

/// Builds a [`Bundle`] from an open IDB file (module 8 / SPEC_FULL §3 "Bundle
/// glue"). Reads only ID0 and NAM (Non-goal: no ID1/SEG/TIL/ID2 extraction).
pub fn from_idb<R: Read + Seek>(reader: R, options: ImportOptions) -> Result<Bundle> {
    let mut container = IdbContainer::open(reader)?;
    let word_size = container.header.word_size;
    let sections = container.read_sections(SectionSelection::symbols(), options.verify_checksum)?;

    let id0_data = sections.id0.ok_or(ContainerError::MissingSection("ID0"))?;
    let nam_data = sections.nam.ok_or(ContainerError::MissingSection("NAM"))?;

    let id0 = Id0Section::read(&id0_data)?;
    let nam = NamSection::read(&nam_data, word_size)?;

    let mut bundle = Bundle::new();
    bundle.word_64 = Some(word_size == 8);

    for seg in segment::segments(&id0, word_size)? {
        let mut flags = SectionFlags::NONE;
        if seg.permissions & (1 << 0) != 0 {
            flags.execute = true;
        }
        if seg.permissions & (1 << 1) != 0 {
            flags.write = true;
        }
        if seg.permissions & (1 << 2) != 0 {
            flags.read = true;
        }
        // Unknown flags, so make RWX (SPEC_FULL §3, grounded on
        // sc/idb/__init__.py's "Unknown flags so make RWX").
        if flags.is_empty() {
            flags = SectionFlags::RWX;
        }
        bundle.sections.push(Section {
            name: seg.name.clone(),
            start: seg.start,
            end: seg.end,
            flags,
        });
    }

    // Functions first, then globals, matching sc/idb/__init__.py's order.
    let mut addresses: std::collections::BTreeSet<u64> = nam.addresses.iter().copied().collect();
    let mut functions: BTreeMap<u64, Vec<u8>> = BTreeMap::new();

    for function in function::functions(&id0, word_size)? {
        let start = function.head.start;
        // A function's head-chunk start is never eligible as a global, even
        // when the function itself goes unnamed/unemitted (SPEC_FULL §3).
        addresses.remove(&start);
        match &function.name {
            Some(name) => {
                if !options.no_functions {
                    functions.insert(start, name.clone());
                }
            }
            None if options.auto_functions => {
                functions.insert(start, format!("sub_{start:x}").into_bytes());
            }
            None => {}
        }
    }

    let mut globals: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    if !options.no_globals {
        for address in addresses {
            if let Ok(name) = Netnode::from_id(&id0.tree, address, word_size).name() {
                globals.insert(address, name);
            }
        }
    }

    for (address, name) in functions {
        bundle.symbols.push(Symbol {
            name,
            address,
            kind: SymbolKind::Function,
        });
    }
    for (address, name) in globals {
        bundle.symbols.push(Symbol {
            name,
            address,
            kind: SymbolKind::Global,
        });
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_lookup_first_match_wins() {
        let mut bundle = Bundle::new();
        bundle.sections.push(Section {
            name: b".a".to_vec(),
            start: 0x1000,
            end: 0x2000,
            flags: SectionFlags::RWX,
        });
        bundle.sections.push(Section {
            name: b".b".to_vec(),
            start: 0x1800,
            end: 0x2800,
            flags: SectionFlags::RWX,
        });
        assert_eq!(bundle.section_index_for(0x1900), Some(0));
        assert_eq!(bundle.section_index_for(0x2100), Some(1));
        assert_eq!(bundle.section_index_for(0x3000), None);
    }

    #[test]
    fn unknown_permissions_fall_back_to_rwx() {
        let mut flags = SectionFlags::NONE;
        assert!(flags.is_empty());
        flags = if flags.is_empty() {
            SectionFlags::RWX
        } else {
            flags
        };
        assert_eq!(flags, SectionFlags::RWX);
    }
}
