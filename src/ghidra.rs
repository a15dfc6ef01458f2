//! Ghidra XML importer (§4.11, supplemented external collaborator): parses a
//! Ghidra "ASCII XML" export into a [`Bundle`], independent of the IDB/
//! B-tree stack.

use std::collections::BTreeMap;
use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::bundle::{Bundle, Section, SectionFlags, Symbol, SymbolKind};
use crate::error::Result;

fn attr(e: &quick_xml::events::BytesStart, key: &[u8]) -> Option<Vec<u8>> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == key {
            Some(a.value.into_owned())
        } else {
            None
        }
    })
}

fn attr_str(e: &quick_xml::events::BytesStart, key: &[u8]) -> Option<String> {
    attr(e, key).map(|v| String::from_utf8_lossy(&v).into_owned())
}

fn parse_hex_addr(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

/// Parses a Ghidra XML export into a [`Bundle`] (grounded on
/// `sc/ghidra/xml_.py`). Malformed `MEMORY_SECTION` elements are skipped
/// individually rather than failing the whole parse.
pub fn from_ghidra_xml<R: BufRead>(input: R) -> Result<Bundle> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text = true;

    let mut globals: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    let mut functions: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    let mut sections = Vec::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"SYMBOL" => {
                    if let (Some(name), Some(addr)) =
                        (attr_str(&e, b"NAME"), attr_str(&e, b"ADDRESS"))
                    {
                        if let Some(address) = parse_hex_addr(&addr) {
                            globals.insert(address, name.into_bytes());
                        }
                    }
                }
                b"FUNCTION" => {
                    if let (Some(name), Some(addr)) =
                        (attr_str(&e, b"NAME"), attr_str(&e, b"ENTRY_POINT"))
                    {
                        if let Some(address) = parse_hex_addr(&addr) {
                            globals.remove(&address);
                            functions.insert(address, name.into_bytes());
                        }
                    }
                }
                b"MEMORY_SECTION" => {
                    let parsed = (|| -> Option<Section> {
                        let name = attr_str(&e, b"NAME")?;
                        let start = parse_hex_addr(&attr_str(&e, b"START_ADDR")?)?;
                        let length = u64::from_str_radix(&attr_str(&e, b"LENGTH")?, 16)
                            .ok()
                            .or_else(|| attr_str(&e, b"LENGTH")?.parse().ok())?;
                        let perms = attr_str(&e, b"PERMISSIONS").unwrap_or_default();
                        let flags = SectionFlags {
                            read: perms.contains('r'),
                            write: perms.contains('w'),
                            execute: perms.contains('x'),
                        };
                        Some(Section {
                            name: name.into_bytes(),
                            start,
                            end: start + length,
                            flags,
                        })
                    })();
                    match parsed {
                        Some(section) => sections.push(section),
                        None => {
                            log::warn!("skipping malformed MEMORY_SECTION element");
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    let mut bundle = Bundle::new();
    bundle.sections = sections;
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
    use std::io::Cursor;

    #[test]
    fn parses_symbols_functions_and_sections() {
        let xml = br#"<PROGRAM>
            <MEMORY_MAP>
                <MEMORY_SECTION NAME=".text" START_ADDR="1000" LENGTH="1000" PERMISSIONS="rx"/>
            </MEMORY_MAP>
            <SYMBOL_TABLE>
                <SYMBOL NAME="g_value" ADDRESS="1800"/>
            </SYMBOL_TABLE>
            <FUNCTIONS>
                <FUNCTION NAME="main" ENTRY_POINT="1000"/>
            </FUNCTIONS>
        </PROGRAM>"#;
        let bundle = from_ghidra_xml(Cursor::new(&xml[..])).unwrap();
        assert_eq!(bundle.sections.len(), 1);
        assert_eq!(bundle.sections[0].start, 0x1000);
        assert_eq!(bundle.sections[0].end, 0x2000);
        assert!(bundle.sections[0].flags.read);
        assert!(bundle.sections[0].flags.execute);
        assert!(!bundle.sections[0].flags.write);

        assert_eq!(bundle.symbols.len(), 2);
        let main = bundle.symbols.iter().find(|s| s.name == b"main").unwrap();
        assert_eq!(main.kind, SymbolKind::Function);
        assert_eq!(main.address, 0x1000);
        let g_value = bundle
            .symbols
            .iter()
            .find(|s| s.name == b"g_value")
            .unwrap();
        assert_eq!(g_value.kind, SymbolKind::Global);
    }

    #[test]
    fn function_address_removes_matching_global() {
        let xml = br#"<PROGRAM>
            <SYMBOL_TABLE>
                <SYMBOL NAME="main" ADDRESS="1000"/>
            </SYMBOL_TABLE>
            <FUNCTIONS>
                <FUNCTION NAME="main" ENTRY_POINT="1000"/>
            </FUNCTIONS>
        </PROGRAM>"#;
        let bundle = from_ghidra_xml(Cursor::new(&xml[..])).unwrap();
        assert_eq!(bundle.symbols.len(), 1);
        assert_eq!(bundle.symbols[0].kind, SymbolKind::Function);
    }

    #[test]
    fn malformed_memory_section_is_skipped_not_fatal() {
        let xml = br#"<PROGRAM>
            <MEMORY_MAP>
                <MEMORY_SECTION NAME=".bad" START_ADDR="zz" LENGTH="10"/>
                <MEMORY_SECTION NAME=".text" START_ADDR="1000" LENGTH="10" PERMISSIONS="rx"/>
            </MEMORY_MAP>
        </PROGRAM>"#;
        let bundle = from_ghidra_xml(Cursor::new(&xml[..])).unwrap();
        assert_eq!(bundle.sections.len(), 1);
        assert_eq!(bundle.sections[0].name, b".text");
    }
}
