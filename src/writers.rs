//! JSON and text symbol-map writers (§4.10). Both take any [`Write`] sink so
//! a caller can share one code path between stdout and a real file.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::bundle::{Bundle, SymbolKind};

#[derive(Serialize)]
struct JsonMap {
    functions: BTreeMap<String, u64>,
    globals: BTreeMap<String, u64>,
}

fn split(bundle: &Bundle) -> (BTreeMap<String, u64>, BTreeMap<String, u64>) {
    let mut functions = BTreeMap::new();
    let mut globals = BTreeMap::new();
    for symbol in &bundle.symbols {
        let name = String::from_utf8_lossy(&symbol.name).into_owned();
        match symbol.kind {
            SymbolKind::Function => {
                functions.insert(name, symbol.address);
            }
            SymbolKind::Global => {
                globals.insert(name, symbol.address);
            }
        }
    }
    (functions, globals)
}

/// Writes `{"functions": {name: address}, "globals": {name: address}}`.
pub fn write_json<W: Write>(bundle: &Bundle, out: &mut W) -> io::Result<()> {
    let (functions, globals) = split(bundle);
    let map = JsonMap { functions, globals };
    serde_json::to_writer_pretty(&mut *out, &map)?;
    writeln!(out)
}

/// Writes a `functions:`/`globals:` listing, padding names and addresses to
/// the widest value across both categories together.
pub fn write_txt<W: Write>(bundle: &Bundle, out: &mut W) -> io::Result<()> {
    let (functions, globals) = split(bundle);

    let name_pad = functions
        .keys()
        .chain(globals.keys())
        .map(|n| n.len())
        .max()
        .unwrap_or(0);
    let addr_pad = functions
        .values()
        .chain(globals.values())
        .map(|a| format!("{a:x}").len())
        .max()
        .unwrap_or(1);

    for (label, map) in [("functions", &functions), ("globals", &globals)] {
        writeln!(out, "{label}:")?;
        for (name, address) in map {
            writeln!(out, "  {name:>name_pad$}: 0x{address:0addr_pad$x}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Symbol;

    fn sample() -> Bundle {
        let mut bundle = Bundle::new();
        bundle.symbols.push(Symbol {
            name: b"main".to_vec(),
            address: 0x1000,
            kind: SymbolKind::Function,
        });
        bundle.symbols.push(Symbol {
            name: b"g_counter".to_vec(),
            address: 0x20,
            kind: SymbolKind::Global,
        });
        bundle
    }

    #[test]
    fn json_round_trips_through_serde_value() {
        let bundle = sample();
        let mut buf = Vec::new();
        write_json(&bundle, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["functions"]["main"], 0x1000);
        assert_eq!(value["globals"]["g_counter"], 0x20);
    }

    #[test]
    fn text_padding_is_shared_across_categories() {
        let bundle = sample();
        let mut buf = Vec::new();
        write_txt(&bundle, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // "g_counter" (9 chars) is the widest name in either category, and
        // 0x1000 (4 hex digits) is the widest address; both lines must share
        // that one padding width.
        assert!(text.contains("     main: 0x1000"));
        assert!(text.contains("g_counter: 0x0020"));
    }
}
