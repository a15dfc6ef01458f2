//! CLI front-end (§4.13): wires file I/O and writer selection around the
//! `idb_symbols` library. The library stays `anyhow`-free; this binary is
//! the only place `anyhow::Context` is used, to attach file-path context to
//! errors the way the host crate's own tool binaries do.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use idb_symbols::bundle::{self, Bundle, ImportOptions};
use idb_symbols::elf::constants::{
    ELFOSABI_LINUX, ELFOSABI_NONE, EM_386, EM_AARCH64, EM_ARM, EM_NONE, EM_X86_64, ET_EXEC,
    ET_NONE, ET_REL,
};
use idb_symbols::elf::{Elf, ElfMetadata};
use idb_symbols::ghidra;
use idb_symbols::writers;

/// Converts an IDA Pro IDB database or a Ghidra XML export into an ELF
/// symbols-only object, a JSON symbol map, or a text listing.
#[derive(Parser, Debug)]
#[command(name = "idb-symbols", version, about)]
struct Args {
    /// Read input from an IDA Pro IDB file.
    #[arg(long, value_name = "PATH")]
    idb: Option<PathBuf>,

    /// Read input from a Ghidra XML export.
    #[arg(long, value_name = "PATH", conflicts_with = "idb")]
    ghidra_xml: Option<PathBuf>,

    /// Write an ELF symbols-only object to PATH.
    #[arg(long, value_name = "PATH")]
    sym: Option<PathBuf>,

    /// Write a JSON symbol map to PATH (`-` for stdout).
    #[arg(long, value_name = "PATH")]
    json: Option<String>,

    /// Write a text symbol listing to PATH (`-` for stdout).
    #[arg(long, value_name = "PATH")]
    txt: Option<String>,

    /// Drop named functions from the output.
    #[arg(long)]
    no_functions: bool,

    /// Emit unnamed functions as `sub_{address:x}`.
    #[arg(long)]
    auto_functions: bool,

    /// Drop global (non-function) symbols from the output.
    #[arg(long)]
    no_globals: bool,

    /// Override the word size implied by the input (32 or 64).
    #[arg(long, value_parser = ["32", "64"])]
    word_size: Option<String>,

    /// Override the endianness implied by the input.
    #[arg(long, value_parser = ["little", "big"])]
    endianness: Option<String>,

    /// Warn (rather than silently skip) if the IDB's section checksums
    /// cannot be verified.
    #[arg(long)]
    verify_checksum: bool,

    /// ELF `e_ident[EI_OSABI]` override: "none" or "linux".
    #[arg(long, value_parser = ["none", "linux"])]
    abi: Option<String>,

    /// ELF `e_ident[EI_ABIVERSION]` override.
    #[arg(long)]
    abi_version: Option<u8>,

    /// ELF `e_type` override: "none", "rel", or "exec".
    #[arg(long, value_parser = ["none", "rel", "exec"])]
    r#type: Option<String>,

    /// ELF `e_machine` override: "none", "386", "arm", "x86-64", or "aarch64".
    #[arg(long, value_parser = ["none", "386", "arm", "x86-64", "aarch64"])]
    machine: Option<String>,

    /// ELF `e_entry` override.
    #[arg(long, value_parser = parse_u64)]
    entry_point: Option<u64>,

    /// ELF `e_flags` override.
    #[arg(long, value_parser = parse_u32)]
    flags: Option<u32>,
}

fn parse_u64(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        Ok(Box::new(std::io::stdout()))
    } else {
        let file = File::create(path).with_context(|| format!("creating {path}"))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.sym.is_none() && args.json.is_none() && args.txt.is_none() {
        bail!("at least one of --sym, --json, --txt is required");
    }

    let options = ImportOptions {
        no_functions: args.no_functions,
        auto_functions: args.auto_functions,
        no_globals: args.no_globals,
        verify_checksum: args.verify_checksum,
    };

    let mut bundle = match (&args.idb, &args.ghidra_xml) {
        (Some(path), None) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            bundle::from_idb(BufReader::new(file), options)
                .with_context(|| format!("reading IDB file {}", path.display()))?
        }
        (None, Some(path)) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            ghidra::from_ghidra_xml(BufReader::new(file))
                .with_context(|| format!("parsing Ghidra XML export {}", path.display()))?
        }
        (None, None) => bail!("one of --idb or --ghidra-xml is required"),
        (Some(_), Some(_)) => unreachable!("clap enforces --idb/--ghidra-xml are mutually exclusive"),
    };

    if let Some(word_size) = &args.word_size {
        bundle.word_64 = Some(word_size == "64");
    }
    if let Some(endianness) = &args.endianness {
        bundle.big_endian = Some(endianness == "big");
    }

    if let Some(path) = &args.sym {
        write_sym(&bundle, &args, path)?;
    }
    if let Some(path) = &args.json {
        let mut out = open_output(path)?;
        writers::write_json(&bundle, &mut out).with_context(|| format!("writing JSON to {path}"))?;
    }
    if let Some(path) = &args.txt {
        let mut out = open_output(path)?;
        writers::write_txt(&bundle, &mut out).with_context(|| format!("writing text to {path}"))?;
    }

    Ok(())
}

fn write_sym(bundle: &Bundle, args: &Args, path: &std::path::Path) -> Result<()> {
    let mut meta = ElfMetadata {
        class_64: bundle.word_64.unwrap_or(true),
        big_endian: bundle.big_endian.unwrap_or(true),
        ..ElfMetadata::default()
    };
    if let Some(word_size) = &args.word_size {
        meta.class_64 = word_size == "64";
    }
    if let Some(endianness) = &args.endianness {
        meta.big_endian = endianness == "big";
    }
    if let Some(abi) = &args.abi {
        meta.abi = if abi == "linux" {
            ELFOSABI_LINUX
        } else {
            ELFOSABI_NONE
        };
    }
    if let Some(abi_version) = args.abi_version {
        meta.abi_version = abi_version;
    }
    if let Some(object_type) = &args.r#type {
        meta.object_type = match object_type.as_str() {
            "rel" => ET_REL,
            "exec" => ET_EXEC,
            _ => ET_NONE,
        };
    }
    if let Some(machine) = &args.machine {
        meta.machine = match machine.as_str() {
            "386" => EM_386,
            "arm" => EM_ARM,
            "x86-64" => EM_X86_64,
            "aarch64" => EM_AARCH64,
            _ => EM_NONE,
        };
    }
    if let Some(entry) = args.entry_point {
        meta.entry = entry;
    }
    if let Some(flags) = args.flags {
        meta.flags = flags;
    }
    let elf = Elf::from_bundle(bundle, meta);
    let bytes = elf.emit().context("emitting ELF object")?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(&bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_u64() {
        assert_eq!(parse_u64("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_u64("4096").unwrap(), 4096);
    }
}
