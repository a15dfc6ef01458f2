//! ELF reader (§4.9.1): parses an emitted file back into structured sections
//! and symbols, solely to support the Bundle→ELF structural round-trip
//! property test (spec.md §8). Not reachable from the CLI: ELF is an
//! output-only format for this system.

use crate::error::{ElfError, Result};
use super::constants::{Class, DataEncoding, SHT_SYMTAB};

#[derive(Clone, Debug)]
pub struct ParsedSymbol {
    pub name: Vec<u8>,
    pub binding: u8,
    pub sym_type: u8,
    pub visibility: u8,
    pub section_index: u16,
    pub value: u64,
    pub size: u64,
}

#[derive(Clone, Debug)]
pub struct ParsedSection {
    pub name: Vec<u8>,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    /// `Some` only for `SHT_SYMTAB` sections, decoded against their linked
    /// string table.
    pub symbols: Option<Vec<ParsedSymbol>>,
}

#[derive(Clone, Debug)]
pub struct ParsedElf {
    pub class: Class,
    pub little_endian: bool,
    pub sections: Vec<ParsedSection>,
}

fn read_u16(data: &[u8], off: usize, le: bool) -> Result<u16> {
    let bytes: [u8; 2] = data
        .get(off..off + 2)
        .ok_or(ElfError::InvalidMagic)?
        .try_into()
        .unwrap();
    Ok(if le {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    })
}

fn read_u32(data: &[u8], off: usize, le: bool) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(off..off + 4)
        .ok_or(ElfError::InvalidMagic)?
        .try_into()
        .unwrap();
    Ok(if le {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    })
}

fn read_u64(data: &[u8], off: usize, le: bool) -> Result<u64> {
    let bytes: [u8; 8] = data
        .get(off..off + 8)
        .ok_or(ElfError::InvalidMagic)?
        .try_into()
        .unwrap();
    Ok(if le {
        u64::from_le_bytes(bytes)
    } else {
        u64::from_be_bytes(bytes)
    })
}

fn read_word(data: &[u8], off: usize, class: Class, le: bool) -> Result<u64> {
    match class {
        Class::Elf32 => read_u32(data, off, le).map(u64::from),
        Class::Elf64 => read_u64(data, off, le),
    }
}

fn cstr_at(strtab: &[u8], offset: u32) -> Vec<u8> {
    let start = offset as usize;
    if start >= strtab.len() {
        return Vec::new();
    }
    strtab[start..]
        .iter()
        .take_while(|&&b| b != 0)
        .copied()
        .collect()
}

struct RawShdr {
    name_off: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
}

/// Parses an in-memory ELF file, resolving section names and decoding any
/// `SHT_SYMTAB` section against its linked string table.
pub fn read_elf(data: &[u8]) -> Result<ParsedElf> {
    if data.get(0..4) != Some(b"\x7fELF") {
        return Err(ElfError::InvalidMagic.into());
    }
    let class = Class::try_from_byte(data[4])?;
    let encoding = DataEncoding::try_from_byte(data[5])?;
    let le = encoding.is_little();
    let word_size = class.word_size();

    // e_shoff/e_shentsize/e_shnum/e_shstrndx sit at the tail of the file
    // header; their byte offset depends only on class (word size).
    // e_ident(16) + e_type(2) + e_machine(2) + e_version(4) + e_entry(word)
    // + e_phoff(word) = 24 + 2*word_size, then e_shoff follows.
    let off_shoff = 24 + 2 * usize::from(word_size);
    let shoff = read_word(data, off_shoff, class, le)? as usize;
    let off_shentsize = off_shoff + usize::from(word_size) + 10;
    let shentsize = usize::from(read_u16(data, off_shentsize, le)?);
    let shnum = usize::from(read_u16(data, off_shentsize + 2, le)?);
    let shstrndx = usize::from(read_u16(data, off_shentsize + 4, le)?);

    let mut raw_headers = Vec::with_capacity(shnum);
    for i in 0..shnum {
        let base = shoff + i * shentsize;
        let name_off = read_u32(data, base, le)?;
        let sh_type = read_u32(data, base + 4, le)?;
        let mut o = base + 8;
        let flags = read_word(data, o, class, le)?;
        o += usize::from(word_size);
        let addr = read_word(data, o, class, le)?;
        o += usize::from(word_size);
        let offset = read_word(data, o, class, le)?;
        o += usize::from(word_size);
        let size = read_word(data, o, class, le)?;
        o += usize::from(word_size);
        let link = read_u32(data, o, le)?;
        o += 4;
        let info = read_u32(data, o, le)?;
        raw_headers.push(RawShdr {
            name_off,
            sh_type,
            flags,
            addr,
            offset,
            size,
            link,
            info,
        });
    }

    let shstrtab = raw_headers
        .get(shstrndx)
        .map(|h| &data[h.offset as usize..h.offset as usize + h.size as usize])
        .unwrap_or(&[]);

    let mut sections: Vec<ParsedSection> = raw_headers
        .iter()
        .map(|h| ParsedSection {
            name: cstr_at(shstrtab, h.name_off),
            sh_type: h.sh_type,
            flags: h.flags,
            addr: h.addr,
            size: h.size,
            link: h.link,
            info: h.info,
            symbols: None,
        })
        .collect();

    // State machine (§4.9.1): every symtab section depends on its linked
    // strtab; iterate until all slots are resolved. ELF forbids cycles, so
    // this always terminates within `shnum` passes.
    let mut resolved = vec![false; shnum];
    for (i, h) in raw_headers.iter().enumerate() {
        if h.sh_type != SHT_SYMTAB {
            resolved[i] = true;
        }
    }
    loop {
        let mut progressed = false;
        for i in 0..shnum {
            if resolved[i] {
                continue;
            }
            let link = raw_headers[i].link as usize;
            if link >= shnum || !resolved[link] {
                continue;
            }
            let strtab_h = &raw_headers[link];
            let strtab =
                &data[strtab_h.offset as usize..strtab_h.offset as usize + strtab_h.size as usize];
            let h = &raw_headers[i];
            let entry_size = 8 + 2 * usize::from(word_size);
            let count = if entry_size == 0 {
                0
            } else {
                h.size as usize / entry_size
            };
            let mut symbols = Vec::with_capacity(count);
            let base = h.offset as usize;
            for n in 0..count {
                let entry_off = base + n * entry_size;
                let (name_off, st_info, st_other, st_shndx, value, size) = match class {
                    Class::Elf32 => {
                        let name_off = read_u32(data, entry_off, le)?;
                        let value = read_u32(data, entry_off + 4, le)? as u64;
                        let size = read_u32(data, entry_off + 8, le)? as u64;
                        let st_info = data[entry_off + 12];
                        let st_other = data[entry_off + 13];
                        let st_shndx = read_u16(data, entry_off + 14, le)?;
                        (name_off, st_info, st_other, st_shndx, value, size)
                    }
                    Class::Elf64 => {
                        let name_off = read_u32(data, entry_off, le)?;
                        let st_info = data[entry_off + 4];
                        let st_other = data[entry_off + 5];
                        let st_shndx = read_u16(data, entry_off + 6, le)?;
                        let value = read_u64(data, entry_off + 8, le)?;
                        let size = read_u64(data, entry_off + 16, le)?;
                        (name_off, st_info, st_other, st_shndx, value, size)
                    }
                };
                symbols.push(ParsedSymbol {
                    name: cstr_at(strtab, name_off),
                    binding: st_info >> 4,
                    sym_type: st_info & 0xF,
                    visibility: st_other & 3,
                    section_index: st_shndx,
                    value,
                    size,
                });
            }
            sections[i].symbols = Some(symbols);
            resolved[i] = true;
            progressed = true;
        }
        if resolved.iter().all(|&r| r) {
            break;
        }
        if !progressed {
            // Dangling link with no conforming target; leave unresolved
            // symtabs empty rather than looping forever.
            break;
        }
    }

    // Index 0 is the mandatory reserved null section header, not one the
    // emitter's caller supplied; drop it so `sections` mirrors the section
    // list that was handed to the emitter.
    if !sections.is_empty() {
        sections.remove(0);
    }

    Ok(ParsedElf {
        class,
        little_endian: le,
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        assert!(read_elf(b"NOTELF..").is_err());
    }
}
