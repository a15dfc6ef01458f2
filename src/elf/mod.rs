//! ELF emitter (§4.9): assembles sections, a symbol table, and string
//! tables into a spec-conforming ELF file with correct program headers,
//! section headers, offsets, and cross-references. Also provides an ELF
//! reader (§4.9.1), used only to support the structural round-trip
//! property test (spec.md §8) — not exposed as a CLI input path.

pub mod constants;
mod reader;

pub use reader::{read_elf, ParsedElf, ParsedSection, ParsedSymbol};

use crate::bundle::{Bundle, SymbolKind};
use crate::error::Result;
use constants::*;

#[derive(Clone, Debug)]
pub struct SymbolEntry {
    pub name: Vec<u8>,
    pub binding: u8,
    pub sym_type: u8,
    pub visibility: u8,
    pub section_index: u16,
    pub value: u64,
    pub size: u64,
}

impl SymbolEntry {
    /// The mandatory zero-filled reserved entry every symbol table opens with.
    fn null() -> Self {
        Self {
            name: Vec::new(),
            binding: STB_LOCAL,
            sym_type: STT_NOTYPE,
            visibility: STV_DEFAULT,
            section_index: SHN_UNDEF,
            value: 0,
            size: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub enum SectionPayload {
    Bytes(Vec<u8>),
    /// Built at emit time from every section's interned name (and, for a
    /// symbol table's strtab, every symbol's interned name).
    StringTable,
    SymbolTable(Vec<SymbolEntry>),
}

#[derive(Clone, Debug)]
pub struct Section {
    pub name: Vec<u8>,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub link: u32,
    pub info: u32,
    pub align: u64,
    pub entry_size: u64,
    pub payload: SectionPayload,
}

impl Section {
    pub fn bytes(name: &[u8], sh_type: u32, flags: u64, addr: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.to_vec(),
            sh_type,
            flags,
            addr,
            link: 0,
            info: 0,
            align: 1,
            entry_size: 0,
            payload: SectionPayload::Bytes(data),
        }
    }

    fn is_alloc(&self) -> bool {
        self.flags & SHF_ALLOC != 0
    }
}

#[derive(Clone, Debug)]
pub struct ElfMetadata {
    pub class_64: bool,
    pub big_endian: bool,
    pub abi: u8,
    pub abi_version: u8,
    pub object_type: u16,
    pub machine: u16,
    pub entry: u64,
    pub flags: u32,
}

impl Default for ElfMetadata {
    /// Big-endian 64-bit, per Design Note "Endianness defaults".
    fn default() -> Self {
        Self {
            class_64: true,
            big_endian: true,
            abi: ELFOSABI_NONE,
            abi_version: 0,
            object_type: ET_NONE,
            machine: EM_NONE,
            entry: 0,
            flags: 0,
        }
    }
}

pub struct Elf {
    pub meta: ElfMetadata,
    pub sections: Vec<Section>,
}

impl Elf {
    pub fn new(meta: ElfMetadata) -> Self {
        Self {
            meta,
            sections: Vec::new(),
        }
    }

    /// Builds the section list and symbol table from a [`Bundle`]
    /// (SPEC_FULL §4.9, grounded on `sc/elf/__init__.py::to_sym`).
    pub fn from_bundle(bundle: &Bundle, meta: ElfMetadata) -> Self {
        let mut elf = Elf::new(meta);

        for section in &bundle.sections {
            let (default_type, default_flags) = default_section_type_flags(&section.name);
            let mut flags = default_flags;
            if section.flags.write {
                flags |= SHF_WRITE;
            }
            if section.flags.execute {
                flags |= SHF_EXECINSTR;
            }
            elf.sections.push(Section::bytes(
                &section.name,
                default_type,
                flags,
                section.start,
                Vec::new(),
            ));
        }

        let mut entries = Vec::new();
        for symbol in &bundle.symbols {
            let Some(section_index) = bundle.section_index_for(symbol.address) else {
                log::warn!(
                    "symbol {:?} at {:#x} matches no section; dropping",
                    String::from_utf8_lossy(&symbol.name),
                    symbol.address
                );
                continue;
            };
            let sym_type = match symbol.kind {
                SymbolKind::Function => STT_FUNC,
                SymbolKind::Global => STT_OBJECT,
            };
            entries.push(SymbolEntry {
                name: symbol.name.clone(),
                binding: STB_LOCAL,
                sym_type,
                visibility: STV_DEFAULT,
                // +1 for the mandatory leading undefined section.
                section_index: (section_index + 1) as u16,
                value: symbol.address,
                size: 0,
            });
        }

        elf.sections.push(Section {
            name: b".symtab".to_vec(),
            sh_type: SHT_SYMTAB,
            flags: SHF_ALLOC,
            addr: 0,
            link: 0,
            info: 0,
            align: 1,
            entry_size: 0,
            payload: SectionPayload::SymbolTable(entries),
        });

        elf
    }

    /// Runs the six-step emit algorithm of spec.md §4.9.
    pub fn emit(&self) -> Result<Vec<u8>> {
        let class = if self.meta.class_64 {
            Class::Elf64
        } else {
            Class::Elf32
        };
        let word_size = class.word_size();
        let le = !self.meta.big_endian;

        let mut sections = self.sections.clone();

        if !sections.iter().any(|s| s.name == b".shstrtab") {
            sections.push(Section {
                name: b".shstrtab".to_vec(),
                sh_type: SHT_STRTAB,
                flags: 0,
                addr: 0,
                link: 0,
                info: 0,
                align: 1,
                entry_size: 0,
                payload: SectionPayload::StringTable,
            });
        }
        if !sections.iter().any(|s| s.name == b".strtab") {
            sections.push(Section {
                name: b".strtab".to_vec(),
                sh_type: SHT_STRTAB,
                flags: 0,
                addr: 0,
                link: 0,
                info: 0,
                align: 1,
                entry_size: 0,
                payload: SectionPayload::StringTable,
            });
        }

        let shstrtab_index = sections
            .iter()
            .position(|s| s.name == b".shstrtab")
            .expect("just ensured");
        let strtab_index = sections
            .iter()
            .position(|s| s.name == b".strtab")
            .expect("just ensured");

        // Intern every section's name into shstrtab.
        let mut shstrtab_builder = StringTableBuilder::new();
        let mut name_offsets = Vec::with_capacity(sections.len());
        for section in &sections {
            name_offsets.push(shstrtab_builder.intern(&section.name));
        }

        // Every symbol name is interned into the one `.strtab` ahead of
        // time, since a symbol record needs the offset inline.
        let mut strtab_builder = StringTableBuilder::new();
        let mut symbol_name_offsets: Vec<Vec<u32>> = Vec::with_capacity(sections.len());
        for section in &sections {
            if let SectionPayload::SymbolTable(entries) = &section.payload {
                symbol_name_offsets.push(
                    entries
                        .iter()
                        .map(|entry| strtab_builder.intern(&entry.name))
                        .collect(),
                );
            } else {
                symbol_name_offsets.push(Vec::new());
            }
        }

        // Serialize each section's payload. Symtab sections additionally
        // need their `link`/`entry_size` patched once serialized; collected
        // here and applied after the loop since `sections` can't be mutated
        // while its own iterator is borrowed.
        let mut payloads: Vec<Vec<u8>> = Vec::with_capacity(sections.len());
        let mut symtab_patches: Vec<(usize, u32, u64)> = Vec::new();
        for (i, section) in sections.iter().enumerate() {
            let bytes = match &section.payload {
                SectionPayload::Bytes(data) => data.clone(),
                SectionPayload::StringTable if i == strtab_index => Vec::new(), // filled below
                SectionPayload::StringTable => Vec::new(), // shstrtab, filled below
                SectionPayload::SymbolTable(entries) => {
                    let mut buf = Vec::new();
                    write_symbol_entry(&mut buf, class, le, &SymbolEntry::null(), 0);
                    for (entry, name_offset) in entries.iter().zip(&symbol_name_offsets[i]) {
                        write_symbol_entry(&mut buf, class, le, entry, *name_offset);
                    }
                    symtab_patches.push((
                        i,
                        (strtab_index + 1) as u32, // +1 for null section
                        8 + 2 * u64::from(word_size),
                    ));
                    buf
                }
            };
            payloads.push(bytes);
        }
        for (i, link, entry_size) in symtab_patches {
            sections[i].link = link;
            sections[i].entry_size = entry_size;
        }
        payloads[shstrtab_index] = shstrtab_builder.finish();
        payloads[strtab_index] = strtab_builder.finish();

        // Layout pass: offsets are relative to the end of the program
        // header table; filled in as an absolute offset afterward.
        let ehsize = if self.meta.class_64 { 64 } else { 52 };
        let phentsize = 8 + 6 * u32::from(word_size);
        let shentsize = 16 + 6 * u32::from(word_size);

        let alloc_count = sections.iter().filter(|s| s.is_alloc()).count();
        let phnum = alloc_count as u16;

        let mut sh_offsets = vec![0u64; sections.len()];
        let mut ph_entries: Vec<(u64, u64, u64, u64, u32)> = Vec::new(); // (offset, size, addr, align, flags)
        let mut cursor: u64 = 0;
        for (i, section) in sections.iter().enumerate() {
            let len = payloads[i].len() as u64;
            let is_nobits = section.sh_type == SHT_NOBITS;
            sh_offsets[i] = cursor;
            if section.is_alloc() {
                let mut pflags = PF_R;
                if section.flags & SHF_WRITE != 0 {
                    pflags |= PF_W;
                }
                if section.flags & SHF_EXECINSTR != 0 {
                    pflags |= PF_X;
                }
                ph_entries.push((cursor, len, section.addr, section.align.max(1), pflags));
            }
            if !is_nobits {
                cursor += len;
            }
        }
        let payload_end = cursor;
        let sh_off_base = payload_end;

        // `e_phoff` is fixed at the header size (program headers sit right
        // after the ELF header); the global offset adjustment applied to
        // every other offset is `e_phoff + e_phnum * e_phentsize` (§4.9 step 6).
        let e_phoff = u64::from(ehsize);
        let global_offset = e_phoff + u64::from(phnum) * u64::from(phentsize);

        let mut out = Vec::new();
        write_elf_header(
            &mut out,
            class,
            le,
            &self.meta,
            e_phoff,
            global_offset + sh_off_base,
            phentsize as u16,
            phnum,
            shentsize as u16,
            (sections.len() + 1) as u16,
            (shstrtab_index + 1) as u16,
        );

        for (offset, size, addr, align, pflags) in &ph_entries {
            write_program_header(
                &mut out,
                class,
                le,
                *pflags,
                global_offset + offset,
                *addr,
                *size,
                *align,
            );
        }

        for payload in &payloads {
            out.extend_from_slice(payload);
        }

        // Null section header (index 0).
        write_section_header(&mut out, class, le, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
        for (i, section) in sections.iter().enumerate() {
            let sh_size = payloads[i].len() as u64;
            write_section_header(
                &mut out,
                class,
                le,
                name_offsets[i],
                section.sh_type,
                section.flags,
                section.addr,
                global_offset + sh_offsets[i],
                sh_size,
                section.link,
                section.info,
                section.align,
                section.entry_size,
            );
        }

        Ok(out)
    }
}

struct StringTableBuilder {
    buf: Vec<u8>,
}

impl StringTableBuilder {
    fn new() -> Self {
        Self { buf: vec![0u8] }
    }

    fn intern(&mut self, name: &[u8]) -> u32 {
        if name.is_empty() {
            return 0;
        }
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(name);
        self.buf.push(0);
        offset
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn write_u16(out: &mut Vec<u8>, v: u16, le: bool) {
    out.extend_from_slice(&(if le { v.to_le_bytes() } else { v.to_be_bytes() }));
}
fn write_u32(out: &mut Vec<u8>, v: u32, le: bool) {
    out.extend_from_slice(&(if le { v.to_le_bytes() } else { v.to_be_bytes() }));
}
fn write_u64(out: &mut Vec<u8>, v: u64, le: bool) {
    out.extend_from_slice(&(if le { v.to_le_bytes() } else { v.to_be_bytes() }));
}
fn write_word(out: &mut Vec<u8>, class: Class, v: u64, le: bool) {
    match class {
        Class::Elf32 => write_u32(out, v as u32, le),
        Class::Elf64 => write_u64(out, v, le),
    }
}

#[allow(clippy::too_many_arguments)]
fn write_elf_header(
    out: &mut Vec<u8>,
    class: Class,
    le: bool,
    meta: &ElfMetadata,
    e_phoff: u64,
    e_shoff: u64,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
) {
    out.extend_from_slice(b"\x7fELF");
    out.push(class as u8);
    out.push(if le { 1 } else { 2 });
    out.push(EV_CURRENT);
    out.push(meta.abi);
    out.push(meta.abi_version);
    out.extend_from_slice(&[0u8; 7]);
    write_u16(out, meta.object_type, le);
    write_u16(out, meta.machine, le);
    write_u32(out, u32::from(EV_CURRENT), le);
    write_word(out, class, meta.entry, le);
    write_word(out, class, e_phoff, le);
    write_word(out, class, e_shoff, le);
    write_u32(out, meta.flags, le);
    let ehsize = if matches!(class, Class::Elf64) { 64 } else { 52 };
    write_u16(out, ehsize, le);
    write_u16(out, e_phentsize, le);
    write_u16(out, e_phnum, le);
    write_u16(out, e_shentsize, le);
    write_u16(out, e_shnum, le);
    write_u16(out, e_shstrndx, le);
}

fn write_program_header(
    out: &mut Vec<u8>,
    class: Class,
    le: bool,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_filesz: u64,
    p_align: u64,
) {
    write_u32(out, PT_LOAD, le);
    if matches!(class, Class::Elf64) {
        write_u32(out, p_flags, le);
    }
    write_word(out, class, p_offset, le);
    write_word(out, class, p_vaddr, le); // p_vaddr
    write_word(out, class, p_vaddr, le); // p_paddr == p_vaddr
    write_word(out, class, p_filesz, le);
    write_word(out, class, p_filesz, le); // p_memsz == p_filesz
    if matches!(class, Class::Elf32) {
        write_u32(out, p_flags, le);
    }
    write_word(out, class, p_align, le);
}

#[allow(clippy::too_many_arguments)]
fn write_section_header(
    out: &mut Vec<u8>,
    class: Class,
    le: bool,
    sh_name: u32,
    sh_type: u32,
    sh_flags: u64,
    sh_addr: u64,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_info: u32,
    sh_addralign: u64,
    sh_entsize: u64,
) {
    write_u32(out, sh_name, le);
    write_u32(out, sh_type, le);
    write_word(out, class, sh_flags, le);
    write_word(out, class, sh_addr, le);
    write_word(out, class, sh_offset, le);
    write_word(out, class, sh_size, le);
    write_u32(out, sh_link, le);
    write_u32(out, sh_info, le);
    write_word(out, class, sh_addralign, le);
    write_word(out, class, sh_entsize, le);
}

fn write_symbol_entry(
    out: &mut Vec<u8>,
    class: Class,
    le: bool,
    entry: &SymbolEntry,
    name_offset: u32,
) {
    let st_info = (entry.binding << 4) | (entry.sym_type & 0xF);
    match class {
        Class::Elf32 => {
            write_u32(out, name_offset, le);
            write_u32(out, entry.value as u32, le);
            write_u32(out, entry.size as u32, le);
            out.push(st_info);
            out.push(entry.visibility & 3);
            write_u16(out, entry.section_index, le);
        }
        Class::Elf64 => {
            write_u32(out, name_offset, le);
            out.push(st_info);
            out.push(entry.visibility & 3);
            write_u16(out, entry.section_index, le);
            write_u64(out, entry.value, le);
            write_u64(out, entry.size, le);
        }
    }
}
