//! ELF constant tables (§6), grounded on the generic ABI and on
//! `original_source/sc/elf/constants.py`'s enum layout.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{ElfError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Class {
    Elf32 = 1,
    Elf64 = 2,
}

impl Class {
    pub fn word_size(self) -> u8 {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    pub fn from_word_size(word_size: u8) -> Self {
        if word_size == 8 {
            Class::Elf64
        } else {
            Class::Elf32
        }
    }

    pub fn try_from_byte(b: u8) -> Result<Self> {
        Self::try_from(b).map_err(|_| ElfError::UnknownClass(b).into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DataEncoding {
    Lsb = 1,
    Msb = 2,
}

impl DataEncoding {
    pub fn is_little(self) -> bool {
        matches!(self, DataEncoding::Lsb)
    }

    pub fn from_big_endian(big_endian: bool) -> Self {
        if big_endian {
            DataEncoding::Msb
        } else {
            DataEncoding::Lsb
        }
    }

    pub fn try_from_byte(b: u8) -> Result<Self> {
        Self::try_from(b).map_err(|_| ElfError::UnknownData(b).into())
    }
}

pub const EV_CURRENT: u8 = 1;

pub const ELFOSABI_NONE: u8 = 0;
pub const ELFOSABI_LINUX: u8 = 3;

pub const ET_NONE: u16 = 0;
pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const ET_CORE: u16 = 4;

pub const EM_NONE: u16 = 0;
pub const EM_386: u16 = 3;
pub const EM_ARM: u16 = 40;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;

pub const PF_X: u32 = 1 << 0;
pub const PF_W: u32 = 1 << 1;
pub const PF_R: u32 = 1 << 2;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOTE: u32 = 7;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_DYNSYM: u32 = 11;
pub const SHT_INIT_ARRAY: u32 = 14;
pub const SHT_FINI_ARRAY: u32 = 15;
pub const SHT_PREINIT_ARRAY: u32 = 16;

pub const SHF_WRITE: u64 = 1 << 0;
pub const SHF_ALLOC: u64 = 1 << 1;
pub const SHF_EXECINSTR: u64 = 1 << 2;
pub const SHF_TLS: u64 = 1 << 10;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;

pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

pub const STV_DEFAULT: u8 = 0;

pub const SHN_UNDEF: u16 = 0;

/// Default `(sh_type, sh_flags)` for conventional section names
/// (SPEC_FULL §4.9, grounded on `sc/elf/__init__.py`'s `SECTION_TYPES`/
/// `SECTION_FLAGS` tables); anything else defaults to `(PROGBITS, ALLOC)`.
pub fn default_section_type_flags(name: &[u8]) -> (u32, u64) {
    match name {
        b".text" => (SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR),
        b".data" | b".data1" => (SHT_PROGBITS, SHF_ALLOC | SHF_WRITE),
        b".rodata" | b".rodata1" => (SHT_PROGBITS, SHF_ALLOC),
        b".bss" => (SHT_NOBITS, SHF_ALLOC | SHF_WRITE),
        b".tbss" => (SHT_NOBITS, SHF_ALLOC | SHF_TLS),
        b".tdata" => (SHT_PROGBITS, SHF_ALLOC | SHF_TLS),
        b".init" | b".fini" => (SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR),
        b".symtab" => (SHT_SYMTAB, 0),
        b".strtab" => (SHT_STRTAB, SHF_ALLOC),
        b".shstrtab" => (SHT_STRTAB, 0),
        b".comment" | b".line" | b".note" => (SHT_PROGBITS, 0),
        name if name.starts_with(b".debug") => (SHT_PROGBITS, 0),
        _ => (SHT_PROGBITS, SHF_ALLOC),
    }
}
