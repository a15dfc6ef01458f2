use thiserror::Error;

/// Errors from the IDB container envelope: magic, signature, version, section framing.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("invalid IDB magic")]
    InvalidMagic,
    #[error("invalid IDB signature, expected 0xAABBCCDD, got {0:#010x}")]
    InvalidSignature(u32),
    #[error("unsupported IDB version {0}, only version 6 is supported")]
    UnsupportedVersion(u16),
    #[error("section envelope declares unsupported compression method {0}")]
    UnsupportedCompression(u8),
    #[error("required section {0} is missing")]
    MissingSection(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from B-tree page decoding (§4.2).
#[derive(Debug, Error)]
pub enum PageError {
    #[error("b-tree page entry count overflows page size")]
    EntryCountOverflow,
    #[error("b-tree page record offset {0} out of range")]
    RecordOffsetOutOfRange(u16),
    #[error("b-tree leaf entry indent {indent} exceeds previous key length {prev_len}")]
    InvalidIndent { indent: u16, prev_len: usize },
    #[error("b-tree page entry key or value truncated")]
    Truncated,
    #[error("b-tree page index {0} has no backing page")]
    MissingPage(u32),
}

/// Errors from the proprietary variable-width pack codecs (§4.1).
#[derive(Debug, Error)]
pub enum PackError {
    #[error("packed integer truncated before a full encoding could be read")]
    Truncated,
    #[error("unknown format token {0:?}")]
    UnknownToken(char),
}

/// Errors from netnode key composition/decomposition and lookups (§4.6).
#[derive(Debug, Error)]
pub enum NetnodeError {
    #[error("named netnode {0:?} does not exist")]
    UnknownNode(String),
    #[error("netnode key does not start with '.'")]
    BadKeyPrefix,
    #[error("netnode key node id does not match")]
    NodeIdMismatch,
    #[error("netnode key has an unexpected length")]
    BadKeyLength,
    #[error("netnode has no name entry")]
    NoName,
    #[error("netnode has no entry for the requested tag/index")]
    NoEntry,
}

/// Errors from the segment/function extractors (§4.7, §4.8).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("segment entry key index does not match its stored start address")]
    SegmentKeyMismatch,
    #[error("function chunk entry key index does not match its stored start address")]
    ChunkKeyMismatch,
    #[error("function chunk header truncated before its tail/head fields")]
    ChunkTruncated,
    #[error("function chunk group at {0:#x} has more than one head chunk")]
    DuplicateHead(u64),
    #[error("function chunk group at {0:#x} has no head chunk")]
    MissingHead(u64),
}

/// Errors from ELF emission/parsing (§4.9).
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("invalid ELF magic")]
    InvalidMagic,
    #[error("unknown ELF class {0}")]
    UnknownClass(u8),
    #[error("unknown ELF data encoding {0}")]
    UnknownData(u8),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    Netnode(#[from] NetnodeError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error("malformed Ghidra XML export: {0}")]
    GhidraXml(#[from] quick_xml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
