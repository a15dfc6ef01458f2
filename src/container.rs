//! IDB container reader (§4.4): the 88-byte file header, section envelopes,
//! and a selection mask driving which of the six sections get read.

use crate::error::{ContainerError, Result};
use std::io::{Read, Seek, SeekFrom};
use log::{debug, trace, warn};

const SIGNATURE: u32 = 0xAABB_CCDD;
const SUPPORTED_VERSION: u16 = 6;

fn read_u8<R: Read>(r: &mut R) -> std::io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}
fn read_u16_le<R: Read>(r: &mut R) -> std::io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}
fn read_u32_le<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}
fn read_u64_le<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

#[derive(Clone, Copy, Debug)]
pub struct IdbHeader {
    pub magic: [u8; 4],
    /// Derived from `magic`: `IDA2` implies 8, anything else implies 4.
    pub word_size: u8,
    pub id0_offset: u64,
    pub id1_offset: u64,
    pub signature: u32,
    pub version: u16,
    pub nam_offset: u64,
    pub seg_offset: u64,
    pub til_offset: u64,
    pub id0_checksum: u32,
    pub id1_checksum: u32,
    pub nam_checksum: u32,
    pub seg_checksum: u32,
    pub til_checksum: u32,
    pub id2_offset: u64,
    pub id2_checksum: u32,
}

impl IdbHeader {
    pub fn read<R: Read>(input: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if !matches!(&magic, b"IDA0" | b"IDA1" | b"IDA2") {
            return Err(ContainerError::InvalidMagic.into());
        }
        let word_size = if &magic == b"IDA2" { 8 } else { 4 };

        let mut pad = [0u8; 2];
        input.read_exact(&mut pad)?;

        let id0_offset = read_u64_le(input)?;
        let id1_offset = read_u64_le(input)?;

        let mut pad = [0u8; 4];
        input.read_exact(&mut pad)?;

        let signature = read_u32_le(input)?;
        if signature != SIGNATURE {
            return Err(ContainerError::InvalidSignature(signature).into());
        }
        let version = read_u16_le(input)?;
        if version != SUPPORTED_VERSION {
            return Err(ContainerError::UnsupportedVersion(version).into());
        }

        let nam_offset = read_u64_le(input)?;
        let seg_offset = read_u64_le(input)?;
        let til_offset = read_u64_le(input)?;
        let id0_checksum = read_u32_le(input)?;
        let id1_checksum = read_u32_le(input)?;
        let nam_checksum = read_u32_le(input)?;
        let seg_checksum = read_u32_le(input)?;
        let til_checksum = read_u32_le(input)?;
        let id2_offset = read_u64_le(input)?;
        let id2_checksum = read_u32_le(input)?;

        debug!(
            "IDB header: magic={:?} word_size={} version={}",
            std::str::from_utf8(&magic).unwrap_or("?"),
            word_size,
            version
        );

        Ok(Self {
            magic,
            word_size,
            id0_offset,
            id1_offset,
            signature,
            version,
            nam_offset,
            seg_offset,
            til_offset,
            id0_checksum,
            id1_checksum,
            nam_checksum,
            seg_checksum,
            til_checksum,
            id2_offset,
            id2_checksum,
        })
    }
}

/// Which of the six sections a caller wants materialized.
#[derive(Clone, Copy, Debug, Default)]
pub struct SectionSelection {
    pub id0: bool,
    pub id1: bool,
    pub nam: bool,
    pub seg: bool,
    pub til: bool,
    pub id2: bool,
}

impl SectionSelection {
    pub fn all() -> Self {
        Self {
            id0: true,
            id1: true,
            nam: true,
            seg: true,
            til: true,
            id2: true,
        }
    }

    /// Everything this crate actually consumes: ID0 (B-tree/netnodes) and
    /// NAM (the name-address list). ID1/SEG/TIL/ID2 are out of scope beyond
    /// header framing (Non-goal: "deep ID1/TIL/SEG/ID2 parsing").
    pub fn symbols() -> Self {
        Self {
            id0: true,
            nam: true,
            ..Default::default()
        }
    }
}

/// One section's raw, decompressed payload bytes.
pub struct SectionEnvelope {
    pub compression_method: u8,
    pub length: u64,
}

fn read_envelope<R: Read>(input: &mut R) -> Result<SectionEnvelope> {
    let compression_method = read_u8(input)?;
    let length = read_u64_le(input)?;
    if compression_method != 0 {
        return Err(ContainerError::UnsupportedCompression(compression_method).into());
    }
    Ok(SectionEnvelope {
        compression_method,
        length,
    })
}

/// Opens an IDB file and exposes random-access reads of its sections.
pub struct IdbContainer<R> {
    reader: R,
    pub header: IdbHeader,
}

impl<R: Read + Seek> IdbContainer<R> {
    pub fn open(mut reader: R) -> Result<Self> {
        let header = IdbHeader::read(&mut reader)?;
        Ok(Self { reader, header })
    }

    /// Seeks to `offset`, reads the section envelope, and returns the raw
    /// payload bytes (rejecting non-zero compression per §3).
    pub fn read_section_at(&mut self, offset: u64) -> Result<Vec<u8>> {
        trace!("reading IDB section at offset {offset:#x}");
        self.reader.seek(SeekFrom::Start(offset))?;
        let envelope = read_envelope(&mut self.reader)?;
        let mut buf = vec![0u8; envelope.length as usize];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads every section selected by `selection` whose header offset is
    /// non-zero. `verify_checksum` is accepted for interface completeness;
    /// the checksum algorithm is unspecified (Design Note: "Container
    /// checksum algorithm"), so when set this only emits a warning.
    pub fn read_sections(
        &mut self,
        selection: SectionSelection,
        verify_checksum: bool,
    ) -> Result<RawSections> {
        if verify_checksum {
            warn!("checksum verification was requested but the IDB checksum algorithm is unspecified; skipping");
        }
        let mut out = RawSections::default();
        if selection.id0 && self.header.id0_offset != 0 {
            out.id0 = Some(self.read_section_at(self.header.id0_offset)?);
        }
        if selection.id1 && self.header.id1_offset != 0 {
            out.id1 = Some(self.read_section_at(self.header.id1_offset)?);
        }
        if selection.nam && self.header.nam_offset != 0 {
            out.nam = Some(self.read_section_at(self.header.nam_offset)?);
        }
        if selection.seg && self.header.seg_offset != 0 {
            out.seg = Some(self.read_section_at(self.header.seg_offset)?);
        }
        if selection.til && self.header.til_offset != 0 {
            out.til = Some(self.read_section_at(self.header.til_offset)?);
        }
        if selection.id2 && self.header.id2_offset != 0 {
            out.id2 = Some(self.read_section_at(self.header.id2_offset)?);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct RawSections {
    pub id0: Option<Vec<u8>>,
    pub id1: Option<Vec<u8>>,
    pub nam: Option<Vec<u8>>,
    pub seg: Option<Vec<u8>>,
    pub til: Option<Vec<u8>>,
    pub id2: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"IDA2");
        buf.extend_from_slice(&[0u8; 2]);
        buf.extend_from_slice(&88u64.to_le_bytes()); // id0_offset
        buf.extend_from_slice(&0u64.to_le_bytes()); // id1_offset
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&SUPPORTED_VERSION.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // nam_offset
        buf.extend_from_slice(&0u64.to_le_bytes()); // seg_offset
        buf.extend_from_slice(&0u64.to_le_bytes()); // til_offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // id0_checksum
        buf.extend_from_slice(&0u32.to_le_bytes()); // id1_checksum
        buf.extend_from_slice(&0u32.to_le_bytes()); // nam_checksum
        buf.extend_from_slice(&0u32.to_le_bytes()); // seg_checksum
        buf.extend_from_slice(&0u32.to_le_bytes()); // til_checksum
        buf.extend_from_slice(&0u64.to_le_bytes()); // id2_offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // id2_checksum
        assert_eq!(buf.len(), 88);
        buf
    }

    #[test]
    fn reads_valid_header() {
        let mut cursor = Cursor::new(sample_header_bytes());
        let header = IdbHeader::read(&mut cursor).unwrap();
        assert_eq!(header.word_size, 8);
        assert_eq!(header.id0_offset, 88);
        assert_eq!(header.version, 6);
    }

    #[test]
    fn word_size_is_4_for_non_ida2_magic() {
        let mut bytes = sample_header_bytes();
        bytes[0..4].copy_from_slice(b"IDA1");
        let mut cursor = Cursor::new(bytes);
        let header = IdbHeader::read(&mut cursor).unwrap();
        assert_eq!(header.word_size, 4);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_header_bytes();
        bytes[0..4].copy_from_slice(b"NOPE");
        let mut cursor = Cursor::new(bytes);
        assert!(IdbHeader::read(&mut cursor).is_err());
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = sample_header_bytes();
        bytes[34..36].copy_from_slice(&5u16.to_le_bytes());
        let mut cursor = Cursor::new(bytes);
        assert!(IdbHeader::read(&mut cursor).is_err());
    }

    #[test]
    fn rejects_compressed_section() {
        let mut payload = Vec::new();
        payload.push(1u8); // compression method != 0
        payload.extend_from_slice(&4u64.to_le_bytes());
        payload.extend_from_slice(b"data");
        let header_bytes = sample_header_bytes();
        let mut file = header_bytes.clone();
        file.extend_from_slice(&payload);
        let mut container = IdbContainer::open(Cursor::new(file)).unwrap();
        assert!(container.read_section_at(88).is_err());
    }
}
