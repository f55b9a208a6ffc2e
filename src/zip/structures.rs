//! ZIP record layouts, one struct per header.
//!
//! Each record exposes its fixed size (or a `len_for` helper for records that
//! embed the file name) next to the field list that realizes it. The size
//! predictor only ever uses these sizes, so the two cannot drift apart.

use crate::error::Result;

use super::datetime::DosDateTime;
use super::fields::{Field, encode};

/// Version 4.5: data descriptors and ZIP64 extensions.
pub const VERSION: u16 = 0x002d;

/// Bit 3: sizes and CRC are deferred to the data descriptor.
/// Bit 11: file names are UTF-8.
pub const FLAGS: u16 = 0x0808;

pub const METHOD_STORED: u16 = 0;

/// Totals at or above this value require ZIP64.
pub const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

const SENTINEL_U16: u16 = 0xFFFF;
const SENTINEL_U32: u32 = 0xFFFF_FFFF;

/// Field widths used for every header of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatMode {
    Standard,
    Zip64,
}

impl FormatMode {
    /// Mode required for an archive of `total` bytes.
    pub fn for_total(total: u64) -> Self {
        if total >= ZIP64_THRESHOLD {
            FormatMode::Zip64
        } else {
            FormatMode::Standard
        }
    }

    pub fn is_zip64(&self) -> bool {
        matches!(self, FormatMode::Zip64)
    }
}

/// ZIP64 extended information extra field (tag 0x0001) - 32 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64ExtraField {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub header_offset: u64,
}

impl Zip64ExtraField {
    pub const TAG: u16 = 0x0001;
    pub const DATA_SIZE: u16 = 28;
    pub const SIZE: u64 = 32;

    fn fields<'a>(&self) -> [Field<'a>; 6] {
        [
            Field::u16(Self::TAG),
            Field::u16(Self::DATA_SIZE),
            Field::u64(self.uncompressed_size),
            Field::u64(self.compressed_size),
            Field::u64(self.header_offset),
            Field::u32(0), // Disk start number
        ]
    }

    fn len_for(mode: FormatMode) -> u64 {
        match mode {
            FormatMode::Standard => 0,
            FormatMode::Zip64 => Self::SIZE,
        }
    }
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
#[derive(Debug, Clone, Copy)]
pub struct LocalFileHeader<'a> {
    pub name: &'a [u8],
    pub modified: DosDateTime,
    pub header_offset: u64,
    pub mode: FormatMode,
}

impl LocalFileHeader<'_> {
    pub const SIGNATURE: u32 = 0x04034b50;
    pub const BASE_SIZE: u64 = 30;

    pub fn len_for(name_len: u64, mode: FormatMode) -> u64 {
        Self::BASE_SIZE + name_len + Zip64ExtraField::len_for(mode)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let zip64 = self.mode.is_zip64();
        // Sizes are unknown until the payload has been streamed.
        let placeholder = if zip64 { SENTINEL_U32 } else { 0 };

        let mut fields = vec![
            Field::u32(Self::SIGNATURE),
            Field::u16(VERSION),
            Field::u16(FLAGS),
            Field::u16(METHOD_STORED),
            Field::u16(self.modified.time()),
            Field::u16(self.modified.date()),
            Field::u32(0), // CRC-32
            Field::u32(placeholder),
            Field::u32(placeholder),
            Field::int(self.name.len() as u64, 2),
            Field::int(Zip64ExtraField::len_for(self.mode), 2),
            Field::Raw(self.name),
        ];
        if zip64 {
            let extra = Zip64ExtraField {
                uncompressed_size: 0,
                compressed_size: 0,
                header_offset: self.header_offset,
            };
            fields.extend(extra.fields());
        }
        encode(&fields)
    }
}

/// Data descriptor without signature - 12 bytes, 20 bytes with ZIP64 sizes
#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub size: u64,
    pub mode: FormatMode,
}

impl DataDescriptor {
    pub const SIZE: u64 = 12;
    pub const ZIP64_SIZE: u64 = 20;

    pub fn len_for(mode: FormatMode) -> u64 {
        match mode {
            FormatMode::Standard => Self::SIZE,
            FormatMode::Zip64 => Self::ZIP64_SIZE,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let width = if self.mode.is_zip64() { 8 } else { 4 };
        encode(&[
            Field::u32(self.crc32),
            Field::int(self.size, width), // Compressed size
            Field::int(self.size, width), // Uncompressed size
        ])
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name and extra field
#[derive(Debug, Clone, Copy)]
pub struct CentralDirectoryHeader<'a> {
    pub name: &'a [u8],
    pub modified: DosDateTime,
    pub crc32: u32,
    pub size: u64,
    pub header_offset: u64,
    pub mode: FormatMode,
}

impl CentralDirectoryHeader<'_> {
    pub const SIGNATURE: u32 = 0x02014b50;
    pub const BASE_SIZE: u64 = 46;

    pub fn len_for(name_len: u64, mode: FormatMode) -> u64 {
        Self::BASE_SIZE + name_len + Zip64ExtraField::len_for(mode)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let zip64 = self.mode.is_zip64();
        let (size, offset) = if zip64 {
            (SENTINEL_U32 as u64, SENTINEL_U32 as u64)
        } else {
            (self.size, self.header_offset)
        };

        let mut fields = vec![
            Field::u32(Self::SIGNATURE),
            Field::u16(VERSION), // Version made by
            Field::u16(VERSION), // Version needed to extract
            Field::u16(FLAGS),
            Field::u16(METHOD_STORED),
            Field::u16(self.modified.time()),
            Field::u16(self.modified.date()),
            Field::u32(self.crc32),
            Field::int(size, 4), // Compressed size
            Field::int(size, 4), // Uncompressed size
            Field::int(self.name.len() as u64, 2),
            Field::int(Zip64ExtraField::len_for(self.mode), 2),
            Field::u16(0), // File comment length
            Field::u16(0), // Disk number start
            Field::u16(0), // Internal attributes
            Field::u32(0), // External attributes
            Field::int(offset, 4),
            Field::Raw(self.name),
        ];
        if zip64 {
            let extra = Zip64ExtraField {
                uncompressed_size: self.size,
                compressed_size: self.size,
                header_offset: self.header_offset,
            };
            fields.extend(extra.fields());
        }
        encode(&fields)
    }
}

/// ZIP64 End of Central Directory - 56 bytes
#[derive(Debug, Clone, Copy)]
pub struct Zip64EOCD {
    pub entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: u32 = 0x06064b50;
    pub const SIZE: u64 = 56;
    /// Size of the record after the signature and this field.
    const RECORD_SIZE: u64 = 44;

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&[
            Field::u32(Self::SIGNATURE),
            Field::u64(Self::RECORD_SIZE),
            Field::u16(VERSION), // Version made by
            Field::u16(VERSION), // Version needed to extract
            Field::u32(0),       // Number of this disk
            Field::u32(0),       // Disk with central directory
            Field::u64(self.entries),
            Field::u64(self.entries),
            Field::u64(self.cd_size),
            Field::u64(self.cd_offset),
        ])
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, Copy)]
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: u32 = 0x07064b50;
    pub const SIZE: u64 = 20;

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&[
            Field::u32(Self::SIGNATURE),
            Field::u32(0), // Disk with ZIP64 EOCD
            Field::u64(self.eocd64_offset),
            Field::u32(1), // Total disks
        ])
    }
}

/// End of Central Directory (EOCD) - 22 bytes, no comment
#[derive(Debug, Clone, Copy)]
pub struct EndOfCentralDirectory {
    pub entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub mode: FormatMode,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x06054b50;
    pub const SIZE: u64 = 22;

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (entries, cd_size, cd_offset) = if self.mode.is_zip64() {
            (
                SENTINEL_U16 as u64,
                SENTINEL_U32 as u64,
                SENTINEL_U32 as u64,
            )
        } else {
            (self.entries, self.cd_size, self.cd_offset)
        };

        encode(&[
            Field::u32(Self::SIGNATURE),
            Field::u16(0), // Number of this disk
            Field::u16(0), // Disk with central directory
            Field::int(entries, 2),
            Field::int(entries, 2),
            Field::int(cd_size, 4),
            Field::int(cd_offset, 4),
            Field::u16(0), // Comment length
        ])
    }
}
