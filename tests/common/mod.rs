//! Minimal archive reader used to check what the writer emits.
//!
//! Reads from the end like any ZIP reader: EOCD, then the ZIP64 locator and
//! record when the EOCD carries sentinels, then the central directory. Each
//! member's local header, payload and data descriptor are checked against
//! its central directory entry.

#![allow(dead_code)]

use std::io::{Cursor, Read};

use anyhow::{Result, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt};
use futures_util::StreamExt;
use streamzip::{ArchiveStream, ZipError};

const LFH_SIGNATURE: u32 = 0x04034b50;
const CDFH_SIGNATURE: u32 = 0x02014b50;
const EOCD_SIGNATURE: u32 = 0x06054b50;
const EOCD64_SIGNATURE: u32 = 0x06064b50;
const LOCATOR_SIGNATURE: u32 = 0x07064b50;

const EOCD_SIZE: usize = 22;
const LOCATOR_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub crc32: u32,
    pub size: u64,
    pub header_offset: u64,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct Archive {
    pub zip64: bool,
    pub entries: Vec<Entry>,
}

impl Archive {
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Drain an archive stream into memory.
pub async fn collect(mut stream: ArchiveStream) -> Result<Vec<u8>, ZipError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// Parse and cross-check a complete archive.
pub fn read_archive(bytes: &[u8]) -> Result<Archive> {
    ensure!(bytes.len() >= EOCD_SIZE, "archive shorter than an EOCD");
    let eocd_offset = bytes.len() - EOCD_SIZE;

    let mut eocd = Cursor::new(&bytes[eocd_offset..]);
    ensure!(eocd.read_u32::<LittleEndian>()? == EOCD_SIGNATURE, "bad EOCD signature");
    let _disk = eocd.read_u16::<LittleEndian>()?;
    let _cd_disk = eocd.read_u16::<LittleEndian>()?;
    let disk_entries = eocd.read_u16::<LittleEndian>()?;
    let total_entries = eocd.read_u16::<LittleEndian>()?;
    let cd_size = eocd.read_u32::<LittleEndian>()?;
    let cd_offset = eocd.read_u32::<LittleEndian>()?;
    let comment_len = eocd.read_u16::<LittleEndian>()?;
    ensure!(comment_len == 0, "unexpected archive comment");
    ensure!(disk_entries == total_entries, "entry counts disagree");

    let zip64 = total_entries == 0xFFFF || cd_size == 0xFFFF_FFFF || cd_offset == 0xFFFF_FFFF;
    let (entries, cd_size, cd_offset, cd_end) = if zip64 {
        read_zip64_trailer(bytes, eocd_offset)?
    } else {
        (
            total_entries as u64,
            cd_size as u64,
            cd_offset as u64,
            eocd_offset as u64,
        )
    };
    ensure!(cd_offset + cd_size == cd_end, "central directory does not end at the trailer");

    let cd = &bytes[cd_offset as usize..cd_end as usize];
    let mut cursor = Cursor::new(cd);
    let mut parsed = Vec::with_capacity(entries as usize);
    for _ in 0..entries {
        let mut entry = parse_cdfh(&mut cursor)?;
        let payload_end = read_local(bytes, &mut entry, zip64)?;
        ensure!(
            payload_end <= cd_offset,
            "{}: member data runs into the central directory",
            entry.name
        );
        parsed.push(entry);
    }
    ensure!(cursor.position() == cd.len() as u64, "trailing central directory bytes");

    Ok(Archive {
        zip64,
        entries: parsed,
    })
}

fn read_zip64_trailer(bytes: &[u8], eocd_offset: usize) -> Result<(u64, u64, u64, u64)> {
    let locator_offset = eocd_offset
        .checked_sub(LOCATOR_SIZE)
        .ok_or_else(|| anyhow::anyhow!("no room for a ZIP64 locator"))?;
    let mut locator = Cursor::new(&bytes[locator_offset..eocd_offset]);
    ensure!(
        locator.read_u32::<LittleEndian>()? == LOCATOR_SIGNATURE,
        "bad ZIP64 locator signature"
    );
    let _disk = locator.read_u32::<LittleEndian>()?;
    let eocd64_offset = locator.read_u64::<LittleEndian>()?;
    let total_disks = locator.read_u32::<LittleEndian>()?;
    ensure!(total_disks == 1, "multi-disk archive");

    let mut record = Cursor::new(&bytes[eocd64_offset as usize..locator_offset]);
    ensure!(
        record.read_u32::<LittleEndian>()? == EOCD64_SIGNATURE,
        "bad ZIP64 EOCD signature"
    );
    let record_size = record.read_u64::<LittleEndian>()?;
    ensure!(record_size == 44, "unexpected ZIP64 EOCD size {record_size}");
    let _made_by = record.read_u16::<LittleEndian>()?;
    let _needed = record.read_u16::<LittleEndian>()?;
    let _disk = record.read_u32::<LittleEndian>()?;
    let _cd_disk = record.read_u32::<LittleEndian>()?;
    let disk_entries = record.read_u64::<LittleEndian>()?;
    let entries = record.read_u64::<LittleEndian>()?;
    let cd_size = record.read_u64::<LittleEndian>()?;
    let cd_offset = record.read_u64::<LittleEndian>()?;
    ensure!(disk_entries == entries, "entry counts disagree");

    Ok((entries, cd_size, cd_offset, eocd64_offset))
}

fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<Entry> {
    if cursor.read_u32::<LittleEndian>()? != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let mod_time = cursor.read_u16::<LittleEndian>()?;
    let mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut size = cursor.read_u32::<LittleEndian>()? as u64;
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    let _disk_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut header_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut name = vec![0u8; name_len as usize];
    cursor.read_exact(&mut name)?;
    let name = String::from_utf8(name)?;

    let extra_end = cursor.position() + extra_len as u64;
    while cursor.position() + 4 <= extra_end {
        let id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = cursor.position() + field_size;
        if id == 0x0001 {
            if size == 0xFFFF_FFFF {
                size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFF_FFFF {
                compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if header_offset == 0xFFFF_FFFF {
                header_offset = cursor.read_u64::<LittleEndian>()?;
            }
        }
        cursor.set_position(field_end);
    }
    ensure!(cursor.position() == extra_end, "{name}: malformed extra field");
    cursor.set_position(extra_end + comment_len as u64);
    ensure!(compressed_size == size, "{name}: stored member with differing sizes");

    Ok(Entry {
        name,
        crc32,
        size,
        header_offset,
        flags,
        method,
        mod_time,
        mod_date,
        data: Vec::new(),
    })
}

/// Read the member's local header, payload and data descriptor. Returns the
/// offset just past the descriptor.
fn read_local(bytes: &[u8], entry: &mut Entry, zip64: bool) -> Result<u64> {
    let mut cursor = Cursor::new(bytes);
    cursor.set_position(entry.header_offset);

    if cursor.read_u32::<LittleEndian>()? != LFH_SIGNATURE {
        bail!("{}: Invalid Local File Header", entry.name);
    }
    let _version = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let mod_time = cursor.read_u16::<LittleEndian>()?;
    let mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let _compressed_size = cursor.read_u32::<LittleEndian>()?;
    let _size = cursor.read_u32::<LittleEndian>()?;
    let name_len = cursor.read_u16::<LittleEndian>()? as u64;
    let extra_len = cursor.read_u16::<LittleEndian>()? as u64;

    ensure!(flags == entry.flags, "{}: flags differ", entry.name);
    ensure!(method == entry.method, "{}: method differs", entry.name);
    ensure!(
        (mod_time, mod_date) == (entry.mod_time, entry.mod_date),
        "{}: timestamps differ",
        entry.name
    );
    ensure!(crc32 == 0, "{}: CRC-32 should be deferred", entry.name);

    let data_start = cursor.position() + name_len + extra_len;
    let data_end = data_start + entry.size;
    ensure!(data_end <= bytes.len() as u64, "{}: truncated payload", entry.name);
    entry.data = bytes[data_start as usize..data_end as usize].to_vec();
    ensure!(
        crc32fast::hash(&entry.data) == entry.crc32,
        "{}: CRC-32 mismatch",
        entry.name
    );

    cursor.set_position(data_end);
    let descriptor_crc = cursor.read_u32::<LittleEndian>()?;
    let (compressed, size) = if zip64 {
        (
            cursor.read_u64::<LittleEndian>()?,
            cursor.read_u64::<LittleEndian>()?,
        )
    } else {
        (
            cursor.read_u32::<LittleEndian>()? as u64,
            cursor.read_u32::<LittleEndian>()? as u64,
        )
    };
    ensure!(descriptor_crc == entry.crc32, "{}: descriptor CRC-32 differs", entry.name);
    ensure!(
        compressed == entry.size && size == entry.size,
        "{}: descriptor sizes differ",
        entry.name
    );

    Ok(cursor.position())
}
