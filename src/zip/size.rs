//! Exact archive size prediction.
//!
//! The streaming writer cannot revisit a header once it has been emitted, so
//! the archive format (standard or ZIP64) has to be chosen from the manifest
//! alone. The same calculation yields the final byte length, which callers
//! typically announce as `Content-Length` before the first byte is streamed.

use serde::Serialize;

use crate::error::{Result, ZipError};

use super::structures::{
    CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, FormatMode, LocalFileHeader,
    ZIP64_THRESHOLD, Zip64EOCD, Zip64EOCDLocator,
};

/// Predicted archive length and the format needed to produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeEstimate {
    pub total: u64,
    pub zip64: bool,
}

impl SizeEstimate {
    pub fn format_mode(&self) -> FormatMode {
        if self.zip64 {
            FormatMode::Zip64
        } else {
            FormatMode::Standard
        }
    }
}

/// Compute the exact number of bytes the writer will emit for these members.
///
/// `entries` yields `(name, size)` pairs in archive order. ZIP64 is used when
/// the standard-format total reaches `0xFFFFFFFF` or when `force_zip64` is set.
///
/// # Errors
///
/// Returns [`ZipError::SizeOverflow`] if the total does not fit in 64 bits.
pub fn calculate_size<I, N>(entries: I, force_zip64: bool) -> Result<SizeEstimate>
where
    I: IntoIterator<Item = (N, u64)>,
    N: AsRef<str>,
{
    let standard = FormatMode::Standard;
    let zip64 = FormatMode::Zip64;

    let mut total: u64 = 0;
    // Extra bytes every member costs once ZIP64 is in effect.
    let mut zip64_extra: u64 = 0;

    for (name, size) in entries {
        let name_len = name.as_ref().len() as u64;
        let standard_cost = [
            LocalFileHeader::len_for(name_len, standard),
            size,
            DataDescriptor::len_for(standard),
            CentralDirectoryHeader::len_for(name_len, standard),
        ];
        total = checked_sum(total, &standard_cost)?;

        let widened = [
            LocalFileHeader::len_for(name_len, zip64) - LocalFileHeader::len_for(name_len, standard),
            DataDescriptor::len_for(zip64) - DataDescriptor::len_for(standard),
            CentralDirectoryHeader::len_for(name_len, zip64)
                - CentralDirectoryHeader::len_for(name_len, standard),
        ];
        zip64_extra = checked_sum(zip64_extra, &widened)?;
    }
    total = checked_sum(total, &[EndOfCentralDirectory::SIZE])?;

    if total >= ZIP64_THRESHOLD || force_zip64 {
        total = checked_sum(
            total,
            &[zip64_extra, Zip64EOCD::SIZE, Zip64EOCDLocator::SIZE],
        )?;
        return Ok(SizeEstimate { total, zip64: true });
    }

    Ok(SizeEstimate {
        total,
        zip64: false,
    })
}

fn checked_sum(start: u64, values: &[u64]) -> Result<u64> {
    values
        .iter()
        .try_fold(start, |acc, v| acc.checked_add(*v))
        .ok_or(ZipError::SizeOverflow)
}
