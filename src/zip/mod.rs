//! Streaming ZIP encoding.
//!
//! This module writes ZIP archives strictly front to back, so an archive can
//! be sent over a socket while its members are still being downloaded.
//!
//! ## Architecture
//!
//! - `fields`: declarative little-endian encoder used by every record
//! - `structures`: one struct per ZIP record, with its encoded size
//! - `size`: exact archive size prediction from names and sizes
//! - `writer`: the [`ZipWriter`] state machine and per-member [`FileWriter`]
//! - `output`: the backpressured pipe between writer and consumer
//!
//! ## Archive layout
//!
//! For every member: a local file header with placeholder sizes, the payload
//! stored verbatim, and a data descriptor carrying the CRC-32 and sizes.
//! Then the central directory, the ZIP64 end of central directory record and
//! locator (ZIP64 only), and the end of central directory record.
//!
//! Whether ZIP64 is used is decided once, before the first byte, from the
//! predicted total size: header widths cannot be patched after streaming.
//!
//! ## Limitations
//!
//! - Stored method only, no compression
//! - No encryption
//! - Members are written one at a time, in order

mod checksum;
mod datetime;
pub mod fields;
mod output;
mod size;
mod structures;
mod writer;

pub use checksum::Crc32;
pub use datetime::DosDateTime;
pub use output::{AbortHandle, ArchiveStream, DEFAULT_HIGH_WATER_MARK};
pub use size::{SizeEstimate, calculate_size};
pub use structures::*;
pub use writer::{ArchiveSummary, FileWriter, Lifecycle, MemberSummary, ZipOptions, ZipWriter};
