//! # streamzip
//!
//! Stream a ZIP archive while its members are still being downloaded.
//!
//! The archive is written strictly front to back: local headers with deferred
//! sizes, the payload stored verbatim, data descriptors, then the central
//! directory. Nothing is buffered beyond the consumer's read-ahead, and the
//! exact archive length is known before the first byte is sent.
//!
//! ## Features
//!
//! - Exact size prediction from member names and sizes ([`calculate_size`])
//! - Automatic ZIP64 when the archive reaches 4 GiB, or on request
//! - Backpressure: payload writes pause while the consumer is behind
//! - Cancellation from anywhere through an [`AbortHandle`]
//! - Member sources for HTTP URLs and local files
//!
//! ## Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use streamzip::{ZipOptions, ZipWriter, calculate_size};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let estimate = calculate_size([("hello.txt", 6)], false)?;
//!     let (mut zip, mut stream) = ZipWriter::from_estimate(estimate, ZipOptions::default());
//!
//!     let consumer = tokio::spawn(async move {
//!         let mut archive = Vec::new();
//!         while let Some(chunk) = stream.next().await {
//!             archive.extend_from_slice(&chunk?);
//!         }
//!         Ok::<_, streamzip::ZipError>(archive)
//!     });
//!
//!     let mut file = zip.start_file("hello.txt")?;
//!     file.write(&b"hello\n"[..]).await?;
//!     file.finish()?;
//!     zip.finish()?;
//!
//!     let archive = consumer.await??;
//!     assert_eq!(archive.len() as u64, estimate.total);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod manifest;
pub mod pipeline;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipError};
pub use io::{HttpSource, LocalFileSource, MemberSource, MemorySource};
pub use manifest::Manifest;
pub use pipeline::{ArchiveMember, ZipJob, save_to_file, stream_to, zip_files};
pub use zip::{
    AbortHandle, ArchiveStream, DosDateTime, FileWriter, FormatMode, SizeEstimate, ZipOptions,
    ZipWriter, calculate_size,
};
