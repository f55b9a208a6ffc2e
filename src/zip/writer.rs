//! Streaming archive writer.
//!
//! [`ZipWriter`] emits a ZIP archive front to back without ever seeking:
//!
//! 1. [`ZipWriter::start_file`] writes a local file header with the deferred
//!    descriptor flag set and placeholder sizes.
//! 2. [`FileWriter::write`] streams the payload, hashing it on the way.
//! 3. [`FileWriter::finish`] writes the data descriptor with the final CRC-32
//!    and size.
//! 4. [`ZipWriter::finish`] writes the central directory, the ZIP64 records
//!    when needed, and the end of central directory record.
//!
//! The format mode is fixed at construction. In standard mode every size and
//! offset must fit its 32-bit field; a value that does not destroys the archive
//! rather than producing a corrupt one.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::error::{Result, ZipError};

use super::checksum::Crc32;
use super::datetime::DosDateTime;
use super::output::{AbortHandle, ArchiveStream, DEFAULT_HIGH_WATER_MARK, Pipe};
use super::size::SizeEstimate;
use super::structures::{
    CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, FormatMode, LocalFileHeader,
    Zip64EOCD, Zip64EOCDLocator,
};

/// Options for [`ZipWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipOptions {
    /// Force the format. `None` derives it from the declared total.
    pub zip64: Option<bool>,
    /// Buffered output bytes above which payload writes suspend.
    pub high_water_mark: usize,
    /// Refuse to emit a trailer whose final length differs from the declared total.
    pub verify_total: bool,
}

impl Default for ZipOptions {
    fn default() -> Self {
        Self {
            zip64: None,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            verify_total: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Finished,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberState {
    Started,
    Ended,
}

#[derive(Debug)]
struct MemberRecord {
    name: String,
    header_offset: u64,
    size: u64,
    crc: Crc32,
    modified: DosDateTime,
    state: MemberState,
}

/// Final values of a member, known once its data descriptor is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSummary {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub crc32: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: u64,
    pub total_bytes: u64,
    pub zip64: bool,
}

/// Producer side of a streaming archive.
#[derive(Debug)]
pub struct ZipWriter {
    pipe: Arc<Pipe>,
    mode: FormatMode,
    declared_total: u64,
    verify_total: bool,
    cursor: u64,
    members: Vec<MemberRecord>,
    finished: bool,
}

impl ZipWriter {
    /// Create a writer for an archive expected to be `declared_total` bytes
    /// long, together with the stream its bytes are delivered on.
    pub fn new(declared_total: u64, options: ZipOptions) -> (Self, ArchiveStream) {
        let mode = match options.zip64 {
            Some(true) => FormatMode::Zip64,
            Some(false) => FormatMode::Standard,
            None => FormatMode::for_total(declared_total),
        };
        info!(zip64 = mode.is_zip64(), size = declared_total, "started zip");

        let pipe = Pipe::new(options.high_water_mark);
        let writer = Self {
            pipe: pipe.clone(),
            mode,
            declared_total,
            verify_total: options.verify_total,
            cursor: 0,
            members: Vec::new(),
            finished: false,
        };
        (writer, ArchiveStream::new(pipe))
    }

    /// Create a writer matching a [`SizeEstimate`].
    pub fn from_estimate(estimate: SizeEstimate, options: ZipOptions) -> (Self, ArchiveStream) {
        Self::new(
            estimate.total,
            ZipOptions {
                zip64: Some(estimate.zip64),
                ..options
            },
        )
    }

    pub fn mode(&self) -> FormatMode {
        self.mode
    }

    pub fn declared_total(&self) -> u64 {
        self.declared_total
    }

    /// Bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.cursor
    }

    /// Number of members started so far.
    pub fn entries(&self) -> usize {
        self.members.len()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.finished {
            Lifecycle::Finished
        } else if self.pipe.is_destroyed() {
            Lifecycle::Destroyed
        } else {
            Lifecycle::Open
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_destroyed(&self) -> bool {
        self.pipe.is_destroyed()
    }

    /// The error the archive was destroyed with, if any.
    pub fn error(&self) -> Option<ZipError> {
        self.pipe.error()
    }

    /// Handle that can destroy this archive from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.pipe.clone())
    }

    /// Destroy the archive. Any suspended payload write fails with `err`.
    pub fn abort(&self, err: ZipError) -> bool {
        self.pipe.destroy(err)
    }

    /// Start a new member stamped with the current time.
    pub fn start_file(&mut self, name: impl Into<String>) -> Result<FileWriter<'_>> {
        self.start_file_at(name, DosDateTime::now())
    }

    /// Start a new member with an explicit modification time.
    ///
    /// # Errors
    ///
    /// * [`ZipError::AlreadyFinished`] / [`ZipError::AlreadyDestroyed`] on a
    ///   terminal archive
    /// * [`ZipError::Sequence`] if the previous member was not finished; the
    ///   archive is destroyed
    pub fn start_file_at(
        &mut self,
        name: impl Into<String>,
        modified: DosDateTime,
    ) -> Result<FileWriter<'_>> {
        self.check_open()?;
        self.check_not_writing_file()?;

        let name = name.into();
        debug!(name = %name, offset = self.cursor, "start file");

        let header_offset = self.cursor;
        let header = LocalFileHeader {
            name: name.as_bytes(),
            modified,
            header_offset,
            mode: self.mode,
        }
        .to_bytes()
        .map_err(|e| self.fail(e))?;

        self.members.push(MemberRecord {
            name,
            header_offset,
            size: 0,
            crc: Crc32::new(),
            modified,
            state: MemberState::Started,
        });
        self.emit(header)?;

        let index = self.members.len() - 1;
        Ok(FileWriter { zip: self, index })
    }

    /// Write the central directory and end records and close the output.
    ///
    /// # Errors
    ///
    /// * [`ZipError::AlreadyFinished`] on a second call
    /// * [`ZipError::AlreadyDestroyed`] on a destroyed archive
    /// * [`ZipError::Sequence`] if the last member was not finished
    /// * [`ZipError::SizeMismatch`] if the archive would not match the
    ///   declared total and `verify_total` is set
    pub fn finish(&mut self) -> Result<ArchiveSummary> {
        self.check_open()?;
        self.check_not_writing_file()?;

        info!("finishing zip");
        let records = self.encode_trailer().map_err(|e| self.fail(e))?;

        let trailer_len: u64 = records.iter().map(|r| r.len() as u64).sum();
        let total = self.cursor + trailer_len;
        if self.verify_total && total != self.declared_total {
            return Err(self.fail(ZipError::SizeMismatch {
                expected: self.declared_total,
                actual: total,
            }));
        }

        for record in records {
            self.emit(record)?;
        }
        self.pipe.end();
        self.finished = true;

        let summary = ArchiveSummary {
            entries: self.members.len() as u64,
            total_bytes: self.cursor,
            zip64: self.mode.is_zip64(),
        };
        info!(
            files = summary.entries,
            bytes = summary.total_bytes,
            "done writing zip file"
        );
        Ok(summary)
    }

    /// Central directory headers, ZIP64 records and EOCD, in output order.
    fn encode_trailer(&self) -> Result<Vec<Vec<u8>>> {
        let cd_offset = self.cursor;
        let mut records = Vec::with_capacity(self.members.len() + 3);

        let mut cd_size = 0u64;
        for member in &self.members {
            let header = CentralDirectoryHeader {
                name: member.name.as_bytes(),
                modified: member.modified,
                crc32: member.crc.get(),
                size: member.size,
                header_offset: member.header_offset,
                mode: self.mode,
            }
            .to_bytes()?;
            cd_size += header.len() as u64;
            records.push(header);
        }

        let entries = self.members.len() as u64;
        if self.mode.is_zip64() {
            let eocd64_offset = cd_offset + cd_size;
            records.push(
                Zip64EOCD {
                    entries,
                    cd_size,
                    cd_offset,
                }
                .to_bytes()?,
            );
            records.push(Zip64EOCDLocator { eocd64_offset }.to_bytes()?);
        }

        records.push(
            EndOfCentralDirectory {
                entries,
                cd_size,
                cd_offset,
                mode: self.mode,
            }
            .to_bytes()?,
        );
        Ok(records)
    }

    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(ZipError::AlreadyFinished);
        }
        if self.pipe.is_destroyed() {
            return Err(ZipError::AlreadyDestroyed);
        }
        Ok(())
    }

    fn check_not_writing_file(&self) -> Result<()> {
        match self.members.last() {
            Some(last) if last.state == MemberState::Started => Err(self.fail(ZipError::Sequence(
                format!("The file {} was not finished.", last.name),
            ))),
            _ => Ok(()),
        }
    }

    /// Destroy the archive with `err` and hand it back for propagation.
    fn fail(&self, err: ZipError) -> ZipError {
        self.pipe.destroy(err.clone());
        err
    }

    fn emit(&mut self, bytes: impl Into<Bytes>) -> Result<bool> {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        let below = self.pipe.push(bytes)?;
        self.cursor += len;
        Ok(below)
    }
}

impl Drop for ZipWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.pipe.destroy(ZipError::Aborted(
                "The archive writer was dropped before finishing.".into(),
            ));
        }
    }
}

/// Payload sink for the member most recently started.
///
/// Mutably borrows its [`ZipWriter`], so no other member can be started while
/// it is alive. Dropping it without calling [`FileWriter::finish`] leaves the
/// member open, and the next structural operation on the writer fails with
/// [`ZipError::Sequence`].
#[derive(Debug)]
pub struct FileWriter<'a> {
    zip: &'a mut ZipWriter,
    index: usize,
}

impl FileWriter<'_> {
    pub fn name(&self) -> &str {
        &self.zip.members[self.index].name
    }

    /// Payload bytes written so far.
    pub fn size(&self) -> u64 {
        self.zip.members[self.index].size
    }

    /// Append a payload chunk, suspending while the consumer is saturated.
    ///
    /// # Errors
    ///
    /// [`ZipError::AlreadyDestroyed`] if the archive was destroyed before the
    /// call, or the destruction error if it is destroyed while this write is
    /// suspended.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<()> {
        if !self.accept(chunk.into())? {
            self.zip.pipe.ready().await?;
        }
        Ok(())
    }

    fn accept(&mut self, chunk: Bytes) -> Result<bool> {
        if self.zip.pipe.is_destroyed() {
            return Err(ZipError::AlreadyDestroyed);
        }

        let len = chunk.len() as u64;
        let record = &mut self.zip.members[self.index];
        let Some(size) = record.size.checked_add(len) else {
            return Err(self.zip.fail(ZipError::SizeOverflow));
        };
        record.size = size;
        record.crc.append(&chunk);
        self.zip.emit(chunk)
    }

    /// Write the data descriptor and close the member.
    pub fn finish(self) -> Result<MemberSummary> {
        let zip = self.zip;
        if zip.pipe.is_destroyed() {
            return Err(ZipError::AlreadyDestroyed);
        }

        let record = &zip.members[self.index];
        let summary = MemberSummary {
            name: record.name.clone(),
            offset: record.header_offset,
            size: record.size,
            crc32: record.crc.get(),
        };
        let descriptor = DataDescriptor {
            crc32: summary.crc32,
            size: summary.size,
            mode: zip.mode,
        }
        .to_bytes()
        .map_err(|e| zip.fail(e))?;

        zip.emit(descriptor)?;
        zip.members[self.index].state = MemberState::Ended;
        debug!(name = %summary.name, size = summary.size, "end file");
        Ok(summary)
    }
}

impl AsyncWrite for FileWriter<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.zip.pipe.poll_ready(cx))?;
        this.accept(Bytes::copy_from_slice(buf))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.zip.pipe.poll_ready(cx).map_err(io::Error::from)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn stamp() -> DosDateTime {
        DosDateTime::new(2020, 5, 17, 10, 30, 0).unwrap()
    }

    async fn collect(mut stream: ArchiveStream) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn writes_single_member() {
        let (mut zip, stream) = ZipWriter::new(1350, ZipOptions::default());
        assert_eq!(zip.mode(), FormatMode::Standard);

        let mut file = zip.start_file_at("foo", stamp()).unwrap();
        file.write(vec![7u8; 1234]).await.unwrap();
        let member = file.finish().unwrap();
        assert_eq!(member.offset, 0);
        assert_eq!(member.size, 1234);
        assert_eq!(member.crc32, crc32fast::hash(&[7u8; 1234]));

        let summary = zip.finish().unwrap();
        assert_eq!(summary.total_bytes, 1350);
        assert_eq!(zip.lifecycle(), Lifecycle::Finished);

        let bytes = collect(stream).await.unwrap();
        assert_eq!(bytes.len(), 1350);
        assert_eq!(&bytes[0..4], b"PK\x03\x04");
        assert_eq!(&bytes[bytes.len() - 22..bytes.len() - 18], b"PK\x05\x06");
    }

    #[tokio::test]
    async fn mode_follows_declared_total_unless_forced() {
        let (zip, _stream) = ZipWriter::new(0xFFFF_FFFF, ZipOptions::default());
        assert_eq!(zip.mode(), FormatMode::Zip64);

        let options = ZipOptions {
            zip64: Some(true),
            ..ZipOptions::default()
        };
        let (zip, _stream) = ZipWriter::new(100, options);
        assert_eq!(zip.mode(), FormatMode::Zip64);
    }

    #[tokio::test]
    async fn starting_second_file_before_finishing_first_destroys() {
        let (mut zip, stream) = ZipWriter::new(0, ZipOptions::default());
        let file = zip.start_file_at("a.txt", stamp()).unwrap();
        drop(file);

        let err = zip.start_file_at("b.txt", stamp()).unwrap_err();
        assert!(matches!(&err, ZipError::Sequence(msg) if msg.contains("a.txt")));
        assert_eq!(zip.lifecycle(), Lifecycle::Destroyed);

        assert!(matches!(
            zip.start_file_at("c.txt", stamp()),
            Err(ZipError::AlreadyDestroyed)
        ));
        assert!(matches!(collect(stream).await, Err(ZipError::Sequence(_))));
    }

    #[tokio::test]
    async fn finishing_with_open_member_destroys() {
        let (mut zip, _stream) = ZipWriter::new(0, ZipOptions::default());
        drop(zip.start_file_at("a.txt", stamp()).unwrap());
        assert!(matches!(zip.finish(), Err(ZipError::Sequence(_))));
        assert!(zip.is_destroyed());
    }

    #[tokio::test]
    async fn finish_twice_fails() {
        let (mut zip, _stream) = ZipWriter::new(22, ZipOptions::default());
        zip.finish().unwrap();
        assert!(matches!(zip.finish(), Err(ZipError::AlreadyFinished)));
        assert!(matches!(
            zip.start_file_at("late.txt", stamp()),
            Err(ZipError::AlreadyFinished)
        ));
        assert_eq!(zip.lifecycle(), Lifecycle::Finished);
    }

    #[tokio::test]
    async fn declared_total_is_verified() {
        let (mut zip, stream) = ZipWriter::new(100, ZipOptions::default());
        let err = zip.finish().unwrap_err();
        assert!(matches!(
            err,
            ZipError::SizeMismatch {
                expected: 100,
                actual: 22
            }
        ));
        assert!(matches!(collect(stream).await, Err(ZipError::SizeMismatch { .. })));

        let options = ZipOptions {
            verify_total: false,
            ..ZipOptions::default()
        };
        let (mut zip, _stream) = ZipWriter::new(100, options);
        assert_eq!(zip.finish().unwrap().total_bytes, 22);
    }

    #[tokio::test]
    async fn write_after_abort_fails() {
        let (mut zip, _stream) = ZipWriter::new(0, ZipOptions::default());
        let abort = zip.abort_handle();
        let mut file = zip.start_file_at("a.txt", stamp()).unwrap();
        file.write(&b"part"[..]).await.unwrap();

        assert!(abort.abort(ZipError::Aborted("Aborted".into())));
        assert!(matches!(
            file.write(&b"more"[..]).await,
            Err(ZipError::AlreadyDestroyed)
        ));
        assert!(matches!(file.finish(), Err(ZipError::AlreadyDestroyed)));
        assert!(matches!(zip.finish(), Err(ZipError::AlreadyDestroyed)));
    }

    #[tokio::test]
    async fn overlong_name_destroys() {
        let (mut zip, _stream) = ZipWriter::new(0, ZipOptions::default());
        let name = "n".repeat(u16::MAX as usize + 1);
        let err = zip.start_file_at(name, stamp()).unwrap_err();
        assert!(matches!(err, ZipError::FieldOverflow { width: 2, .. }));
        assert!(zip.is_destroyed());
        assert_eq!(zip.entries(), 0);
    }

    #[tokio::test]
    async fn dropping_unfinished_writer_ends_consumer_with_error() {
        let (mut zip, stream) = ZipWriter::new(0, ZipOptions::default());
        let mut file = zip.start_file_at("a.txt", stamp()).unwrap();
        file.write(&b"partial"[..]).await.unwrap();
        drop(zip);
        assert!(matches!(collect(stream).await, Err(ZipError::Aborted(_))));
    }

    #[tokio::test]
    async fn async_write_impl_streams_payload() {
        use tokio::io::AsyncWriteExt;

        let (mut zip, stream) = ZipWriter::new(0, ZipOptions {
            verify_total: false,
            ..ZipOptions::default()
        });
        let mut file = zip.start_file_at("hello.txt", stamp()).unwrap();
        file.write_all(b"hello ").await.unwrap();
        file.write_all(b"world").await.unwrap();
        file.flush().await.unwrap();
        assert_eq!(file.size(), 11);
        let member = file.finish().unwrap();
        assert_eq!(member.crc32, crc32fast::hash(b"hello world"));
        zip.finish().unwrap();

        let bytes = collect(stream).await.unwrap();
        assert_eq!(bytes.len() as u64, zip.bytes_written());
    }
}
