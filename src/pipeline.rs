//! Sequential multi-member orchestration.
//!
//! [`zip_files`] predicts the archive size from the declared member sizes,
//! then streams every member, strictly one after another, from its source into
//! a [`ZipWriter`] running on a background task. The caller gets the consumer
//! stream immediately and can announce the predicted length before the first
//! byte arrives.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Result, ZipError};
use crate::io::MemberSource;
use crate::zip::{
    AbortHandle, ArchiveStream, ArchiveSummary, SizeEstimate, ZipOptions, ZipWriter,
    calculate_size,
};

/// A named member and the source its payload comes from.
#[derive(Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub source: Arc<dyn MemberSource>,
}

impl ArchiveMember {
    pub fn new(name: impl Into<String>, source: impl MemberSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source),
        }
    }
}

/// A running archive job.
pub struct ZipJob {
    pub estimate: SizeEstimate,
    pub stream: ArchiveStream,
    pub abort: AbortHandle,
    pub task: JoinHandle<Result<ArchiveSummary>>,
}

/// Start streaming `members` into a new archive.
///
/// Must be called from within a tokio runtime. A failing source destroys the
/// archive with [`ZipError::Upstream`]; a source that delivers a different
/// number of bytes than it declared destroys it with
/// [`ZipError::MemberSizeMismatch`].
pub fn zip_files(
    members: Vec<ArchiveMember>,
    options: ZipOptions,
    force_zip64: bool,
) -> Result<ZipJob> {
    let estimate = calculate_size(
        members.iter().map(|m| (m.name.as_str(), m.source.size())),
        force_zip64,
    )?;
    let (zip, stream) = ZipWriter::from_estimate(estimate, options);
    let abort = zip.abort_handle();
    let task = tokio::spawn(write_members(zip, members));

    Ok(ZipJob {
        estimate,
        stream,
        abort,
        task,
    })
}

async fn write_members(mut zip: ZipWriter, members: Vec<ArchiveMember>) -> Result<ArchiveSummary> {
    for member in members {
        if let Some(err) = zip.error() {
            return Err(err);
        }

        info!("Streaming {} => {}", member.source.describe(), member.name);
        let declared = member.source.size();
        // One byte past the declared size is enough to detect an overlong source
        let mut reader = match member.source.open().await {
            Ok(reader) => reader.take(declared.saturating_add(1)),
            Err(e) => return Err(destroy(&zip, ZipError::from_anyhow(e))),
        };

        let mut file = match zip.start_file(member.name.as_str()) {
            Ok(file) => file,
            Err(e) => return Err(destroy(&zip, e)),
        };
        let copied = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            // The writer's own failures already destroyed the archive.
            Err(e) => return Err(destroy(&zip, ZipError::upstream(e))),
        };

        if copied != declared {
            return Err(destroy(
                &zip,
                ZipError::MemberSizeMismatch {
                    name: member.name,
                    declared,
                    actual: copied,
                },
            ));
        }
        if let Err(e) = file.finish() {
            return Err(destroy(&zip, e));
        }
    }

    zip.finish().map_err(|e| destroy(&zip, e))
}

/// Copy the archive stream into `out` and wait for the writer task.
///
/// When both sides fail, the writer's error is the root cause unless the
/// writer only noticed that the output went away.
pub async fn stream_to<W>(job: ZipJob, mut out: W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let ZipJob { stream, task, .. } = job;

    let mut reader = stream.into_async_read();
    let copied = tokio::io::copy(&mut reader, &mut out).await;
    drop(reader);

    match (copied, task.await?) {
        (Ok(written), Ok(_)) => {
            out.flush().await?;
            Ok(written)
        }
        (Err(e), Ok(_)) | (Err(e), Err(ZipError::ConsumerClosed)) => {
            Err(e).context("Failed to write archive")
        }
        (_, Err(e)) => Err(e).context("Archive aborted"),
    }
}

/// Stream the archive into a new file at `path`.
///
/// A failed archive is unusable, so the partial file is removed.
pub async fn save_to_file(job: ZipJob, path: &Path) -> anyhow::Result<u64> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Cannot create {}", path.display()))?;

    match stream_to(job, file).await {
        Ok(written) => Ok(written),
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(path).await {
                warn!("Cannot remove partial archive {}: {}", path.display(), rm);
            }
            Err(e)
        }
    }
}

/// Destroy the archive with `err` unless it is already destroyed, and return
/// the error that actually destroyed it. A late [`ZipError::AlreadyDestroyed`]
/// thus resolves to the root cause.
fn destroy(zip: &ZipWriter, err: ZipError) -> ZipError {
    zip.abort(err.clone());
    zip.error().unwrap_or(err)
}
