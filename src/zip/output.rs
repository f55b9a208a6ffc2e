//! Archive output pipe.
//!
//! The writer pushes encoded bytes into a shared queue and the consumer drains
//! it through [`ArchiveStream`]. Headers and trailers are always accepted;
//! payload writes suspend while the queue holds more than the high-water mark,
//! which bounds memory to the consumer's buffer depth instead of the archive
//! size.
//!
//! Destroying the pipe is terminal. The destruction error is handed to the
//! suspended writer (if any), to the consumer, and to every later operation.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures_core::Stream;
use parking_lot::Mutex;
use tokio_util::io::StreamReader;
use tracing::warn;

use crate::error::{Result, ZipError};

/// Default number of buffered bytes above which payload writes suspend.
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

#[derive(Debug)]
struct PipeState {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    high_water_mark: usize,
    ended: bool,
    error: Option<ZipError>,
    error_delivered: bool,
    reader: Option<Waker>,
    /// Only one member streams at a time, so at most one write is pending.
    pending_write: Option<Waker>,
}

impl PipeState {
    fn below_high_water_mark(&self) -> bool {
        self.buffered < self.high_water_mark
    }

    fn wake_reader(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.pending_write.take() {
            waker.wake();
        }
    }
}

#[derive(Debug)]
pub(crate) struct Pipe {
    state: Mutex<PipeState>,
}

impl Pipe {
    pub(crate) fn new(high_water_mark: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState {
                chunks: VecDeque::new(),
                buffered: 0,
                high_water_mark: high_water_mark.max(1),
                ended: false,
                error: None,
                error_delivered: false,
                reader: None,
                pending_write: None,
            }),
        })
    }

    /// Queue a chunk for the consumer.
    ///
    /// Returns `Ok(true)` while the queue is below the high-water mark; on
    /// `Ok(false)` the caller should wait for [`Pipe::ready`] before pushing
    /// more payload.
    pub(crate) fn push(&self, chunk: Bytes) -> Result<bool> {
        let mut state = self.state.lock();
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        if state.ended {
            return Err(ZipError::AlreadyFinished);
        }
        if !chunk.is_empty() {
            state.buffered += chunk.len();
            state.chunks.push_back(chunk);
            state.wake_reader();
        }
        Ok(state.below_high_water_mark())
    }

    /// Signal end of output.
    pub(crate) fn end(&self) {
        let mut state = self.state.lock();
        if state.error.is_none() {
            state.ended = true;
            state.wake_reader();
        }
    }

    /// Destroy the pipe with `err`.
    ///
    /// Returns `false` if it was already destroyed or its output had already
    /// ended; the first error wins.
    pub(crate) fn destroy(&self, err: ZipError) -> bool {
        let mut state = self.state.lock();
        if state.error.is_some() || state.ended {
            return false;
        }
        warn!(error = %err, "archive destroyed");
        state.error = Some(err);
        state.chunks.clear();
        state.buffered = 0;
        state.wake_writer();
        state.wake_reader();
        true
    }

    pub(crate) fn error(&self) -> Option<ZipError> {
        self.state.lock().error.clone()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.state.lock().error.is_some()
    }

    pub(crate) fn buffered(&self) -> usize {
        self.state.lock().buffered
    }

    /// Resolves once the consumer has drained the queue below the high-water
    /// mark, or with the destruction error.
    pub(crate) fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let mut state = self.state.lock();
        if let Some(err) = &state.error {
            return Poll::Ready(Err(err.clone()));
        }
        if state.ended || state.below_high_water_mark() {
            return Poll::Ready(Ok(()));
        }
        state.pending_write = Some(cx.waker().clone());
        Poll::Pending
    }

    pub(crate) fn ready(self: &Arc<Self>) -> Ready {
        Ready { pipe: self.clone() }
    }

    fn poll_next_chunk(&self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes>>> {
        let mut state = self.state.lock();
        if let Some(chunk) = state.chunks.pop_front() {
            state.buffered -= chunk.len();
            if state.below_high_water_mark() {
                state.wake_writer();
            }
            return Poll::Ready(Some(Ok(chunk)));
        }
        if let Some(err) = &state.error {
            if state.error_delivered {
                return Poll::Ready(None);
            }
            let err = err.clone();
            state.error_delivered = true;
            return Poll::Ready(Some(Err(err)));
        }
        if state.ended {
            return Poll::Ready(None);
        }
        state.reader = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by [`Pipe::ready`].
#[derive(Debug)]
pub(crate) struct Ready {
    pipe: Arc<Pipe>,
}

impl Future for Ready {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.pipe.poll_ready(cx)
    }
}

/// Consumer side of an archive: a stream of encoded chunks.
///
/// Yields `Err` once if the archive is destroyed, then ends. Dropping the
/// stream before the archive is finished destroys it with
/// [`ZipError::ConsumerClosed`].
#[derive(Debug)]
pub struct ArchiveStream {
    pipe: Arc<Pipe>,
}

impl ArchiveStream {
    pub(crate) fn new(pipe: Arc<Pipe>) -> Self {
        Self { pipe }
    }

    /// Adapt the stream into a tokio [`AsyncRead`](tokio::io::AsyncRead).
    pub fn into_async_read(self) -> StreamReader<ArchiveStream, Bytes> {
        StreamReader::new(self)
    }

    /// Bytes queued but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.pipe.buffered()
    }
}

impl Stream for ArchiveStream {
    type Item = Result<Bytes, ZipError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.pipe.poll_next_chunk(cx)
    }
}

impl Drop for ArchiveStream {
    fn drop(&mut self) {
        self.pipe.destroy(ZipError::ConsumerClosed);
    }
}

/// Cancels an archive from outside the writer, e.g. from a data source's
/// timeout handler.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    pipe: Arc<Pipe>,
}

impl AbortHandle {
    pub(crate) fn new(pipe: Arc<Pipe>) -> Self {
        Self { pipe }
    }

    /// Destroy the archive. Returns `false` if it was already destroyed or
    /// finished.
    pub fn abort(&self, err: ZipError) -> bool {
        self.pipe.destroy(err)
    }

    pub fn is_aborted(&self) -> bool {
        self.pipe.is_destroyed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn push_reports_high_water_mark() {
        let pipe = Pipe::new(8);
        assert!(pipe.push(Bytes::from_static(b"1234")).unwrap());
        assert!(!pipe.push(Bytes::from_static(b"5678")).unwrap());
        assert_eq!(pipe.buffered(), 8);

        let mut stream = ArchiveStream::new(pipe.clone());
        assert_eq!(stream.next().await.unwrap().unwrap(), "1234");
        assert_eq!(stream.buffered_len(), 4);
        pipe.ready().await.unwrap();
        pipe.end();
        assert_eq!(stream.next().await.unwrap().unwrap(), "5678");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn ready_waits_for_consumer() {
        let pipe = Pipe::new(4);
        pipe.push(Bytes::from_static(b"abcdef")).unwrap();
        let mut stream = ArchiveStream::new(pipe.clone());

        let waiter = tokio::spawn({
            let pipe = pipe.clone();
            async move { pipe.ready().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        stream.next().await.unwrap().unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn destroy_fails_pending_ready_and_consumer() {
        let pipe = Pipe::new(1);
        pipe.push(Bytes::from_static(b"xx")).unwrap();
        let mut stream = ArchiveStream::new(pipe.clone());

        let waiter = tokio::spawn({
            let pipe = pipe.clone();
            async move { pipe.ready().await }
        });
        tokio::task::yield_now().await;

        assert!(AbortHandle::new(pipe.clone()).abort(ZipError::Aborted("Aborted".into())));
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ZipError::Aborted(_)));

        assert!(matches!(stream.next().await, Some(Err(ZipError::Aborted(_)))));
        assert!(stream.next().await.is_none());
        assert!(matches!(pipe.push(Bytes::from_static(b"y")), Err(ZipError::Aborted(_))));
    }

    #[tokio::test]
    async fn first_destruction_wins() {
        let pipe = Pipe::new(16);
        assert!(pipe.destroy(ZipError::ConsumerClosed));
        assert!(!pipe.destroy(ZipError::Aborted("late".into())));
        assert!(matches!(pipe.error(), Some(ZipError::ConsumerClosed)));
    }

    #[tokio::test]
    async fn dropping_stream_destroys_unfinished_archive() {
        let pipe = Pipe::new(16);
        drop(ArchiveStream::new(pipe.clone()));
        assert!(matches!(pipe.error(), Some(ZipError::ConsumerClosed)));
    }

    #[tokio::test]
    async fn dropping_stream_after_end_is_harmless() {
        let pipe = Pipe::new(16);
        pipe.push(Bytes::from_static(b"done")).unwrap();
        pipe.end();
        drop(ArchiveStream::new(pipe.clone()));
        assert!(!pipe.is_destroyed());
    }

    #[tokio::test]
    async fn async_read_adapter() {
        let pipe = Pipe::new(16);
        pipe.push(Bytes::from_static(b"hello ")).unwrap();
        pipe.push(Bytes::from_static(b"world")).unwrap();
        pipe.end();

        let mut reader = ArchiveStream::new(pipe).into_async_read();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello world");
    }
}
