//! Error taxonomy for archive encoding.
//!
//! Every error is fail-fast: once a header has been emitted with provisional
//! values it cannot be taken back from the stream, so the archive is destroyed
//! and the caller is expected to discard whatever output it already received.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the size predictor, the field encoder and the streaming
/// archive writer.
///
/// The type is `Clone` because a single destruction error is delivered to
/// several parties: the suspended payload write, the output consumer and any
/// later operation on the writer.
#[derive(Debug, Clone, Error)]
pub enum ZipError {
    /// An operation was invoked out of the required order.
    #[error("{0}")]
    Sequence(String),

    #[error("Already finished")]
    AlreadyFinished,

    #[error("Already destroyed")]
    AlreadyDestroyed,

    /// Integer header fields are 1, 2, 4 or 8 bytes wide.
    #[error("No handler defined for field width {0}")]
    UnsupportedWidth(usize),

    #[error("Value {value} does not fit in a {width}-byte field")]
    FieldOverflow { value: u64, width: usize },

    #[error("Archive size exceeds 64 bits")]
    SizeOverflow,

    #[error("Archive size mismatch: declared {expected} bytes, produced {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("File {name} declared {declared} bytes but delivered {actual} bytes")]
    MemberSizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    /// A payload source failed or was aborted.
    #[error("Upstream source failed: {0}")]
    Upstream(#[source] Arc<dyn StdError + Send + Sync + 'static>),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Output consumer closed before the archive was finished")]
    ConsumerClosed,
}

impl ZipError {
    /// Wrap any source failure as an [`ZipError::Upstream`] error.
    pub fn upstream<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ZipError::Upstream(Arc::new(err))
    }

    /// Wrap an `anyhow` error coming from a member source.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
        ZipError::Upstream(Arc::from(boxed))
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        let kind = match err {
            ZipError::Upstream(_) | ZipError::Aborted(_) => io::ErrorKind::Interrupted,
            ZipError::ConsumerClosed => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Result alias used throughout the encoder.
pub type Result<T, E = ZipError> = std::result::Result<T, E>;
