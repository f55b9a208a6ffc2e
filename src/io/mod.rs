mod http;
mod local;
mod memory;

pub use http::{DEFAULT_MAX_RETRY, HttpSource};
pub use local::LocalFileSource;
pub use memory::MemorySource;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Payload reader handed out by a [`MemberSource`].
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// Trait for the data behind one archive member
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// Declared payload length, known before anything is read
    fn size(&self) -> u64;

    /// Open the payload for sequential reading
    async fn open(&self) -> Result<SourceReader>;

    /// Human-readable origin, used in logs
    fn describe(&self) -> String;

    /// Bytes received from the network so far
    fn transferred_bytes(&self) -> u64 {
        0
    }
}
