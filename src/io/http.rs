use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::warn;

use super::{MemberSource, SourceReader};
use anyhow::{Result, anyhow, bail};

/// Default number of GET attempts before giving up on a source
pub const DEFAULT_MAX_RETRY: u32 = 10;

/// HTTP member source streamed with a single GET
pub struct HttpSource {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: Arc<AtomicU64>,
    max_retry: u32,
}

impl HttpSource {
    /// Create a new HTTP source
    ///
    /// This will send a HEAD request to learn the payload size
    pub async fn new(url: String) -> Result<Self> {
        let client = build_client()?;

        let resp = client
            .head(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        // Get file size from Content-Length
        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length for {}", url))?;

        Ok(Self::with_client(client, url, size))
    }

    /// Create a source whose size is already known, skipping the HEAD request
    pub fn with_size(url: String, size: u64) -> Result<Self> {
        Ok(Self::with_client(build_client()?, url, size))
    }

    fn with_client(client: Client, url: String, size: u64) -> Self {
        Self {
            client,
            url,
            size,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    /// Number of GET attempts on connect or timeout errors (at least one)
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }
}

/// Bodies may take arbitrarily long overall, so only connection setup and
/// individual reads are bounded.
fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .read_timeout(Duration::from_secs(30))
        .build()?)
}

#[async_trait]
impl MemberSource for HttpSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn open(&self) -> Result<SourceReader> {
        let mut retry_count = 0;

        // Retrying is only safe until the first payload byte has been handed out
        let resp = loop {
            match self.client.get(&self.url).send().await {
                Ok(resp) => break resp,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded for {}: {}", self.url, e);
                    }
                    warn!(
                        url = %self.url,
                        "Connection error, retry {}/{}: {}",
                        retry_count, self.max_retry, e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        let counter = self.transferred_bytes.clone();
        let body = resp
            .bytes_stream()
            .inspect_ok(move |chunk| {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            })
            .map_err(std::io::Error::other);

        Ok(Box::new(StreamReader::new(Box::pin(body))))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }

    fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}
