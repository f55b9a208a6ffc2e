use super::{MemberSource, SourceReader};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;

/// In-memory member source
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl MemberSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open(&self) -> Result<SourceReader> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }

    fn describe(&self) -> String {
        format!("<{} bytes in memory>", self.data.len())
    }
}
