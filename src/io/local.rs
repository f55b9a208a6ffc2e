use super::{MemberSource, SourceReader};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local file member source
pub struct LocalFileSource {
    path: PathBuf,
    size: u64,
}

impl LocalFileSource {
    pub fn new(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Cannot stat {}", path.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("Not a regular file: {}", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }
}

#[async_trait]
impl MemberSource for LocalFileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn open(&self) -> Result<SourceReader> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("Cannot open {}", self.path.display()))?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
