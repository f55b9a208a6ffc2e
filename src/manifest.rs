//! JSON manifest of archive members.
//!
//! ```json
//! [
//!   { "name": "photos/a.jpg", "url": "https://example.com/a.jpg", "size": 123456 },
//!   { "name": "notes.txt", "path": "./notes.txt" }
//! ]
//! ```
//!
//! `size` is optional; when absent it is looked up with a HEAD request or read
//! from the file's metadata.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::io::{HttpSource, LocalFileSource, MemberSource};
use crate::pipeline::ArchiveMember;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check that names are unique and every item has exactly one source.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for item in &self.items {
            if item.name.is_empty() {
                bail!("Manifest entry with empty name");
            }
            if !seen.insert(item.name.as_str()) {
                bail!("Duplicate name in manifest: {}", item.name);
            }
            match (&item.url, &item.path) {
                (Some(_), Some(_)) => bail!("{}: both url and path given", item.name),
                (None, None) => bail!("{}: neither url nor path given", item.name),
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolve every item to a member source, probing sizes that are missing.
    ///
    /// `max_retry` bounds the GET attempts of HTTP sources.
    pub async fn into_members(self, max_retry: u32) -> Result<Vec<ArchiveMember>> {
        let mut members = Vec::with_capacity(self.items.len());
        for item in self.items {
            let member = match (item.url, item.path) {
                (Some(url), _) => {
                    let source = match item.size {
                        Some(size) => HttpSource::with_size(url, size)?,
                        None => HttpSource::new(url).await?,
                    };
                    ArchiveMember::new(item.name, source.with_max_retry(max_retry))
                }
                (None, Some(path)) => {
                    let source = LocalFileSource::new(&path)?;
                    if let Some(size) = item.size {
                        if size != source.size() {
                            bail!(
                                "{}: manifest says {} bytes, file has {}",
                                item.name,
                                size,
                                source.size()
                            );
                        }
                    }
                    ArchiveMember::new(item.name, source)
                }
                (None, None) => bail!("{}: neither url nor path given", item.name),
            };
            members.push(member);
        }
        Ok(members)
    }
}
