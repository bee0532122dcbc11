use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Minimal directory-enumeration abstraction used by reconciliation.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// All regular files directly inside `dir` (non-recursive).
    async fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// UTC creation time of a file; used to order the backlog newest-first.
    async fn created_at(&self, path: &Path) -> Result<DateTime<Utc>>;
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Default, Clone)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryLister for RealFs {
    async fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    async fn created_at(&self, path: &Path) -> Result<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(path).await?;
        // Birth time is not reported on every filesystem; fall back to the
        // modification time rather than failing the scan.
        let stamp = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or_else(|_| std::time::SystemTime::now());
        Ok(DateTime::<Utc>::from(stamp))
    }
}
