//! Storage port for screenshot records.
//!
//! The pipeline only ever talks to [`ScreenshotRepository`]; the postgres
//! adapter backs production and the in-memory adapter backs tests.

mod memory;
mod postgres;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use scry_model::{ScreenshotRecord, ScreenshotStatus};

pub use memory::InMemoryScreenshotRepository;
pub use postgres::PostgresScreenshotRepository;

#[async_trait]
pub trait ScreenshotRepository: Send + Sync {
    async fn find_by_path(&self, path: &Path) -> Result<Option<ScreenshotRecord>>;

    /// Insert a Pending record for `path`, or return the existing record when
    /// one is already present. A concurrent insert racing this call is a
    /// success, not an error.
    async fn insert_pending(
        &self,
        path: &Path,
        created_at: DateTime<Utc>,
    ) -> Result<ScreenshotRecord>;

    async fn update_status(
        &self,
        id: Uuid,
        status: ScreenshotStatus,
        ocr_text: Option<&str>,
    ) -> Result<()>;

    async fn list_by_status(
        &self,
        statuses: &[ScreenshotStatus],
    ) -> Result<Vec<ScreenshotRecord>>;

    async fn list_all_paths(&self) -> Result<HashSet<PathBuf>>;

    async fn count_all(&self) -> Result<u64>;
}
