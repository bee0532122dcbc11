use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, ScryError};
use scry_model::{ScreenshotRecord, ScreenshotStatus};

/// In-memory repository for tests and local experiments.
/// Keyed by path to mirror the unique-path constraint of the real store.
#[derive(Debug, Default)]
pub struct InMemoryScreenshotRepository {
    records: RwLock<HashMap<PathBuf, ScreenshotRecord>>,
}

impl InMemoryScreenshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the Pending lifecycle. Used by tests
    /// to model state left behind by a prior run.
    pub async fn seed(&self, record: ScreenshotRecord) {
        self.records
            .write()
            .await
            .insert(record.path.clone(), record);
    }
}

#[async_trait]
impl super::ScreenshotRepository for InMemoryScreenshotRepository {
    async fn find_by_path(&self, path: &Path) -> Result<Option<ScreenshotRecord>> {
        Ok(self.records.read().await.get(path).cloned())
    }

    async fn insert_pending(
        &self,
        path: &Path,
        created_at: DateTime<Utc>,
    ) -> Result<ScreenshotRecord> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(path) {
            return Ok(existing.clone());
        }
        let record = ScreenshotRecord {
            id: Uuid::new_v4(),
            path: path.to_path_buf(),
            status: ScreenshotStatus::Pending,
            ocr_text: None,
            created_at,
        };
        records.insert(path.to_path_buf(), record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ScreenshotStatus,
        ocr_text: Option<&str>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ScryError::Internal(format!("no record with id {id}")))?;
        record.status = status;
        if let Some(text) = ocr_text {
            record.ocr_text = Some(text.to_owned());
        }
        Ok(())
    }

    async fn list_by_status(
        &self,
        statuses: &[ScreenshotStatus],
    ) -> Result<Vec<ScreenshotRecord>> {
        let records = self.records.read().await;
        let mut matched: Vec<ScreenshotRecord> = records
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();
        // Deterministic order for callers that enqueue from this list.
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn list_all_paths(&self) -> Result<HashSet<PathBuf>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn count_all(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}
