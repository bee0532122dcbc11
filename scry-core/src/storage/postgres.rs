use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{Result, ScryError};
use scry_model::{ScreenshotRecord, ScreenshotStatus};

#[derive(Clone, Debug)]
pub struct PostgresScreenshotRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ScreenshotRow {
    id: Uuid,
    path: String,
    status: String,
    ocr_text: Option<String>,
    created_at: DateTime<Utc>,
}

impl ScreenshotRow {
    fn into_record(self) -> Result<ScreenshotRecord> {
        let status = ScreenshotStatus::parse(&self.status).ok_or_else(|| {
            ScryError::Internal(format!("unknown status {:?} for {}", self.status, self.path))
        })?;
        Ok(ScreenshotRecord {
            id: self.id,
            path: PathBuf::from(self.path),
            status,
            ocr_text: self.ocr_text,
            created_at: self.created_at,
        })
    }
}

impl PostgresScreenshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl super::ScreenshotRepository for PostgresScreenshotRepository {
    async fn find_by_path(&self, path: &Path) -> Result<Option<ScreenshotRecord>> {
        let row = sqlx::query_as::<_, ScreenshotRow>(
            r#"
            SELECT id, path, status, ocr_text, created_at
            FROM screenshots
            WHERE path = $1
            "#,
        )
        .bind(path.to_string_lossy().as_ref())
        .fetch_optional(self.pool())
        .await?;

        row.map(ScreenshotRow::into_record).transpose()
    }

    async fn insert_pending(
        &self,
        path: &Path,
        created_at: DateTime<Utc>,
    ) -> Result<ScreenshotRecord> {
        let path_str = path.to_string_lossy();

        // DO NOTHING on conflict keeps the insert idempotent; a concurrent
        // insert for the same path wins and we read its row back.
        sqlx::query(
            r#"
            INSERT INTO screenshots (id, path, status, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (path) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(path_str.as_ref())
        .bind(ScreenshotStatus::Pending.as_str())
        .bind(created_at)
        .execute(self.pool())
        .await?;

        self.find_by_path(path).await?.ok_or_else(|| {
            ScryError::Internal(format!("record vanished after insert: {}", path.display()))
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ScreenshotStatus,
        ocr_text: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE screenshots
            SET status = $2,
                ocr_text = COALESCE($3, ocr_text)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(ocr_text)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(ScryError::Internal(format!("no record with id {id}")));
        }
        Ok(())
    }

    async fn list_by_status(
        &self,
        statuses: &[ScreenshotStatus],
    ) -> Result<Vec<ScreenshotRecord>> {
        let encoded: Vec<String> = statuses.iter().map(|s| s.as_str().to_owned()).collect();
        let rows = sqlx::query_as::<_, ScreenshotRow>(
            r#"
            SELECT id, path, status, ocr_text, created_at
            FROM screenshots
            WHERE status = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&encoded)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ScreenshotRow::into_record).collect()
    }

    async fn list_all_paths(&self) -> Result<HashSet<PathBuf>> {
        let rows = sqlx::query(r#"SELECT path FROM screenshots"#)
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PathBuf::from(row.get::<String, _>("path")))
            .collect())
    }

    async fn count_all(&self) -> Result<u64> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS count FROM screenshots"#)
            .fetch_one(self.pool())
            .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }
}
