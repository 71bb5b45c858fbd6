use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::{ExportFormat, ExportStatus};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExportRow {
    pub id: Uuid,
    pub format: String,
    pub status: String,
    pub item_count: i32,
    pub file_path: Option<String>,
    pub params: serde_json::Value,
    pub error_message: Option<String>,
    pub schedule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExportRow {
    pub fn format(&self) -> Result<ExportFormat> {
        self.format.parse().map_err(StoreError::Decode)
    }

    pub fn status(&self) -> Result<ExportStatus> {
        self.status.parse().map_err(StoreError::Decode)
    }
}

pub struct ExportRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ExportRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        format: ExportFormat,
        params: serde_json::Value,
        schedule_id: Option<Uuid>,
    ) -> Result<ExportRow> {
        let row = sqlx::query_as::<_, ExportRow>(
            r#"
            INSERT INTO exports (format, status, params, schedule_id)
            VALUES ($1, 'processing', $2, $3)
            RETURNING *
            "#,
        )
        .bind(format.to_string())
        .bind(params)
        .bind(schedule_id)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<ExportRow> {
        sqlx::query_as::<_, ExportRow>("SELECT * FROM exports WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("export", id))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<ExportRow>> {
        let rows = sqlx::query_as::<_, ExportRow>(
            "SELECT * FROM exports ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn finish_success(
        &self,
        id: Uuid,
        item_count: i32,
        file_path: Option<&str>,
        params: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE exports
            SET status = 'success', item_count = $2, file_path = $3,
                params = params || $4, finished_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(item_count)
        .bind(file_path)
        .bind(params)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish_error(&self, id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE exports
            SET status = 'error', error_message = $2, finished_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Cancel a processing export. Returns false when the export had already
    /// finished.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE exports
            SET status = 'error', error_message = 'cancelled', finished_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
