use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::{Schedule, ScheduleConfig, ScheduleType};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ScheduleRowDb {
    id: Uuid,
    schedule_type: String,
    source_id: Option<Uuid>,
    wordpress_settings_id: Option<Uuid>,
    cron: String,
    timezone: String,
    active: bool,
    repeat_key: Option<String>,
    config: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ScheduleRowDb {
    fn into_domain(self) -> Result<Schedule> {
        Ok(Schedule {
            id: self.id,
            schedule_type: self
                .schedule_type
                .parse::<ScheduleType>()
                .map_err(StoreError::Decode)?,
            source_id: self.source_id,
            wordpress_settings_id: self.wordpress_settings_id,
            cron: self.cron,
            timezone: self.timezone,
            active: self.active,
            repeat_key: self.repeat_key,
            config: serde_json::from_value(self.config)
                .map_err(|e| StoreError::Decode(format!("schedule config: {e}")))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleInput {
    pub schedule_type: ScheduleType,
    pub source_id: Option<Uuid>,
    pub wordpress_settings_id: Option<Uuid>,
    pub cron: String,
    pub timezone: String,
    pub active: bool,
    pub config: ScheduleConfig,
}

pub struct ScheduleRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ScheduleRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRowDb>(
            "SELECT * FROM schedules ORDER BY created_at ASC",
        )
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(ScheduleRowDb::into_domain).collect()
    }

    pub async fn list_active(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRowDb>(
            "SELECT * FROM schedules WHERE active = TRUE ORDER BY created_at ASC",
        )
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(ScheduleRowDb::into_domain).collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<Schedule> {
        let row = sqlx::query_as::<_, ScheduleRowDb>("SELECT * FROM schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("schedule", id))?;
        row.into_domain()
    }

    pub async fn create(&self, input: &ScheduleInput) -> Result<Schedule> {
        let config = serde_json::to_value(&input.config)
            .map_err(|e| StoreError::Decode(format!("schedule config: {e}")))?;
        let row = sqlx::query_as::<_, ScheduleRowDb>(
            r#"
            INSERT INTO schedules
                (schedule_type, source_id, wordpress_settings_id, cron, timezone, active, config)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(input.schedule_type.to_string())
        .bind(input.source_id)
        .bind(input.wordpress_settings_id)
        .bind(&input.cron)
        .bind(&input.timezone)
        .bind(input.active)
        .bind(config)
        .fetch_one(self.pool)
        .await?;
        row.into_domain()
    }

    pub async fn update(&self, id: Uuid, input: &ScheduleInput) -> Result<Schedule> {
        let config = serde_json::to_value(&input.config)
            .map_err(|e| StoreError::Decode(format!("schedule config: {e}")))?;
        let row = sqlx::query_as::<_, ScheduleRowDb>(
            r#"
            UPDATE schedules SET
                schedule_type = $2, source_id = $3, wordpress_settings_id = $4,
                cron = $5, timezone = $6, active = $7, config = $8, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.schedule_type.to_string())
        .bind(input.source_id)
        .bind(input.wordpress_settings_id)
        .bind(&input.cron)
        .bind(&input.timezone)
        .bind(input.active)
        .bind(config)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("schedule", id))?;
        row.into_domain()
    }

    /// Persist the repeat key returned by the queue layer (or clear it on
    /// deregistration).
    pub async fn set_repeat_key(&self, id: Uuid, repeat_key: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE schedules SET repeat_key = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(repeat_key)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete the row. Export history is preserved: the FK nulls
    /// `exports.schedule_id`.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("schedule", id));
        }
        Ok(())
    }
}
