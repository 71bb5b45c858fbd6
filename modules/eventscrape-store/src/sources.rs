use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::{
    ClassificationMode, InstagramScraperType, Source, SourceType,
};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceRowDb {
    id: Uuid,
    name: String,
    base_url: String,
    module_key: String,
    active: bool,
    default_timezone: String,
    rate_limit_per_min: Option<i32>,
    source_type: String,
    instagram_username: Option<String>,
    classification_mode: Option<String>,
    instagram_scraper_type: Option<String>,
    last_checked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SourceRowDb {
    fn into_domain(self) -> Result<Source> {
        Ok(Source {
            id: self.id,
            name: self.name,
            base_url: self.base_url,
            module_key: self.module_key,
            active: self.active,
            default_timezone: self.default_timezone,
            rate_limit_per_min: self.rate_limit_per_min,
            source_type: self
                .source_type
                .parse::<SourceType>()
                .map_err(StoreError::Decode)?,
            instagram_username: self.instagram_username,
            classification_mode: self
                .classification_mode
                .map(|v| v.parse::<ClassificationMode>())
                .transpose()
                .map_err(StoreError::Decode)?,
            instagram_scraper_type: self
                .instagram_scraper_type
                .map(|v| v.parse::<InstagramScraperType>())
                .transpose()
                .map_err(StoreError::Decode)?,
            last_checked: self.last_checked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fields accepted when creating or updating a source.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub name: String,
    pub base_url: String,
    pub module_key: String,
    pub active: bool,
    pub default_timezone: String,
    pub rate_limit_per_min: Option<i32>,
    pub source_type: SourceType,
    pub instagram_username: Option<String>,
    pub classification_mode: Option<ClassificationMode>,
    pub instagram_scraper_type: Option<InstagramScraperType>,
}

pub struct SourceRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SourceRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRowDb>(
            "SELECT * FROM sources ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(SourceRowDb::into_domain).collect()
    }

    /// Instagram sources filtered by active flag; the batch scheduler's
    /// all_active / all_inactive scopes.
    pub async fn list_instagram(&self, active: bool) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRowDb>(
            "SELECT * FROM sources WHERE source_type = 'instagram' AND active = $1 ORDER BY name",
        )
        .bind(active)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(SourceRowDb::into_domain).collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<Source> {
        let row = sqlx::query_as::<_, SourceRowDb>("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("source", id))?;
        row.into_domain()
    }

    pub async fn get_by_module_key(&self, module_key: &str) -> Result<Source> {
        let row = sqlx::query_as::<_, SourceRowDb>("SELECT * FROM sources WHERE module_key = $1")
            .bind(module_key)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("source", module_key))?;
        row.into_domain()
    }

    pub async fn create(&self, input: &SourceInput) -> Result<Source> {
        let row = sqlx::query_as::<_, SourceRowDb>(
            r#"
            INSERT INTO sources
                (name, base_url, module_key, active, default_timezone, rate_limit_per_min,
                 source_type, instagram_username, classification_mode, instagram_scraper_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.base_url)
        .bind(&input.module_key)
        .bind(input.active)
        .bind(&input.default_timezone)
        .bind(input.rate_limit_per_min)
        .bind(input.source_type.to_string())
        .bind(&input.instagram_username)
        .bind(input.classification_mode.map(|m| m.to_string()))
        .bind(input.instagram_scraper_type.map(|t| t.to_string()))
        .fetch_one(self.pool)
        .await?;
        row.into_domain()
    }

    pub async fn update(&self, id: Uuid, input: &SourceInput) -> Result<Source> {
        let row = sqlx::query_as::<_, SourceRowDb>(
            r#"
            UPDATE sources SET
                name = $2, base_url = $3, module_key = $4, active = $5,
                default_timezone = $6, rate_limit_per_min = $7, source_type = $8,
                instagram_username = $9, classification_mode = $10,
                instagram_scraper_type = $11, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.base_url)
        .bind(&input.module_key)
        .bind(input.active)
        .bind(&input.default_timezone)
        .bind(input.rate_limit_per_min)
        .bind(input.source_type.to_string())
        .bind(&input.instagram_username)
        .bind(input.classification_mode.map(|m| m.to_string()))
        .bind(input.instagram_scraper_type.map(|t| t.to_string()))
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("source", id))?;
        row.into_domain()
    }

    pub async fn touch_last_checked(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sources SET last_checked = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Sources with runs on record are never deleted; deactivate instead.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let run_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE source_id = $1")
                .bind(id)
                .fetch_one(self.pool)
                .await?;
        if run_count > 0 {
            return Err(StoreError::Conflict(format!(
                "source {id} has {run_count} runs on record; set active=false instead"
            )));
        }
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("source", id));
        }
        Ok(())
    }
}
