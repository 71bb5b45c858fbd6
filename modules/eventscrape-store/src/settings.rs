use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::InstagramScraperType;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WordPressSettingsRow {
    pub id: Uuid,
    pub name: String,
    pub site_url: String,
    pub username: String,
    /// Never serialized into API responses.
    #[serde(skip_serializing)]
    pub app_password: String,
    pub default_status: String,
    /// source id (text) → WP category id
    pub source_category_mappings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WordPressSettingsRow {
    /// Category mapping for a source, if configured.
    pub fn category_for_source(&self, source_id: Uuid) -> Option<i64> {
        self.source_category_mappings
            .get(source_id.to_string())
            .and_then(|v| v.as_i64())
    }
}

#[derive(Debug, Clone)]
pub struct WordPressSettingsInput {
    pub name: String,
    pub site_url: String,
    pub username: String,
    pub app_password: String,
    pub default_status: String,
    pub source_category_mappings: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SystemSettingsRow {
    pub id: i32,
    pub ai_provider: Option<String>,
    /// Key material stays out of API responses.
    #[serde(skip_serializing)]
    pub ai_api_key: Option<String>,
    pub instagram_scraper_type: String,
    pub instagram_allow_source_override: bool,
    pub feature_flags: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl SystemSettingsRow {
    pub fn instagram_scraper_type(&self) -> Result<InstagramScraperType> {
        self.instagram_scraper_type.parse().map_err(StoreError::Decode)
    }
}

pub struct SettingsRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SettingsRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_wordpress(&self) -> Result<Vec<WordPressSettingsRow>> {
        let rows = sqlx::query_as::<_, WordPressSettingsRow>(
            "SELECT * FROM wordpress_settings ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_wordpress(&self, id: Uuid) -> Result<WordPressSettingsRow> {
        sqlx::query_as::<_, WordPressSettingsRow>(
            "SELECT * FROM wordpress_settings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("wordpress settings", id))
    }

    pub async fn create_wordpress(
        &self,
        input: &WordPressSettingsInput,
    ) -> Result<WordPressSettingsRow> {
        let row = sqlx::query_as::<_, WordPressSettingsRow>(
            r#"
            INSERT INTO wordpress_settings
                (name, site_url, username, app_password, default_status, source_category_mappings)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.site_url)
        .bind(&input.username)
        .bind(&input.app_password)
        .bind(&input.default_status)
        .bind(&input.source_category_mappings)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_wordpress(
        &self,
        id: Uuid,
        input: &WordPressSettingsInput,
    ) -> Result<WordPressSettingsRow> {
        sqlx::query_as::<_, WordPressSettingsRow>(
            r#"
            UPDATE wordpress_settings SET
                name = $2, site_url = $3, username = $4, app_password = $5,
                default_status = $6, source_category_mappings = $7, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.site_url)
        .bind(&input.username)
        .bind(&input.app_password)
        .bind(&input.default_status)
        .bind(&input.source_category_mappings)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("wordpress settings", id))
    }

    pub async fn delete_wordpress(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM wordpress_settings WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("wordpress settings", id));
        }
        Ok(())
    }

    /// The singleton row (id = 1), created by migration.
    pub async fn system(&self) -> Result<SystemSettingsRow> {
        sqlx::query_as::<_, SystemSettingsRow>("SELECT * FROM system_settings WHERE id = 1")
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("system settings", 1))
    }

    pub async fn update_system(
        &self,
        ai_provider: Option<&str>,
        ai_api_key: Option<&str>,
        instagram_scraper_type: InstagramScraperType,
        instagram_allow_source_override: bool,
        feature_flags: serde_json::Value,
    ) -> Result<SystemSettingsRow> {
        let row = sqlx::query_as::<_, SystemSettingsRow>(
            r#"
            UPDATE system_settings SET
                ai_provider = $1, ai_api_key = $2, instagram_scraper_type = $3,
                instagram_allow_source_override = $4, feature_flags = $5, updated_at = now()
            WHERE id = 1
            RETURNING *
            "#,
        )
        .bind(ai_provider)
        .bind(ai_api_key)
        .bind(instagram_scraper_type.to_string())
        .bind(instagram_allow_source_override)
        .bind(feature_flags)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }
}
