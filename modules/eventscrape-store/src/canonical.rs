use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::CanonicalStatus;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CanonicalRow {
    pub id: Uuid,
    pub dedupe_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub timezone: String,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub organizer: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub merged_from_raw_ids: Vec<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalRow {
    pub fn status(&self) -> Result<CanonicalStatus> {
        self.status.parse().map_err(StoreError::Decode)
    }
}

/// Field values for a new canonical row; merge actions fill these from the
/// winning raw rows plus user overrides.
#[derive(Debug, Clone)]
pub struct CanonicalInsert {
    pub dedupe_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub timezone: String,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub organizer: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub merged_from_raw_ids: Vec<Uuid>,
}

pub struct CanonicalRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CanonicalRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, ins: &CanonicalInsert) -> Result<CanonicalRow> {
        let row = sqlx::query_as::<_, CanonicalRow>(
            r#"
            INSERT INTO events_canonical
                (dedupe_key, title, description, start_datetime, end_datetime, timezone,
                 venue_name, venue_address, city, region, country, lat, lon, organizer,
                 category, tags, price, url, image_url, merged_from_raw_ids, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, 'new')
            RETURNING *
            "#,
        )
        .bind(&ins.dedupe_key)
        .bind(&ins.title)
        .bind(&ins.description)
        .bind(ins.start_datetime)
        .bind(ins.end_datetime)
        .bind(&ins.timezone)
        .bind(&ins.venue_name)
        .bind(&ins.venue_address)
        .bind(&ins.city)
        .bind(&ins.region)
        .bind(&ins.country)
        .bind(ins.lat)
        .bind(ins.lon)
        .bind(&ins.organizer)
        .bind(&ins.category)
        .bind(&ins.tags)
        .bind(&ins.price)
        .bind(&ins.url)
        .bind(&ins.image_url)
        .bind(&ins.merged_from_raw_ids)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<CanonicalRow> {
        sqlx::query_as::<_, CanonicalRow>("SELECT * FROM events_canonical WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("canonical event", id))
    }

    pub async fn list(&self, status: Option<CanonicalStatus>, limit: i64) -> Result<Vec<CanonicalRow>> {
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, CanonicalRow>(
                    "SELECT * FROM events_canonical WHERE status = $1 ORDER BY start_datetime ASC LIMIT $2",
                )
                .bind(s.to_string())
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CanonicalRow>(
                    "SELECT * FROM events_canonical ORDER BY start_datetime ASC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Canonical rows already containing any of the given raw ids — merge
    /// targets for a union.
    pub async fn containing_raw_ids(&self, raw_ids: &[Uuid]) -> Result<Option<CanonicalRow>> {
        let row = sqlx::query_as::<_, CanonicalRow>(
            "SELECT * FROM events_canonical WHERE merged_from_raw_ids && $1 LIMIT 1",
        )
        .bind(raw_ids)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Add raw ids to an existing canonical's provenance (set union).
    pub async fn union_raw_ids(&self, id: Uuid, raw_ids: &[Uuid]) -> Result<CanonicalRow> {
        sqlx::query_as::<_, CanonicalRow>(
            r#"
            UPDATE events_canonical
            SET merged_from_raw_ids = (
                    SELECT array_agg(DISTINCT x)
                    FROM unnest(merged_from_raw_ids || $2) AS x
                ),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(raw_ids)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("canonical event", id))
    }

    pub async fn set_status(&self, id: Uuid, status: CanonicalStatus) -> Result<CanonicalRow> {
        sqlx::query_as::<_, CanonicalRow>(
            "UPDATE events_canonical SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("canonical event", id))
    }
}
