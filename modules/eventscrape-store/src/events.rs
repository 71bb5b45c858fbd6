//! Series / occurrence / raw-event persistence and the idempotent upsert
//! protocol.
//!
//! Writers race freely: identity is enforced by partial unique indexes and
//! every upsert is a single `INSERT … ON CONFLICT … DO UPDATE … RETURNING`
//! statement. `(xmax = 0)` on the returned row distinguishes a fresh insert
//! from a conflict-update; a conflict whose content hash is unchanged skips
//! the update entirely (the `DO UPDATE … WHERE` clause fails) and falls
//! through to a bookkeeping-only touch.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::filter::EventFilter;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SeriesRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub source_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub organizer: Option<String>,
    pub category: Option<String>,
    pub occurrence_type: String,
    pub recurrence_type: String,
    pub event_status: String,
    pub url_primary: Option<String>,
    pub image_url: Option<String>,
    pub content_hash: String,
    pub raw: Option<serde_json::Value>,
    pub last_updated_by_run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OccurrenceRow {
    pub id: Uuid,
    pub series_id: Uuid,
    pub occurrence_hash: String,
    pub sequence: i32,
    pub start_datetime: NaiveDateTime,
    pub start_datetime_utc: DateTime<Utc>,
    pub end_datetime: Option<NaiveDateTime>,
    pub end_datetime_utc: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub timezone: String,
    pub has_recurrence: bool,
    pub is_provisional: bool,
    pub override_title: Option<String>,
    pub override_description: Option<String>,
    pub override_venue_name: Option<String>,
    pub override_status: Option<String>,
    pub raw: Option<serde_json::Value>,
    pub scraped_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawEventRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub source_event_id: Option<String>,
    pub run_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    pub occurrence_id: Option<Uuid>,
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
    pub url: String,
    pub image_url: Option<String>,
    pub instagram_post_id: Option<String>,
    pub instagram_caption: Option<String>,
    pub instagram_local_image_path: Option<String>,
    pub classification_confidence: Option<f64>,
    pub is_event_poster: Option<bool>,
    pub raw: Option<serde_json::Value>,
    pub content_hash: String,
    pub scraped_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_updated_by_run_id: Option<Uuid>,
}

/// Series fields as computed by ingestion.
#[derive(Debug, Clone)]
pub struct SeriesInsert {
    pub source_id: Uuid,
    pub source_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub organizer: Option<String>,
    pub category: Option<String>,
    pub occurrence_type: String,
    pub recurrence_type: String,
    pub event_status: String,
    pub url_primary: Option<String>,
    pub image_url: Option<String>,
    pub content_hash: String,
    pub raw: Option<serde_json::Value>,
    pub run_id: Option<Uuid>,
}

/// One occurrence as computed by ingestion.
#[derive(Debug, Clone)]
pub struct OccurrenceInsert {
    pub series_id: Uuid,
    pub occurrence_hash: String,
    pub sequence: i32,
    pub start_datetime: NaiveDateTime,
    pub start_datetime_utc: DateTime<Utc>,
    pub end_datetime: Option<NaiveDateTime>,
    pub end_datetime_utc: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub timezone: String,
    pub has_recurrence: bool,
    pub raw: Option<serde_json::Value>,
}

/// Raw-event fields as computed by ingestion.
#[derive(Debug, Clone)]
pub struct RawEventInsert {
    pub source_id: Uuid,
    pub source_event_id: Option<String>,
    pub run_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    pub occurrence_id: Option<Uuid>,
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
    pub url: String,
    pub image_url: Option<String>,
    pub instagram_post_id: Option<String>,
    pub instagram_caption: Option<String>,
    pub instagram_local_image_path: Option<String>,
    pub classification_confidence: Option<f64>,
    pub is_event_poster: Option<bool>,
    pub raw: Option<serde_json::Value>,
    pub content_hash: String,
}

#[derive(sqlx::FromRow)]
struct SeriesUpsertRow {
    #[sqlx(flatten)]
    row: SeriesRow,
    inserted: bool,
}

#[derive(sqlx::FromRow)]
struct RawUpsertRow {
    #[sqlx(flatten)]
    row: RawEventRow,
    inserted: bool,
}

pub struct EventRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> EventRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a series by `(source_id, source_event_id)` identity inside the
    /// caller's transaction. Without a source event id every call inserts a
    /// fresh series.
    pub async fn upsert_series(
        conn: &mut PgConnection,
        ins: &SeriesInsert,
    ) -> Result<(SeriesRow, UpsertAction)> {
        if ins.source_event_id.is_none() {
            let row = Self::insert_series(conn, ins).await?;
            return Ok((row, UpsertAction::Inserted));
        }

        let upserted = sqlx::query_as::<_, SeriesUpsertRow>(
            r#"
            INSERT INTO event_series
                (source_id, source_event_id, title, description, venue_name, venue_address,
                 city, region, country, organizer, category, occurrence_type, recurrence_type,
                 event_status, url_primary, image_url, content_hash, raw, last_updated_by_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (source_id, source_event_id) WHERE source_event_id IS NOT NULL
            DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                venue_name = EXCLUDED.venue_name,
                venue_address = EXCLUDED.venue_address,
                city = EXCLUDED.city,
                region = EXCLUDED.region,
                country = EXCLUDED.country,
                organizer = EXCLUDED.organizer,
                category = EXCLUDED.category,
                occurrence_type = EXCLUDED.occurrence_type,
                recurrence_type = EXCLUDED.recurrence_type,
                event_status = EXCLUDED.event_status,
                url_primary = EXCLUDED.url_primary,
                image_url = EXCLUDED.image_url,
                content_hash = EXCLUDED.content_hash,
                raw = EXCLUDED.raw,
                last_updated_by_run_id = EXCLUDED.last_updated_by_run_id,
                updated_at = now()
            WHERE event_series.content_hash IS DISTINCT FROM EXCLUDED.content_hash
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(ins.source_id)
        .bind(&ins.source_event_id)
        .bind(&ins.title)
        .bind(&ins.description)
        .bind(&ins.venue_name)
        .bind(&ins.venue_address)
        .bind(&ins.city)
        .bind(&ins.region)
        .bind(&ins.country)
        .bind(&ins.organizer)
        .bind(&ins.category)
        .bind(&ins.occurrence_type)
        .bind(&ins.recurrence_type)
        .bind(&ins.event_status)
        .bind(&ins.url_primary)
        .bind(&ins.image_url)
        .bind(&ins.content_hash)
        .bind(&ins.raw)
        .bind(ins.run_id)
        .fetch_optional(&mut *conn)
        .await?;

        match upserted {
            Some(u) if u.inserted => Ok((u.row, UpsertAction::Inserted)),
            Some(u) => Ok((u.row, UpsertAction::Updated)),
            // Conflict with identical content: the guarded update matched no
            // row. Touch bookkeeping only.
            None => {
                let row = sqlx::query_as::<_, SeriesRow>(
                    r#"
                    UPDATE event_series
                    SET last_updated_by_run_id = $3
                    WHERE source_id = $1 AND source_event_id = $2
                    RETURNING *
                    "#,
                )
                .bind(ins.source_id)
                .bind(&ins.source_event_id)
                .bind(ins.run_id)
                .fetch_one(&mut *conn)
                .await?;
                Ok((row, UpsertAction::Unchanged))
            }
        }
    }

    async fn insert_series(conn: &mut PgConnection, ins: &SeriesInsert) -> Result<SeriesRow> {
        let row = sqlx::query_as::<_, SeriesRow>(
            r#"
            INSERT INTO event_series
                (source_id, source_event_id, title, description, venue_name, venue_address,
                 city, region, country, organizer, category, occurrence_type, recurrence_type,
                 event_status, url_primary, image_url, content_hash, raw, last_updated_by_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(ins.source_id)
        .bind(&ins.source_event_id)
        .bind(&ins.title)
        .bind(&ins.description)
        .bind(&ins.venue_name)
        .bind(&ins.venue_address)
        .bind(&ins.city)
        .bind(&ins.region)
        .bind(&ins.country)
        .bind(&ins.organizer)
        .bind(&ins.category)
        .bind(&ins.occurrence_type)
        .bind(&ins.recurrence_type)
        .bind(&ins.event_status)
        .bind(&ins.url_primary)
        .bind(&ins.image_url)
        .bind(&ins.content_hash)
        .bind(&ins.raw)
        .bind(ins.run_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Insert-or-touch one occurrence keyed by its globally unique hash.
    pub async fn upsert_occurrence(
        conn: &mut PgConnection,
        ins: &OccurrenceInsert,
    ) -> Result<OccurrenceRow> {
        let row = sqlx::query_as::<_, OccurrenceRow>(
            r#"
            INSERT INTO event_occurrences
                (series_id, occurrence_hash, sequence, start_datetime, start_datetime_utc,
                 end_datetime, end_datetime_utc, duration_seconds, timezone, has_recurrence, raw)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (occurrence_hash)
            DO UPDATE SET last_seen_at = now()
            RETURNING *
            "#,
        )
        .bind(ins.series_id)
        .bind(&ins.occurrence_hash)
        .bind(ins.sequence)
        .bind(ins.start_datetime)
        .bind(ins.start_datetime_utc)
        .bind(ins.end_datetime)
        .bind(ins.end_datetime_utc)
        .bind(ins.duration_seconds)
        .bind(&ins.timezone)
        .bind(ins.has_recurrence)
        .bind(&ins.raw)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Upsert a raw event with the same identity rule as series. On an
    /// unchanged conflict, only `last_seen_at` advances.
    pub async fn upsert_raw(
        conn: &mut PgConnection,
        ins: &RawEventInsert,
    ) -> Result<(RawEventRow, UpsertAction)> {
        if ins.source_event_id.is_none() {
            let row = Self::insert_raw(conn, ins).await?;
            return Ok((row, UpsertAction::Inserted));
        }

        let upserted = sqlx::query_as::<_, RawUpsertRow>(
            r#"
            INSERT INTO events_raw
                (source_id, source_event_id, run_id, series_id, occurrence_id, title, description,
                 start_datetime, end_datetime, timezone, venue_name, venue_address, city, region,
                 country, lat, lon, organizer, category, tags, price, url, image_url,
                 instagram_post_id, instagram_caption, instagram_local_image_path,
                 classification_confidence, is_event_poster, raw, content_hash, last_updated_by_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31)
            ON CONFLICT (source_id, source_event_id) WHERE source_event_id IS NOT NULL
            DO UPDATE SET
                run_id = EXCLUDED.run_id,
                series_id = EXCLUDED.series_id,
                occurrence_id = EXCLUDED.occurrence_id,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                start_datetime = EXCLUDED.start_datetime,
                end_datetime = EXCLUDED.end_datetime,
                timezone = EXCLUDED.timezone,
                venue_name = EXCLUDED.venue_name,
                venue_address = EXCLUDED.venue_address,
                city = EXCLUDED.city,
                region = EXCLUDED.region,
                country = EXCLUDED.country,
                lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                organizer = EXCLUDED.organizer,
                category = EXCLUDED.category,
                tags = EXCLUDED.tags,
                price = EXCLUDED.price,
                url = EXCLUDED.url,
                image_url = EXCLUDED.image_url,
                instagram_post_id = EXCLUDED.instagram_post_id,
                instagram_caption = EXCLUDED.instagram_caption,
                instagram_local_image_path = EXCLUDED.instagram_local_image_path,
                classification_confidence = EXCLUDED.classification_confidence,
                is_event_poster = EXCLUDED.is_event_poster,
                raw = EXCLUDED.raw,
                content_hash = EXCLUDED.content_hash,
                last_seen_at = now(),
                last_updated_by_run_id = EXCLUDED.last_updated_by_run_id
            WHERE events_raw.content_hash IS DISTINCT FROM EXCLUDED.content_hash
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(ins.source_id)
        .bind(&ins.source_event_id)
        .bind(ins.run_id)
        .bind(ins.series_id)
        .bind(ins.occurrence_id)
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
        .bind(&ins.instagram_post_id)
        .bind(&ins.instagram_caption)
        .bind(&ins.instagram_local_image_path)
        .bind(ins.classification_confidence)
        .bind(ins.is_event_poster)
        .bind(&ins.raw)
        .bind(&ins.content_hash)
        .bind(ins.run_id)
        .fetch_optional(&mut *conn)
        .await?;

        match upserted {
            Some(u) if u.inserted => Ok((u.row, UpsertAction::Inserted)),
            Some(u) => Ok((u.row, UpsertAction::Updated)),
            None => {
                let row = sqlx::query_as::<_, RawEventRow>(
                    r#"
                    UPDATE events_raw
                    SET last_seen_at = now(), last_updated_by_run_id = $3
                    WHERE source_id = $1 AND source_event_id = $2
                    RETURNING *
                    "#,
                )
                .bind(ins.source_id)
                .bind(&ins.source_event_id)
                .bind(ins.run_id)
                .fetch_one(&mut *conn)
                .await?;
                Ok((row, UpsertAction::Unchanged))
            }
        }
    }

    async fn insert_raw(conn: &mut PgConnection, ins: &RawEventInsert) -> Result<RawEventRow> {
        let row = sqlx::query_as::<_, RawEventRow>(
            r#"
            INSERT INTO events_raw
                (source_id, source_event_id, run_id, series_id, occurrence_id, title, description,
                 start_datetime, end_datetime, timezone, venue_name, venue_address, city, region,
                 country, lat, lon, organizer, category, tags, price, url, image_url,
                 instagram_post_id, instagram_caption, instagram_local_image_path,
                 classification_confidence, is_event_poster, raw, content_hash, last_updated_by_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31)
            RETURNING *
            "#,
        )
        .bind(ins.source_id)
        .bind(&ins.source_event_id)
        .bind(ins.run_id)
        .bind(ins.series_id)
        .bind(ins.occurrence_id)
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
        .bind(&ins.instagram_post_id)
        .bind(&ins.instagram_caption)
        .bind(&ins.instagram_local_image_path)
        .bind(ins.classification_confidence)
        .bind(ins.is_event_poster)
        .bind(&ins.raw)
        .bind(&ins.content_hash)
        .bind(ins.run_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    pub async fn raw_by_id(&self, id: Uuid) -> Result<RawEventRow> {
        sqlx::query_as::<_, RawEventRow>("SELECT * FROM events_raw WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("raw event", id))
    }

    /// Filtered listing used by the export engine and API, sorted by start
    /// time ascending.
    pub async fn list_raw(&self, filter: &EventFilter) -> Result<Vec<RawEventRow>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM events_raw WHERE 1=1");
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY start_datetime ASC");
        Ok(qb.build_query_as::<RawEventRow>().fetch_all(self.pool).await?)
    }

    /// Raw events in a UTC window, optionally narrowed to sources. Candidate
    /// feed for the match engine.
    pub async fn list_raw_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source_ids: &[Uuid],
    ) -> Result<Vec<RawEventRow>> {
        let rows = if source_ids.is_empty() {
            sqlx::query_as::<_, RawEventRow>(
                r#"
                SELECT * FROM events_raw
                WHERE start_datetime >= $1 AND start_datetime <= $2
                ORDER BY start_datetime ASC
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_all(self.pool)
            .await?
        } else {
            sqlx::query_as::<_, RawEventRow>(
                r#"
                SELECT * FROM events_raw
                WHERE start_datetime >= $1 AND start_datetime <= $2
                  AND source_id = ANY($3)
                ORDER BY start_datetime ASC
                "#,
            )
            .bind(start)
            .bind(end)
            .bind(source_ids)
            .fetch_all(self.pool)
            .await?
        };
        Ok(rows)
    }

    pub async fn occurrences_of_series(&self, series_id: Uuid) -> Result<Vec<OccurrenceRow>> {
        let rows = sqlx::query_as::<_, OccurrenceRow>(
            "SELECT * FROM event_occurrences WHERE series_id = $1 ORDER BY sequence ASC",
        )
        .bind(series_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn series_by_id(&self, id: Uuid) -> Result<SeriesRow> {
        sqlx::query_as::<_, SeriesRow>("SELECT * FROM event_series WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("series", id))
    }

    /// Stale-detection hook: occurrences a re-scrape did not refresh. A date
    /// removed from a recurring series stops getting `last_seen_at` bumps and
    /// surfaces here.
    pub async fn occurrences_unseen_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OccurrenceRow>> {
        let rows = sqlx::query_as::<_, OccurrenceRow>(
            "SELECT * FROM event_occurrences WHERE last_seen_at < $1 ORDER BY last_seen_at ASC",
        )
        .bind(cutoff)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
