//! The ingestion core: scraper output → durable series / occurrence / raw
//! rows, idempotently.
//!
//! Each raw event is written in one transaction. Re-scraping unchanged
//! content touches only `last_seen_at`; a content edit updates the series
//! and raw rows in place; a new date on a recurring series adds exactly one
//! occurrence.

pub mod classify;
pub mod content;
pub mod error;
pub mod normalize;

pub use error::{IngestError, Result};

use tracing::{debug, warn};
use uuid::Uuid;

use eventscrape_common::hash::occurrence_hash;
use eventscrape_common::scraper::RawEvent;
use eventscrape_common::types::{EventStatus, RunErrorEntry, Source};
use eventscrape_store::events::{EventRepo, OccurrenceInsert};
use eventscrape_store::{RawEventInsert, SeriesInsert, Store, UpsertAction};

use classify::{classify_occurrence, infer_recurrence};
use normalize::resolve_instances;

/// What one ingested raw event produced.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub action: UpsertAction,
    pub series_id: Uuid,
    pub raw_id: Uuid,
    pub occurrence_ids: Vec<Uuid>,
}

/// Batch totals, plus the per-item failures that were skipped over.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub occurrences_written: u32,
    pub errors: Vec<RunErrorEntry>,
}

impl IngestStats {
    pub fn events_seen(&self) -> u32 {
        self.inserted + self.updated + self.unchanged
    }
}

#[derive(Clone)]
pub struct Ingestor {
    store: Store,
}

impl Ingestor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Ingest a batch sequentially. Malformed events become structured run
    /// errors and the batch continues; store failures abort.
    pub async fn ingest_batch(
        &self,
        source: &Source,
        run_id: Option<Uuid>,
        events: &[RawEvent],
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        for event in events {
            match self.ingest_one(source, run_id, event).await {
                Ok(outcome) => {
                    match outcome.action {
                        UpsertAction::Inserted => stats.inserted += 1,
                        UpsertAction::Updated => stats.updated += 1,
                        UpsertAction::Unchanged => stats.unchanged += 1,
                    }
                    stats.occurrences_written += outcome.occurrence_ids.len() as u32;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(title = %event.title, error = %e, "Skipping malformed event");
                    stats.errors.push(
                        RunErrorEntry::new("parse_event", e.to_string()).with_item(&event.title),
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(stats)
    }

    /// The upsert protocol for a single raw event.
    pub async fn ingest_one(
        &self,
        source: &Source,
        run_id: Option<Uuid>,
        event: &RawEvent,
    ) -> Result<IngestOutcome> {
        let instances = resolve_instances(event, &source.default_timezone)?;
        let occurrence_type = classify_occurrence(event, &instances);
        let recurrence_type = infer_recurrence(&instances);
        let has_recurrence = instances.len() > 1;

        let first = instances
            .first()
            .ok_or_else(|| IngestError::MalformedDate(event.start.clone()))?;
        let raw_content_hash = content::raw_hash(event, &first.start.iso(), &first.end_iso());
        let series_content_hash = content::series_hash(event);

        let mut tx = self.store.pool().begin().await?;

        let series_ins = SeriesInsert {
            source_id: source.id,
            source_event_id: event.source_event_id.clone(),
            title: event.title.clone(),
            description: event.description_html.clone(),
            venue_name: event.venue_name.clone(),
            venue_address: event.venue_address.clone(),
            city: event.city.clone(),
            region: event.region.clone(),
            country: event.country.clone(),
            organizer: event.organizer.clone(),
            category: event.category.clone(),
            occurrence_type: occurrence_type.to_string(),
            recurrence_type: recurrence_type.to_string(),
            event_status: EventStatus::Scheduled.to_string(),
            url_primary: Some(event.url.clone()),
            image_url: event.image_url.clone(),
            content_hash: series_content_hash,
            raw: Some(event.raw.clone()),
            run_id,
        };
        let (series, action) = EventRepo::upsert_series(&mut *tx, &series_ins).await?;

        let mut occurrence_ids = Vec::with_capacity(instances.len());
        for (i, instance) in instances.iter().enumerate() {
            let ins = OccurrenceInsert {
                series_id: series.id,
                occurrence_hash: occurrence_hash(series.id, &instance.start.iso(), &instance.end_iso()),
                sequence: (i + 1) as i32,
                start_datetime: instance.start.local,
                start_datetime_utc: instance.start.utc,
                end_datetime: instance.end.as_ref().map(|e| e.local),
                end_datetime_utc: instance.end.as_ref().map(|e| e.utc),
                duration_seconds: instance.duration_seconds(),
                timezone: instance.timezone.clone(),
                has_recurrence,
                raw: None,
            };
            let occurrence = EventRepo::upsert_occurrence(&mut *tx, &ins).await?;
            occurrence_ids.push(occurrence.id);
        }

        let raw_ins = RawEventInsert {
            source_id: source.id,
            source_event_id: event.source_event_id.clone(),
            run_id,
            series_id: Some(series.id),
            occurrence_id: if occurrence_ids.len() == 1 {
                occurrence_ids.first().copied()
            } else {
                None
            },
            title: event.title.clone(),
            description: event.description_html.clone(),
            start_datetime: first.start.utc,
            end_datetime: first.end.as_ref().map(|e| e.utc),
            timezone: first.timezone.clone(),
            venue_name: event.venue_name.clone(),
            venue_address: event.venue_address.clone(),
            city: event.city.clone(),
            region: event.region.clone(),
            country: event.country.clone(),
            lat: event.lat,
            lon: event.lon,
            organizer: event.organizer.clone(),
            category: event.category.clone(),
            tags: event.tags.clone(),
            price: event.price.clone(),
            url: event.url.clone(),
            image_url: event.image_url.clone(),
            instagram_post_id: event.instagram.as_ref().map(|m| m.post_id.clone()),
            instagram_caption: event.instagram.as_ref().and_then(|m| m.caption.clone()),
            instagram_local_image_path: event
                .instagram
                .as_ref()
                .and_then(|m| m.local_image_path.clone()),
            classification_confidence: event
                .instagram
                .as_ref()
                .and_then(|m| m.classification_confidence),
            is_event_poster: event.instagram.as_ref().and_then(|m| m.is_event_poster),
            raw: Some(event.raw.clone()),
            content_hash: raw_content_hash,
        };
        let (raw_row, _raw_action) = EventRepo::upsert_raw(&mut *tx, &raw_ins).await?;

        tx.commit().await?;

        debug!(
            series_id = %series.id,
            raw_id = %raw_row.id,
            action = ?action,
            occurrences = occurrence_ids.len(),
            "Event ingested"
        );

        Ok(IngestOutcome {
            action,
            series_id: series.id,
            raw_id: raw_row.id,
            occurrence_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventscrape_common::scraper::SeriesInstance;

    #[test]
    fn occurrence_hashes_are_stable_under_permutation() {
        // resolve_instances sorts, so permuting seriesDates yields the same
        // hash set.
        let series_id = Uuid::new_v4();
        let forward = RawEvent {
            title: "Yoga".into(),
            start: "2025-03-01T11:00:00-07:00".into(),
            url: "https://example.com".into(),
            series_dates: vec![
                SeriesInstance { start: "2025-03-01T11:00:00-07:00".into(), end: None },
                SeriesInstance { start: "2025-03-08T11:00:00-07:00".into(), end: None },
            ],
            ..Default::default()
        };
        let mut reversed = forward.clone();
        reversed.series_dates.reverse();

        let hashes = |event: &RawEvent| -> Vec<String> {
            resolve_instances(event, "UTC")
                .unwrap()
                .iter()
                .map(|i| occurrence_hash(series_id, &i.start.iso(), &i.end_iso()))
                .collect()
        };

        assert_eq!(hashes(&forward), hashes(&reversed));
    }

    #[test]
    fn stats_accumulate_by_action() {
        let mut stats = IngestStats::default();
        stats.inserted += 2;
        stats.unchanged += 1;
        assert_eq!(stats.events_seen(), 3);
    }
}
