//! Duplicate detection across sources.
//!
//! Candidate generation walks raw events sorted by start time and pairs
//! cross-source events within the time window and city; pairs scoring at or
//! above the threshold become open proposals. Review actions promote
//! confirmed pairs into canonical events. No action ever deletes a raw
//! event.

pub mod error;
pub mod similarity;

pub use error::{MatchError, Result};

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use eventscrape_common::scraper::MatchJobData;
use eventscrape_common::types::MatchStatus;
use eventscrape_store::canonical::CanonicalInsert;
use eventscrape_store::matches::{MatchProposal, MatchRow};
use eventscrape_store::{RawEventRow, Store};

use similarity::{score_pair, SCORE_THRESHOLD, TIME_WINDOW_HOURS};

/// Totals from one match-queue job.
#[derive(Debug, Default)]
pub struct MatchRunStats {
    pub candidates_scored: u32,
    pub proposals_written: u32,
}

/// User-supplied field overrides for a merge action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
}

#[derive(Clone)]
pub struct MatchEngine {
    store: Store,
}

impl MatchEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Generate and persist proposals for the job's window (default: the
    /// next 90 days).
    pub async fn run(&self, job: &MatchJobData) -> Result<MatchRunStats> {
        let start = job.start_date.unwrap_or_else(Utc::now);
        let end = job
            .end_date
            .unwrap_or_else(|| start + Duration::days(90));

        let events = self
            .store
            .events()
            .list_raw_between(start, end, &job.source_ids)
            .await?;

        let mut stats = MatchRunStats::default();

        // Events arrive sorted by start; the inner scan stops once past the
        // window, keeping this near-linear for real calendars.
        for (i, a) in events.iter().enumerate() {
            for b in events.iter().skip(i + 1) {
                if (b.start_datetime - a.start_datetime).num_hours() > TIME_WINDOW_HOURS {
                    break;
                }
                if !is_candidate_pair(a, b) {
                    continue;
                }

                let breakdown = score_pair(
                    &a.title,
                    &b.title,
                    a.start_datetime,
                    b.start_datetime,
                    a.venue_name.as_deref(),
                    b.venue_name.as_deref(),
                    &a.url,
                    &b.url,
                );
                stats.candidates_scored += 1;

                if breakdown.total < SCORE_THRESHOLD {
                    continue;
                }

                let proposal = MatchProposal {
                    raw_id_a: a.id,
                    raw_id_b: b.id,
                    score: breakdown.total,
                    reason: serde_json::to_value(&breakdown).unwrap_or_default(),
                    raw_a_content_hash: a.content_hash.clone(),
                    raw_b_content_hash: b.content_hash.clone(),
                };
                if self.store.matches().propose(&proposal).await?.is_some() {
                    stats.proposals_written += 1;
                    debug!(
                        raw_a = %a.id,
                        raw_b = %b.id,
                        score = breakdown.total,
                        "Match proposed"
                    );
                }
            }
        }

        info!(
            candidates = stats.candidates_scored,
            proposals = stats.proposals_written,
            "Match pass complete"
        );
        Ok(stats)
    }

    pub async fn confirm(&self, match_id: Uuid, actor: Option<&str>) -> Result<MatchRow> {
        let row = self.require_open(match_id).await?;
        Ok(self
            .store
            .matches()
            .set_status(row.id, MatchStatus::Confirmed, actor)
            .await?)
    }

    /// Rejected pairs stay rejected until one member's content hash changes;
    /// the proposal writer enforces that via the stored hashes.
    pub async fn reject(&self, match_id: Uuid, actor: Option<&str>) -> Result<MatchRow> {
        let row = self.require_open(match_id).await?;
        Ok(self
            .store
            .matches()
            .set_status(row.id, MatchStatus::Rejected, actor)
            .await?)
    }

    /// Confirm the pair and produce a canonical event. When either raw is
    /// already inside a canonical, the pair unions into it instead of
    /// creating a second one.
    pub async fn merge(
        &self,
        match_id: Uuid,
        payload: &MergePayload,
        actor: Option<&str>,
    ) -> Result<Uuid> {
        let row = self.require_open(match_id).await?;
        let raw_a = self.store.events().raw_by_id(row.raw_id_a).await?;
        let raw_b = self.store.events().raw_by_id(row.raw_id_b).await?;
        let pair = [raw_a.id, raw_b.id];

        self.store
            .matches()
            .set_status(row.id, MatchStatus::Confirmed, actor)
            .await?;

        if let Some(existing) = self.store.canonical().containing_raw_ids(&pair).await? {
            let merged = self.store.canonical().union_raw_ids(existing.id, &pair).await?;
            info!(canonical_id = %merged.id, match_id = %match_id, "Merged into existing canonical");
            return Ok(merged.id);
        }

        let base = &raw_a;
        let ins = CanonicalInsert {
            dedupe_key: payload.dedupe_key.clone(),
            title: payload.title.clone().unwrap_or_else(|| base.title.clone()),
            description: payload
                .description
                .clone()
                .or_else(|| base.description.clone()),
            start_datetime: base.start_datetime,
            end_datetime: base.end_datetime,
            timezone: base.timezone.clone(),
            venue_name: payload
                .venue_name
                .clone()
                .or_else(|| base.venue_name.clone())
                .or_else(|| raw_b.venue_name.clone()),
            venue_address: base
                .venue_address
                .clone()
                .or_else(|| raw_b.venue_address.clone()),
            city: base.city.clone().or_else(|| raw_b.city.clone()),
            region: base.region.clone().or_else(|| raw_b.region.clone()),
            country: base.country.clone().or_else(|| raw_b.country.clone()),
            lat: base.lat.or(raw_b.lat),
            lon: base.lon.or(raw_b.lon),
            organizer: base.organizer.clone().or_else(|| raw_b.organizer.clone()),
            category: payload
                .category
                .clone()
                .or_else(|| base.category.clone())
                .or_else(|| raw_b.category.clone()),
            tags: base.tags.clone(),
            price: base.price.clone().or_else(|| raw_b.price.clone()),
            url: Some(payload.url.clone().unwrap_or_else(|| base.url.clone())),
            image_url: payload
                .image_url
                .clone()
                .or_else(|| base.image_url.clone())
                .or_else(|| raw_b.image_url.clone()),
            merged_from_raw_ids: pair.to_vec(),
        };
        let canonical = self.store.canonical().create(&ins).await?;
        info!(canonical_id = %canonical.id, match_id = %match_id, "Canonical created from merge");
        Ok(canonical.id)
    }

    /// Promote a raw event with no match into a canonical row directly.
    /// A raw already inside a canonical is a no-op returning that canonical.
    pub async fn promote_raw(&self, raw_id: Uuid) -> Result<Uuid> {
        if let Some(existing) = self
            .store
            .canonical()
            .containing_raw_ids(&[raw_id])
            .await?
        {
            return Ok(existing.id);
        }
        let raw = self.store.events().raw_by_id(raw_id).await?;
        let ins = CanonicalInsert {
            dedupe_key: None,
            title: raw.title.clone(),
            description: raw.description.clone(),
            start_datetime: raw.start_datetime,
            end_datetime: raw.end_datetime,
            timezone: raw.timezone.clone(),
            venue_name: raw.venue_name.clone(),
            venue_address: raw.venue_address.clone(),
            city: raw.city.clone(),
            region: raw.region.clone(),
            country: raw.country.clone(),
            lat: raw.lat,
            lon: raw.lon,
            organizer: raw.organizer.clone(),
            category: raw.category.clone(),
            tags: raw.tags.clone(),
            price: raw.price.clone(),
            url: Some(raw.url.clone()),
            image_url: raw.image_url.clone(),
            merged_from_raw_ids: vec![raw.id],
        };
        let canonical = self.store.canonical().create(&ins).await?;
        info!(canonical_id = %canonical.id, raw_id = %raw_id, "Raw event promoted to canonical");
        Ok(canonical.id)
    }

    async fn require_open(&self, match_id: Uuid) -> Result<MatchRow> {
        let row = self.store.matches().get(match_id).await?;
        if row.status != MatchStatus::Open.to_string() {
            return Err(MatchError::NotOpen(match_id));
        }
        Ok(row)
    }
}

/// Cross-source, same-city gate ahead of scoring.
fn is_candidate_pair(a: &RawEventRow, b: &RawEventRow) -> bool {
    if a.source_id == b.source_id {
        return false;
    }
    match (&a.city, &b.city) {
        (Some(ca), Some(cb)) => ca.eq_ignore_ascii_case(cb),
        // An event missing its city can still duplicate one that has it.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(source: Uuid, city: Option<&str>) -> RawEventRow {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap();
        RawEventRow {
            id: Uuid::new_v4(),
            source_id: source,
            source_event_id: None,
            run_id: None,
            series_id: None,
            occurrence_id: None,
            title: "X".into(),
            description: None,
            start_datetime: now,
            end_datetime: None,
            timezone: "UTC".into(),
            venue_name: None,
            venue_address: None,
            city: city.map(str::to_string),
            region: None,
            country: None,
            lat: None,
            lon: None,
            organizer: None,
            category: None,
            tags: vec![],
            price: None,
            url: "https://example.com".into(),
            image_url: None,
            instagram_post_id: None,
            instagram_caption: None,
            instagram_local_image_path: None,
            classification_confidence: None,
            is_event_poster: None,
            raw: None,
            content_hash: "h".into(),
            scraped_at: now,
            last_seen_at: now,
            last_updated_by_run_id: None,
        }
    }

    #[test]
    fn same_source_is_never_a_candidate() {
        let source = Uuid::new_v4();
        assert!(!is_candidate_pair(
            &raw(source, Some("Prince George")),
            &raw(source, Some("Prince George"))
        ));
    }

    #[test]
    fn city_match_is_case_insensitive() {
        let a = raw(Uuid::new_v4(), Some("Prince George"));
        let b = raw(Uuid::new_v4(), Some("prince george"));
        assert!(is_candidate_pair(&a, &b));
    }

    #[test]
    fn different_cities_are_not_candidates() {
        let a = raw(Uuid::new_v4(), Some("Prince George"));
        let b = raw(Uuid::new_v4(), Some("Vancouver"));
        assert!(!is_candidate_pair(&a, &b));
    }

    #[test]
    fn missing_city_still_pairs() {
        let a = raw(Uuid::new_v4(), None);
        let b = raw(Uuid::new_v4(), Some("Vancouver"));
        assert!(is_candidate_pair(&a, &b));
    }
}
