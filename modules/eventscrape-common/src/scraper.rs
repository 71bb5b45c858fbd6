//! The contract between the worker runtime and scraper modules.
//!
//! Scraper modules (website crawlers, the Instagram backends) are external
//! collaborators: they receive a context from the worker and hand back
//! `RawEvent` DTOs plus a page count. Everything here is wire-shaped — dates
//! arrive as strings (RFC 3339 or `YYYY-MM-DD HH:MM`) and are parsed by the
//! ingestion core, which owns timezone resolution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scheduled date of a recurring event, as reported by a scraper.
/// Promoted to a first-class value so recurrence survives ingestion as more
/// than a JSON blob; the opaque `raw` payload still carries the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesInstance {
    /// RFC 3339 or `YYYY-MM-DD HH:MM` local wall-clock.
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// An event as observed by a scraper, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Stable identity within the source. When present, re-scrapes upsert;
    /// when absent, every scrape inserts a fresh row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_html: Option<String>,
    /// RFC 3339 or `YYYY-MM-DD HH:MM` local wall-clock.
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// IANA zone; falls back to the source's default timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Set when the event is online-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_url: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    /// All scheduled dates for recurring events. A single-date event leaves
    /// this empty and uses `start`/`end`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series_dates: Vec<SeriesInstance>,
    /// Instagram-only metadata, absent for website sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<InstagramMeta>,
    /// Opaque original payload, passed through untouched.
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramMeta {
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_event_poster: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    #[default]
    Full,
    Incremental,
}

impl std::fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeMode::Full => write!(f, "full"),
            ScrapeMode::Incremental => write!(f, "incremental"),
        }
    }
}

impl std::str::FromStr for ScrapeMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!("unknown ScrapeMode: {other}")),
        }
    }
}

/// Payload of a `scrape-queue` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJobData {
    pub source_id: Uuid,
    pub run_id: Uuid,
    pub module_key: String,
    pub source_name: String,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub scrape_mode: ScrapeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_options: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_file: Option<serde_json::Value>,
}

/// Payload of an `instagram-scrape-queue` job (one account per job).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramJobData {
    pub account_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,
}

/// Payload of a `match-queue` job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchJobData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ids: Vec<Uuid>,
}

/// Payload of a `schedule-queue` trigger job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJobData {
    pub schedule_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordpress_settings_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_optional_fields_default() {
        let json = serde_json::json!({
            "title": "Farmers Market",
            "start": "2025-02-10 09:00",
            "url": "https://example.com/market",
        });
        let ev: RawEvent = serde_json::from_value(json).unwrap();
        assert_eq!(ev.title, "Farmers Market");
        assert!(ev.source_event_id.is_none());
        assert!(ev.series_dates.is_empty());
        assert!(!ev.is_all_day);
        assert!(ev.raw.is_null());
    }

    #[test]
    fn series_dates_round_trip() {
        let ev = RawEvent {
            title: "Yoga".into(),
            start: "2025-03-01T11:00:00-07:00".into(),
            url: "https://example.com/yoga".into(),
            series_dates: vec![
                SeriesInstance {
                    start: "2025-03-01T11:00:00-07:00".into(),
                    end: Some("2025-03-01T15:00:00-07:00".into()),
                },
                SeriesInstance {
                    start: "2025-03-08T11:00:00-07:00".into(),
                    end: Some("2025-03-08T15:00:00-07:00".into()),
                },
            ],
            ..Default::default()
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: RawEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.series_dates.len(), 2);
        assert_eq!(back.series_dates, ev.series_dates);
    }
}
