//! Datetime resolution for scraper output.
//!
//! Scrapers hand over RFC 3339 strings (with offset) or local wall-clock
//! strings (`YYYY-MM-DD HH:MM`, optional seconds, or a bare date). Local
//! strings are resolved in the event's timezone, falling back to the
//! source's default zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

use eventscrape_common::scraper::RawEvent;

use crate::error::{IngestError, Result};

/// A fully resolved wall-clock + UTC instant pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstant {
    pub local: NaiveDateTime,
    pub utc: DateTime<Utc>,
}

impl ResolvedInstant {
    /// Canonical ISO form used in hashes: UTC, second precision, `Z` suffix.
    pub fn iso(&self) -> String {
        self.utc.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// One resolved occurrence of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub start: ResolvedInstant,
    pub end: Option<ResolvedInstant>,
    pub timezone: String,
}

impl ResolvedInstance {
    pub fn duration_seconds(&self) -> Option<i64> {
        self.end
            .as_ref()
            .map(|end| (end.utc - self.start.utc).num_seconds())
    }

    /// End ISO for hashing; empty when absent.
    pub fn end_iso(&self) -> String {
        self.end.as_ref().map(|e| e.iso()).unwrap_or_default()
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| IngestError::UnknownTimezone(name.to_string()))
}

/// Parse one scraper datetime string in the given zone.
pub fn parse_datetime(value: &str, tz: Tz) -> Result<ResolvedInstant> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        let utc = dt.with_timezone(&Utc);
        return Ok(ResolvedInstant {
            local: utc.with_timezone(&tz).naive_local(),
            utc,
        });
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| IngestError::MalformedDate(value.to_string()))?;

    // DST-ambiguous wall clocks resolve to the earlier instant; skipped
    // wall clocks are rejected as malformed.
    let utc = match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            return Err(IngestError::MalformedDate(value.to_string()));
        }
    };

    Ok(ResolvedInstant { local: naive, utc })
}

/// Resolve every occurrence of a raw event: its `series_dates` when present,
/// otherwise the single `start`/`end` pair. Instances are sorted by start so
/// insertion order upstream doesn't matter.
pub fn resolve_instances(event: &RawEvent, default_timezone: &str) -> Result<Vec<ResolvedInstance>> {
    let tz_name = event
        .timezone
        .as_deref()
        .unwrap_or(default_timezone)
        .to_string();
    let tz = parse_timezone(&tz_name)?;

    let mut instances = Vec::new();
    if event.series_dates.is_empty() {
        instances.push(ResolvedInstance {
            start: parse_datetime(&event.start, tz)?,
            end: event
                .end
                .as_deref()
                .map(|e| parse_datetime(e, tz))
                .transpose()?,
            timezone: tz_name.clone(),
        });
    } else {
        for date in &event.series_dates {
            instances.push(ResolvedInstance {
                start: parse_datetime(&date.start, tz)?,
                end: date
                    .end
                    .as_deref()
                    .map(|e| parse_datetime(e, tz))
                    .transpose()?,
                timezone: tz_name.clone(),
            });
        }
    }

    instances.sort_by_key(|i| i.start.utc);
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use eventscrape_common::scraper::SeriesInstance;

    #[test]
    fn rfc3339_with_offset_resolves() {
        let tz = parse_timezone("America/Vancouver").unwrap();
        let instant = parse_datetime("2025-03-01T11:00:00-07:00", tz).unwrap();
        assert_eq!(instant.iso(), "2025-03-01T18:00:00Z");
        assert_eq!(instant.local.hour(), 10); // Vancouver is -08:00 on that date
    }

    #[test]
    fn local_wall_clock_resolves_in_zone() {
        let tz = parse_timezone("America/Vancouver").unwrap();
        let instant = parse_datetime("2025-02-10 19:00", tz).unwrap();
        // PST = UTC-8
        assert_eq!(instant.iso(), "2025-02-11T03:00:00Z");
        assert_eq!(instant.local.hour(), 19);
    }

    #[test]
    fn bare_date_resolves_to_midnight() {
        let tz = parse_timezone("UTC").unwrap();
        let instant = parse_datetime("2025-02-10", tz).unwrap();
        assert_eq!(instant.iso(), "2025-02-10T00:00:00Z");
    }

    #[test]
    fn garbage_is_malformed() {
        let tz = parse_timezone("UTC").unwrap();
        assert!(matches!(
            parse_datetime("next Tuesday", tz),
            Err(IngestError::MalformedDate(_))
        ));
        assert!(matches!(
            parse_datetime("", tz),
            Err(IngestError::MalformedDate(_))
        ));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(IngestError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn single_event_resolves_one_instance() {
        let event = RawEvent {
            title: "X".into(),
            start: "2025-02-10 19:00".into(),
            end: Some("2025-02-10 21:00".into()),
            url: "https://example.com".into(),
            ..Default::default()
        };
        let instances = resolve_instances(&event, "America/Vancouver").unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].duration_seconds(), Some(7_200));
        assert_eq!(instances[0].timezone, "America/Vancouver");
    }

    #[test]
    fn event_timezone_overrides_source_default() {
        let event = RawEvent {
            title: "X".into(),
            start: "2025-02-10 19:00".into(),
            timezone: Some("America/Toronto".into()),
            url: "https://example.com".into(),
            ..Default::default()
        };
        let instances = resolve_instances(&event, "America/Vancouver").unwrap();
        // EST = UTC-5
        assert_eq!(instances[0].start.iso(), "2025-02-11T00:00:00Z");
    }

    #[test]
    fn series_dates_sort_regardless_of_input_order() {
        let event = RawEvent {
            title: "X".into(),
            start: "2025-03-08T11:00:00-07:00".into(),
            url: "https://example.com".into(),
            series_dates: vec![
                SeriesInstance {
                    start: "2025-03-08T11:00:00-07:00".into(),
                    end: None,
                },
                SeriesInstance {
                    start: "2025-03-01T11:00:00-07:00".into(),
                    end: None,
                },
            ],
            ..Default::default()
        };
        let instances = resolve_instances(&event, "UTC").unwrap();
        assert_eq!(instances.len(), 2);
        assert!(instances[0].start.utc < instances[1].start.utc);
    }
}
