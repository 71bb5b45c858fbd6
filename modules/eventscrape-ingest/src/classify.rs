//! Occurrence and recurrence classification.

use eventscrape_common::scraper::RawEvent;
use eventscrape_common::types::{OccurrenceType, RecurrenceType};

use crate::normalize::ResolvedInstance;

const DAY_SECONDS: i64 = 24 * 3_600;

/// Classify an event from its resolved instances. Precedence: all-day,
/// virtual, multi-day (> 24 h), recurring (more than one date), single.
pub fn classify_occurrence(event: &RawEvent, instances: &[ResolvedInstance]) -> OccurrenceType {
    if event.is_all_day {
        return OccurrenceType::AllDay;
    }
    if event.virtual_url.is_some() {
        return OccurrenceType::Virtual;
    }
    if instances.len() > 1 {
        return OccurrenceType::Recurring;
    }
    if let Some(first) = instances.first() {
        if let Some(duration) = first.duration_seconds() {
            if duration > DAY_SECONDS {
                return OccurrenceType::MultiDay;
            }
        }
    }
    OccurrenceType::Single
}

/// Infer the recurrence pattern from the modal gap between consecutive
/// starts: 1 day → daily, 7 days → weekly, 28–31 → monthly, 365–366 →
/// yearly, anything else → custom.
pub fn infer_recurrence(instances: &[ResolvedInstance]) -> RecurrenceType {
    if instances.len() < 2 {
        return RecurrenceType::None;
    }

    let mut gap_days: Vec<i64> = instances
        .windows(2)
        .map(|w| (w[1].start.utc - w[0].start.utc).num_days())
        .collect();
    gap_days.sort_unstable();

    // Modal gap: most frequent value, smallest wins ties.
    let mut modal = gap_days[0];
    let mut modal_count = 0;
    let mut i = 0;
    while i < gap_days.len() {
        let mut j = i;
        while j < gap_days.len() && gap_days[j] == gap_days[i] {
            j += 1;
        }
        if j - i > modal_count {
            modal_count = j - i;
            modal = gap_days[i];
        }
        i = j;
    }

    match modal {
        1 => RecurrenceType::Daily,
        7 => RecurrenceType::Weekly,
        28..=31 => RecurrenceType::Monthly,
        365..=366 => RecurrenceType::Yearly,
        _ => RecurrenceType::Custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{parse_datetime, parse_timezone, ResolvedInstant};
    use chrono::{Duration, Utc};

    fn instance_at(start: ResolvedInstant, duration_hours: Option<i64>) -> ResolvedInstance {
        let end = duration_hours.map(|h| ResolvedInstant {
            local: start.local + Duration::hours(h),
            utc: start.utc + Duration::hours(h),
        });
        ResolvedInstance {
            start,
            end,
            timezone: "UTC".into(),
        }
    }

    fn instances_every(days: i64, count: usize) -> Vec<ResolvedInstance> {
        let tz = parse_timezone("UTC").unwrap();
        let base = parse_datetime("2025-03-01 11:00", tz).unwrap();
        (0..count)
            .map(|i| {
                let offset = Duration::days(days * i as i64);
                instance_at(
                    ResolvedInstant {
                        local: base.local + offset,
                        utc: base.utc + offset,
                    },
                    Some(2),
                )
            })
            .collect()
    }

    fn plain_event() -> RawEvent {
        RawEvent {
            title: "X".into(),
            start: "2025-03-01 11:00".into(),
            url: "https://example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn all_day_wins_over_everything() {
        let mut event = plain_event();
        event.is_all_day = true;
        event.virtual_url = Some("https://zoom.example".into());
        let instances = instances_every(7, 3);
        assert_eq!(classify_occurrence(&event, &instances), OccurrenceType::AllDay);
    }

    #[test]
    fn virtual_url_classifies_virtual() {
        let mut event = plain_event();
        event.virtual_url = Some("https://zoom.example".into());
        let instances = instances_every(7, 1);
        assert_eq!(classify_occurrence(&event, &instances), OccurrenceType::Virtual);
    }

    #[test]
    fn over_24h_is_multi_day() {
        let event = plain_event();
        let tz = parse_timezone("UTC").unwrap();
        let start = parse_datetime("2025-03-01 11:00", tz).unwrap();
        let instances = vec![instance_at(start, Some(30))];
        assert_eq!(classify_occurrence(&event, &instances), OccurrenceType::MultiDay);
    }

    #[test]
    fn exactly_24h_is_single() {
        let event = plain_event();
        let tz = parse_timezone("UTC").unwrap();
        let start = parse_datetime("2025-03-01 11:00", tz).unwrap();
        let instances = vec![instance_at(start, Some(24))];
        assert_eq!(classify_occurrence(&event, &instances), OccurrenceType::Single);
    }

    #[test]
    fn multiple_dates_are_recurring() {
        let event = plain_event();
        assert_eq!(
            classify_occurrence(&event, &instances_every(7, 2)),
            OccurrenceType::Recurring
        );
    }

    #[test]
    fn recurrence_inference_by_modal_gap() {
        assert_eq!(infer_recurrence(&instances_every(1, 5)), RecurrenceType::Daily);
        assert_eq!(infer_recurrence(&instances_every(7, 4)), RecurrenceType::Weekly);
        assert_eq!(infer_recurrence(&instances_every(30, 3)), RecurrenceType::Monthly);
        assert_eq!(infer_recurrence(&instances_every(365, 3)), RecurrenceType::Yearly);
        assert_eq!(infer_recurrence(&instances_every(3, 4)), RecurrenceType::Custom);
    }

    #[test]
    fn single_instance_has_no_recurrence() {
        assert_eq!(infer_recurrence(&instances_every(7, 1)), RecurrenceType::None);
        assert_eq!(infer_recurrence(&[]), RecurrenceType::None);
    }

    #[test]
    fn modal_gap_tolerates_an_outlier() {
        // Weekly series with one skipped week: gaps 7, 7, 14 → weekly.
        let tz = parse_timezone("UTC").unwrap();
        let base = parse_datetime("2025-03-01 11:00", tz).unwrap();
        let mut instances = Vec::new();
        for offset_days in [0, 7, 14, 28] {
            let offset = Duration::days(offset_days);
            instances.push(instance_at(
                ResolvedInstant {
                    local: base.local + offset,
                    utc: base.utc + offset,
                },
                Some(2),
            ));
        }
        assert_eq!(infer_recurrence(&instances), RecurrenceType::Weekly);
        // Guard against clock drift in the helper.
        assert!(instances[0].start.utc < Utc::now() + Duration::days(36_500));
    }
}
