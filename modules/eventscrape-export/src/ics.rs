//! iCalendar encoding, RFC 5545 minimal profile.
//!
//! CRLF line endings throughout. Times in UTC basic format. DTEND defaults
//! to DTSTART + 1 h when the event has no end. Blank fields are omitted
//! rather than written empty.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::record::ExportRecord;

const PRODID: &str = "-//EventScrape//EventScrape//EN";
const UID_DOMAIN: &str = "eventscrape.com";

/// `\`, `,`, `;` escape with a backslash; newlines become literal `\n`.
fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn strip_html(value: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap_or_else(|_| unreachable!()));
    re.replace_all(value, "").trim().to_string()
}

/// UTC basic format: `YYYYMMDDTHHMMSSZ`.
fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn encode_ics(records: &[ExportRecord]) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".into(),
    ];

    for record in records {
        let end = record.end.unwrap_or(record.start + Duration::hours(1));
        lines.push("BEGIN:VEVENT".into());
        lines.push(format!("UID:{}@{UID_DOMAIN}", record.id));
        lines.push(format!("DTSTART:{}", format_utc(record.start)));
        lines.push(format!("DTEND:{}", format_utc(end)));
        lines.push(format!("SUMMARY:{}", escape_text(&record.title)));
        if let Some(description) = &record.description {
            let stripped = strip_html(description);
            if !stripped.is_empty() {
                lines.push(format!("DESCRIPTION:{}", escape_text(&stripped)));
            }
        }
        if let Some(venue) = &record.venue_name {
            if !venue.is_empty() {
                lines.push(format!("LOCATION:{}", escape_text(venue)));
            }
        }
        if let Some(url) = &record.url {
            if !url.is_empty() {
                lines.push(format!("URL:{url}"));
            }
        }
        lines.push("END:VEVENT".into());
    }

    lines.push("END:VCALENDAR".into());
    lines.join("\r\n") + "\r\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, end: Option<DateTime<Utc>>) -> ExportRecord {
        ExportRecord {
            id: id.into(),
            title: "Concert; with, specials\\".into(),
            description: Some("<p>Line one</p>\nLine two".into()),
            start: Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap(),
            end,
            timezone: "UTC".into(),
            venue_name: Some("Civic Centre".into()),
            venue_address: None,
            city: None,
            region: None,
            country: None,
            organizer: None,
            category: None,
            price: None,
            url: Some("https://example.com/1".into()),
            image_url: None,
            instagram_post_id: None,
            instagram_caption: None,
            series_id: None,
            source_id: None,
        }
    }

    #[test]
    fn calendar_envelope_and_crlf() {
        let ics = encode_ics(&[]);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("VERSION:2.0\r\n"));
        assert!(ics.contains("PRODID:-//EventScrape//EventScrape//EN\r\n"));
        assert!(ics.contains("CALSCALE:GREGORIAN\r\n"));
        // No bare LFs.
        assert!(!ics.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn every_vevent_has_a_uid() {
        let ics = encode_ics(&[record("e1", None), record("e2", None)]);
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("UID:e1@eventscrape.com"));
        assert!(ics.contains("UID:e2@eventscrape.com"));
    }

    #[test]
    fn missing_end_defaults_to_start_plus_one_hour() {
        let ics = encode_ics(&[record("e1", None)]);
        assert!(ics.contains("DTSTART:20250210T190000Z"));
        assert!(ics.contains("DTEND:20250210T200000Z"));
    }

    #[test]
    fn explicit_end_is_kept() {
        let end = Utc.with_ymd_and_hms(2025, 2, 10, 22, 30, 0).unwrap();
        let ics = encode_ics(&[record("e1", Some(end))]);
        assert!(ics.contains("DTEND:20250210T223000Z"));
    }

    #[test]
    fn text_is_escaped() {
        let ics = encode_ics(&[record("e1", None)]);
        assert!(ics.contains("SUMMARY:Concert\\; with\\, specials\\\\\r\n"));
    }

    #[test]
    fn description_is_html_stripped_and_newline_escaped() {
        let ics = encode_ics(&[record("e1", None)]);
        assert!(ics.contains("DESCRIPTION:Line one\\nLine two\r\n"));
        assert!(!ics.contains("<p>"));
    }

    #[test]
    fn blank_fields_are_omitted() {
        let mut r = record("e1", None);
        r.description = None;
        r.venue_name = None;
        r.url = None;
        let ics = encode_ics(&[r]);
        assert!(!ics.contains("DESCRIPTION"));
        assert!(!ics.contains("LOCATION"));
        assert!(!ics.contains("URL:"));
    }
}
