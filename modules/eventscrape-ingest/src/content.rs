//! Content-hash tuple composition.
//!
//! The raw hash covers everything a source edit can change, including the
//! resolved start/end instants; the series hash covers only the
//! occurrence-independent subset, so adding a date to a recurring series
//! does not dirty the series row.

use eventscrape_common::hash::{content_hash, series_content_hash};
use eventscrape_common::scraper::RawEvent;

pub fn raw_hash(event: &RawEvent, start_iso: &str, end_iso: &str) -> String {
    content_hash(&[
        &event.title,
        event.description_html.as_deref().unwrap_or(""),
        start_iso,
        end_iso,
        event.venue_name.as_deref().unwrap_or(""),
        event.venue_address.as_deref().unwrap_or(""),
        event.city.as_deref().unwrap_or(""),
        event.region.as_deref().unwrap_or(""),
        event.country.as_deref().unwrap_or(""),
        event.organizer.as_deref().unwrap_or(""),
        event.category.as_deref().unwrap_or(""),
        event.price.as_deref().unwrap_or(""),
        &event.url,
        event.image_url.as_deref().unwrap_or(""),
    ])
}

pub fn series_hash(event: &RawEvent) -> String {
    series_content_hash(&[
        &event.title,
        event.description_html.as_deref().unwrap_or(""),
        event.venue_name.as_deref().unwrap_or(""),
        event.venue_address.as_deref().unwrap_or(""),
        event.organizer.as_deref().unwrap_or(""),
        event.category.as_deref().unwrap_or(""),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RawEvent {
        RawEvent {
            title: "Winter Market".into(),
            description_html: Some("<p>Local vendors</p>".into()),
            start: "2025-02-10 09:00".into(),
            venue_name: Some("Civic Centre".into()),
            city: Some("Prince George".into()),
            url: "https://example.com/market".into(),
            ..Default::default()
        }
    }

    #[test]
    fn raw_hash_changes_with_title() {
        let a = raw_hash(&event(), "2025-02-10T17:00:00Z", "");
        let mut edited = event();
        edited.title = "Winter Market 2025".into();
        let b = raw_hash(&edited, "2025-02-10T17:00:00Z", "");
        assert_ne!(a, b);
    }

    #[test]
    fn raw_hash_changes_with_start() {
        let a = raw_hash(&event(), "2025-02-10T17:00:00Z", "");
        let b = raw_hash(&event(), "2025-02-11T17:00:00Z", "");
        assert_ne!(a, b);
    }

    #[test]
    fn series_hash_ignores_dates() {
        // Same event content on different dates hashes the same at series level.
        let a = series_hash(&event());
        let mut later = event();
        later.start = "2025-02-17 09:00".into();
        let b = series_hash(&later);
        assert_eq!(a, b);
    }

    #[test]
    fn series_hash_tracks_venue_edits() {
        let a = series_hash(&event());
        let mut moved = event();
        moved.venue_name = Some("Library Plaza".into());
        let b = series_hash(&moved);
        assert_ne!(a, b);
    }

    #[test]
    fn recomputing_from_same_fields_reproduces_hash() {
        let a = raw_hash(&event(), "2025-02-10T17:00:00Z", "");
        let b = raw_hash(&event(), "2025-02-10T17:00:00Z", "");
        assert_eq!(a, b);
    }
}
