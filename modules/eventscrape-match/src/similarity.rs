//! Pairwise similarity scoring.
//!
//! The contract: symmetric in its arguments, monotone in agreement, and
//! idempotent (identical inputs score 1.0 on every component that applies).
//! Weights are module constants pending empirical calibration.

use chrono::{DateTime, Utc};
use url::Url;

pub const TITLE_WEIGHT: f64 = 0.5;
pub const TIME_WEIGHT: f64 = 0.2;
pub const VENUE_WEIGHT: f64 = 0.2;
pub const URL_HOST_WEIGHT: f64 = 0.1;

/// Candidate window half-width.
pub const TIME_WINDOW_HOURS: i64 = 24;

/// Pairs at or above this score become open match proposals.
pub const SCORE_THRESHOLD: f64 = 0.7;

/// Lowercased word-token set Jaccard similarity.
fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> std::collections::HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    };
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

pub fn title_similarity(a: &str, b: &str) -> f64 {
    token_jaccard(a, b)
}

/// Linear decay over the candidate window: identical starts score 1.0,
/// 24 h apart scores 0.0.
pub fn time_proximity(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let delta_minutes = (a - b).num_minutes().abs() as f64;
    let window_minutes = (TIME_WINDOW_HOURS * 60) as f64;
    (1.0 - delta_minutes / window_minutes).max(0.0)
}

/// Venue-name similarity; neutral 0.5 when either side has no venue on
/// record, so missing data neither confirms nor refutes.
pub fn venue_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => token_jaccard(a, b),
        _ => 0.5,
    }
}

/// 1.0 when both event URLs resolve to the same host.
pub fn url_host_equality(a: &str, b: &str) -> f64 {
    let host = |u: &str| Url::parse(u).ok().and_then(|u| u.host_str().map(str::to_string));
    match (host(a), host(b)) {
        (Some(ha), Some(hb)) if ha == hb => 1.0,
        _ => 0.0,
    }
}

/// Component scores and their weighted combination.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub time: f64,
    pub venue: f64,
    pub url_host: f64,
    pub total: f64,
}

pub fn score_pair(
    title_a: &str,
    title_b: &str,
    start_a: DateTime<Utc>,
    start_b: DateTime<Utc>,
    venue_a: Option<&str>,
    venue_b: Option<&str>,
    url_a: &str,
    url_b: &str,
) -> ScoreBreakdown {
    let title = title_similarity(title_a, title_b);
    let time = time_proximity(start_a, start_b);
    let venue = venue_similarity(venue_a, venue_b);
    let url_host = url_host_equality(url_a, url_b);
    let total = TITLE_WEIGHT * title + TIME_WEIGHT * time + VENUE_WEIGHT * venue
        + URL_HOST_WEIGHT * url_host;
    ScoreBreakdown {
        title,
        time,
        venue,
        url_host,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identical_titles_score_one() {
        assert_eq!(title_similarity("Night Market", "Night Market"), 1.0);
        assert_eq!(title_similarity("Night Market", "NIGHT market"), 1.0);
    }

    #[test]
    fn disjoint_titles_score_zero() {
        assert_eq!(title_similarity("Night Market", "Jazz Concert"), 0.0);
    }

    #[test]
    fn title_similarity_is_symmetric() {
        let a = title_similarity("Downtown Night Market", "Night Market");
        let b = title_similarity("Night Market", "Downtown Night Market");
        assert_eq!(a, b);
        assert!(a > 0.0 && a < 1.0);
    }

    #[test]
    fn time_proximity_decays_linearly() {
        let base = Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap();
        assert_eq!(time_proximity(base, base), 1.0);
        let twelve_h = base + chrono::Duration::hours(12);
        assert!((time_proximity(base, twelve_h) - 0.5).abs() < 1e-9);
        let far = base + chrono::Duration::hours(48);
        assert_eq!(time_proximity(base, far), 0.0);
    }

    #[test]
    fn missing_venue_is_neutral() {
        assert_eq!(venue_similarity(None, Some("Civic Centre")), 0.5);
        assert_eq!(venue_similarity(None, None), 0.5);
        assert_eq!(venue_similarity(Some("Civic Centre"), Some("Civic Centre")), 1.0);
    }

    #[test]
    fn url_hosts_compare_by_host_only() {
        assert_eq!(
            url_host_equality("https://a.example/events/1", "https://a.example/other"),
            1.0
        );
        assert_eq!(
            url_host_equality("https://a.example/events/1", "https://b.example/events/1"),
            0.0
        );
        assert_eq!(url_host_equality("not a url", "https://a.example"), 0.0);
    }

    #[test]
    fn identical_events_clear_the_threshold() {
        let start = Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap();
        let breakdown = score_pair(
            "Winter Concert",
            "Winter Concert",
            start,
            start,
            Some("Civic Centre"),
            Some("Civic Centre"),
            "https://a.example/1",
            "https://b.example/1",
        );
        // Everything but URL host agrees: 0.5 + 0.2 + 0.2 = 0.9.
        assert!((breakdown.total - 0.9).abs() < 1e-9);
        assert!(breakdown.total >= SCORE_THRESHOLD);
    }

    #[test]
    fn unrelated_events_stay_below_threshold() {
        let start = Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap();
        let breakdown = score_pair(
            "Winter Concert",
            "Farmers Market",
            start,
            start + chrono::Duration::hours(20),
            Some("Civic Centre"),
            Some("Exhibition Grounds"),
            "https://a.example/1",
            "https://b.example/2",
        );
        assert!(breakdown.total < SCORE_THRESHOLD);
    }

    #[test]
    fn score_is_monotone_in_agreement() {
        let start = Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap();
        let weaker = score_pair(
            "Winter Concert",
            "Winter Concert Series",
            start,
            start,
            None,
            None,
            "https://a.example/1",
            "https://b.example/2",
        );
        let stronger = score_pair(
            "Winter Concert",
            "Winter Concert",
            start,
            start,
            None,
            None,
            "https://a.example/1",
            "https://b.example/2",
        );
        assert!(stronger.total > weaker.total);
    }
}
