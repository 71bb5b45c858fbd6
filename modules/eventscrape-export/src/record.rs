//! The exportable view of an event, decoupled from storage rows so encoders
//! stay pure and testable.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use eventscrape_store::RawEventRow;

/// One event headed for an export artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub timezone: String,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub organizer: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_caption: Option<String>,
    #[serde(skip)]
    pub series_id: Option<uuid::Uuid>,
    #[serde(skip)]
    pub source_id: Option<uuid::Uuid>,
}

impl From<&RawEventRow> for ExportRecord {
    fn from(row: &RawEventRow) -> Self {
        Self {
            id: row.id.to_string(),
            title: row.title.clone(),
            description: row.description.clone(),
            start: row.start_datetime,
            end: row.end_datetime,
            timezone: row.timezone.clone(),
            venue_name: row.venue_name.clone(),
            venue_address: row.venue_address.clone(),
            city: row.city.clone(),
            region: row.region.clone(),
            country: row.country.clone(),
            organizer: row.organizer.clone(),
            category: row.category.clone(),
            price: row.price.clone(),
            url: Some(row.url.clone()),
            image_url: row.image_url.clone(),
            instagram_post_id: row.instagram_post_id.clone(),
            instagram_caption: row.instagram_caption.clone(),
            series_id: row.series_id,
            source_id: Some(row.source_id),
        }
    }
}

impl ExportRecord {
    /// Value for a logical field key, as used by CSV/JSON field maps.
    /// Unknown keys resolve to empty.
    pub fn value_for_key(&self, key: &str) -> String {
        match key {
            "id" => self.id.clone(),
            "title" => self.title.clone(),
            "description" => self.description.clone().unwrap_or_default(),
            "start" => self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            "end" => self
                .end
                .map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            "timezone" => self.timezone.clone(),
            "venueName" => self.venue_name.clone().unwrap_or_default(),
            "venueAddress" => self.venue_address.clone().unwrap_or_default(),
            "city" => self.city.clone().unwrap_or_default(),
            "region" => self.region.clone().unwrap_or_default(),
            "country" => self.country.clone().unwrap_or_default(),
            "organizer" => self.organizer.clone().unwrap_or_default(),
            "category" => self.category.clone().unwrap_or_default(),
            "price" => self.price.clone().unwrap_or_default(),
            "url" => self.url.clone().unwrap_or_default(),
            "imageUrl" => self.image_url.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// One column of a user-supplied field map, in output order.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct FieldMapEntry {
    /// Logical field key, e.g. `venueName`.
    pub key: String,
    /// Column header / JSON property to emit.
    pub header: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> ExportRecord {
        ExportRecord {
            id: "abc".into(),
            title: "Concert".into(),
            description: None,
            start: Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap(),
            end: None,
            timezone: "America/Vancouver".into(),
            venue_name: Some("Civic Centre".into()),
            venue_address: None,
            city: Some("Prince George".into()),
            region: None,
            country: None,
            organizer: None,
            category: None,
            price: None,
            url: Some("https://example.com".into()),
            image_url: None,
            instagram_post_id: None,
            instagram_caption: None,
            series_id: None,
            source_id: None,
        }
    }

    #[test]
    fn known_keys_resolve() {
        let r = record();
        assert_eq!(r.value_for_key("title"), "Concert");
        assert_eq!(r.value_for_key("start"), "2025-02-10T19:00:00Z");
        assert_eq!(r.value_for_key("venueName"), "Civic Centre");
    }

    #[test]
    fn missing_and_unknown_keys_are_empty() {
        let r = record();
        assert_eq!(r.value_for_key("end"), "");
        assert_eq!(r.value_for_key("organizer"), "");
        assert_eq!(r.value_for_key("nonsense"), "");
    }
}
