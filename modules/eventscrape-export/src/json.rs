//! JSON encoding: either a canonical object per event, or headers mapped
//! through the user's field map.

use serde_json::{json, Value};

use crate::record::{ExportRecord, FieldMapEntry};

pub fn encode_json(records: &[ExportRecord], field_map: Option<&[FieldMapEntry]>) -> String {
    let events: Vec<Value> = match field_map {
        Some(map) => records
            .iter()
            .map(|record| {
                let mut obj = serde_json::Map::new();
                for entry in map {
                    obj.insert(
                        entry.header.clone(),
                        Value::String(record.value_for_key(&entry.key)),
                    );
                }
                Value::Object(obj)
            })
            .collect(),
        None => records
            .iter()
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
            .collect(),
    };

    serde_json::to_string_pretty(&json!({ "events": events })).unwrap_or_else(|_| "{}".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record() -> ExportRecord {
        ExportRecord {
            id: "e1".into(),
            title: "Concert".into(),
            description: None,
            start: Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap(),
            end: None,
            timezone: "UTC".into(),
            venue_name: Some("Civic Centre".into()),
            venue_address: None,
            city: None,
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
    fn canonical_object_uses_documented_field_names() {
        let out = encode_json(&[record()], None);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let event = &parsed["events"][0];
        assert_eq!(event["id"], "e1");
        assert_eq!(event["title"], "Concert");
        assert_eq!(event["venueName"], "Civic Centre");
        assert_eq!(event["timezone"], "UTC");
        // Instagram meta is omitted when absent.
        assert!(event.get("instagramPostId").is_none());
    }

    #[test]
    fn field_map_renames_properties() {
        let map = vec![
            FieldMapEntry { key: "title".into(), header: "Event Name".into() },
            FieldMapEntry { key: "venueName".into(), header: "Where".into() },
        ];
        let out = encode_json(&[record()], Some(&map));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let event = &parsed["events"][0];
        assert_eq!(event["Event Name"], "Concert");
        assert_eq!(event["Where"], "Civic Centre");
        assert!(event.get("title").is_none());
    }

    #[test]
    fn empty_input_yields_empty_events_array() {
        let out = encode_json(&[], None);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["events"].as_array().unwrap().len(), 0);
    }
}
