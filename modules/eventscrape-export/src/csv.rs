//! CSV encoding with user-supplied column mapping.
//!
//! Quoting: a value is wrapped in double quotes iff it contains a comma,
//! a quote, or a newline; embedded quotes double. LF line endings.

use crate::record::{ExportRecord, FieldMapEntry};

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn encode_csv(records: &[ExportRecord], field_map: &[FieldMapEntry]) -> String {
    let mut out = String::new();

    let header: Vec<String> = field_map.iter().map(|f| escape_field(&f.header)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for record in records {
        let row: Vec<String> = field_map
            .iter()
            .map(|f| escape_field(&record.value_for_key(&f.key)))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// The columns used when no field map is supplied.
pub fn default_field_map() -> Vec<FieldMapEntry> {
    [
        ("id", "ID"),
        ("title", "Title"),
        ("description", "Description"),
        ("start", "Start"),
        ("end", "End"),
        ("timezone", "Timezone"),
        ("venueName", "Venue"),
        ("venueAddress", "Address"),
        ("city", "City"),
        ("region", "Region"),
        ("country", "Country"),
        ("organizer", "Organizer"),
        ("category", "Category"),
        ("price", "Price"),
        ("url", "URL"),
        ("imageUrl", "Image URL"),
    ]
    .into_iter()
    .map(|(key, header)| FieldMapEntry {
        key: key.to_string(),
        header: header.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(title: &str) -> ExportRecord {
        ExportRecord {
            id: "e1".into(),
            title: title.into(),
            description: None,
            start: Utc.with_ymd_and_hms(2025, 2, 10, 19, 0, 0).unwrap(),
            end: None,
            timezone: "UTC".into(),
            venue_name: None,
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

    fn map(entries: &[(&str, &str)]) -> Vec<FieldMapEntry> {
        entries
            .iter()
            .map(|(k, h)| FieldMapEntry {
                key: k.to_string(),
                header: h.to_string(),
            })
            .collect()
    }

    #[test]
    fn header_row_comes_first() {
        let csv = encode_csv(&[], &map(&[("title", "Title"), ("city", "City")]));
        assert_eq!(csv, "Title,City\n");
    }

    #[test]
    fn plain_values_are_not_quoted() {
        let csv = encode_csv(&[record("Concert")], &map(&[("title", "Title"), ("city", "City")]));
        assert_eq!(csv, "Title,City\nConcert,Prince George\n");
    }

    #[test]
    fn commas_quotes_and_newlines_force_quoting() {
        let csv = encode_csv(
            &[record("Dinner, \"Jazz\"\nNight")],
            &map(&[("title", "Title")]),
        );
        assert_eq!(csv, "Title\n\"Dinner, \"\"Jazz\"\"\nNight\"\n");
    }

    #[test]
    fn round_trip_preserves_values() {
        // Minimal CSV parser for the quoting rules we emit.
        fn parse_line(line: &str) -> Vec<String> {
            let mut fields = Vec::new();
            let mut chars = line.chars().peekable();
            loop {
                let mut field = String::new();
                if chars.peek() == Some(&'"') {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '"' {
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                field.push('"');
                            } else {
                                break;
                            }
                        } else {
                            field.push(c);
                        }
                    }
                    chars.next(); // trailing comma, if any
                } else {
                    for c in chars.by_ref() {
                        if c == ',' {
                            break;
                        }
                        field.push(c);
                    }
                }
                fields.push(field);
                if chars.peek().is_none() {
                    break;
                }
            }
            fields
        }

        let original = record("Dinner, \"Jazz\" Night");
        let csv = encode_csv(
            &[original.clone()],
            &map(&[("title", "Title"), ("url", "URL")]),
        );
        let lines: Vec<&str> = csv.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 2);
        let parsed = parse_line(lines[1]);
        assert_eq!(parsed[0], "Dinner, \"Jazz\" Night");
        assert_eq!(parsed[1], "https://example.com");
    }

    #[test]
    fn default_field_map_covers_standard_fields() {
        let fields = default_field_map();
        assert!(fields.iter().any(|f| f.key == "title"));
        assert!(fields.iter().any(|f| f.key == "imageUrl"));
        assert_eq!(fields.first().map(|f| f.key.as_str()), Some("id"));
    }
}
