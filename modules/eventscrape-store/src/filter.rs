//! The export/listing filter over events, compiled onto a sqlx QueryBuilder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Filter shape shared by the export engine and the events API. An empty
/// filter selects the full event set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<Uuid>,
    /// Filters raw events through their series' event_status
    /// (scheduled / canceled / postponed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl EventFilter {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none()
            && self.end_date.is_none()
            && self.city.is_none()
            && self.category.is_none()
            && self.source_ids.is_empty()
            && self.ids.is_empty()
            && self.status.is_none()
    }

    /// Append `AND …` conditions for every set field. The builder already
    /// holds `… WHERE 1=1`.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(start) = self.start_date {
            qb.push(" AND start_datetime >= ").push_bind(start);
        }
        if let Some(end) = self.end_date {
            qb.push(" AND start_datetime <= ").push_bind(end);
        }
        if let Some(city) = &self.city {
            qb.push(" AND lower(city) = lower(").push_bind(city.clone()).push(")");
        }
        if let Some(category) = &self.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if !self.source_ids.is_empty() {
            qb.push(" AND source_id = ANY(").push_bind(self.source_ids.clone()).push(")");
        }
        if !self.ids.is_empty() {
            qb.push(" AND id = ANY(").push_bind(self.ids.clone()).push(")");
        }
        if let Some(status) = &self.status {
            qb.push(" AND series_id IN (SELECT id FROM event_series WHERE event_status = ")
                .push_bind(status.clone())
                .push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(filter: &EventFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM events_raw WHERE 1=1");
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY start_datetime ASC");
        qb.sql().to_string()
    }

    #[test]
    fn empty_filter_selects_everything() {
        let filter = EventFilter::default();
        assert!(filter.is_empty());
        let sql = rendered(&filter);
        assert_eq!(sql, "SELECT * FROM events_raw WHERE 1=1 ORDER BY start_datetime ASC");
    }

    #[test]
    fn all_fields_compile_to_conditions() {
        let filter = EventFilter {
            start_date: Some(Utc::now()),
            end_date: Some(Utc::now()),
            city: Some("Vancouver".into()),
            category: Some("music".into()),
            source_ids: vec![Uuid::new_v4()],
            ids: vec![Uuid::new_v4()],
            status: Some("scheduled".into()),
        };
        let sql = rendered(&filter);
        assert!(sql.contains("start_datetime >= "));
        assert!(sql.contains("start_datetime <= "));
        assert!(sql.contains("lower(city) = lower("));
        assert!(sql.contains("category = "));
        assert!(sql.contains("source_id = ANY("));
        assert!(sql.contains("id = ANY("));
        assert!(sql.contains("event_status = "));
    }

    #[test]
    fn filter_deserializes_from_camel_case() {
        let json = serde_json::json!({
            "startDate": "2025-02-01T00:00:00Z",
            "city": "Prince George",
            "sourceIds": [Uuid::new_v4()],
        });
        let filter: EventFilter = serde_json::from_value(json).unwrap();
        assert!(filter.start_date.is_some());
        assert_eq!(filter.city.as_deref(), Some("Prince George"));
        assert_eq!(filter.source_ids.len(), 1);
    }
}
