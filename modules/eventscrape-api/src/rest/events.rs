use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eventscrape_store::EventFilter;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub source_id: Option<Uuid>,
    pub status: Option<String>,
}

impl EventsQuery {
    fn into_filter(self) -> EventFilter {
        EventFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            city: self.city,
            category: self.category,
            source_ids: self.source_id.into_iter().collect(),
            ids: Vec::new(),
            status: self.status,
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    let events = state.store.events().list_raw(&query.into_filter()).await?;
    let views: Vec<eventscrape_export::ExportRecord> =
        events.iter().map(eventscrape_export::ExportRecord::from).collect();
    Ok(Json(json!({ "events": views })))
}

/// Promote an unmatched raw event straight into a canonical row.
pub async fn promote(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let canonical_id = state.match_engine.promote_raw(raw_id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "canonicalId": canonical_id }))))
}

#[derive(Deserialize)]
pub struct StaleQuery {
    /// Occurrences not re-seen in this many days (default 14).
    pub days: Option<i64>,
}

/// Occurrences a re-scrape stopped refreshing — dates that disappeared from
/// their source.
pub async fn stale_occurrences(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaleQuery>,
) -> ApiResult<impl IntoResponse> {
    let days = query.days.unwrap_or(14).clamp(1, 365);
    let cutoff = Utc::now() - Duration::days(days);
    let occurrences = state.store.events().occurrences_unseen_since(cutoff).await?;
    let views: Vec<serde_json::Value> = occurrences
        .iter()
        .map(|o| {
            json!({
                "id": o.id,
                "seriesId": o.series_id,
                "occurrenceHash": o.occurrence_hash,
                "startDatetimeUtc": o.start_datetime_utc,
                "lastSeenAt": o.last_seen_at,
            })
        })
        .collect();
    Ok(Json(json!({ "occurrences": views })))
}
