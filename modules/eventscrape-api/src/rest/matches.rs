use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eventscrape_common::types::MatchStatus;
use eventscrape_common::ValidationError;
use eventscrape_match::MergePayload;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Deserialize)]
pub struct MatchesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MatchesQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<MatchStatus>())
        .transpose()
        .map_err(|message| ApiError::Validation(ValidationError::field("status", message)))?;
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let matches = state.store.matches().list(status, limit).await?;
    Ok(Json(json!({ "matches": matches })))
}

#[derive(Deserialize, Default)]
pub struct ActionPayload {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(flatten)]
    pub merge: MergePayload,
}

/// `confirm` / `reject` / `merge` on an open match. None of them touch the
/// raw events themselves.
pub async fn action(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(Uuid, String)>,
    payload: Option<Json<ActionPayload>>,
) -> ApiResult<impl IntoResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    match action.as_str() {
        "confirm" => {
            let row = state.match_engine.confirm(id, payload.actor.as_deref()).await?;
            Ok(Json(json!({ "match": row })))
        }
        "reject" => {
            let row = state.match_engine.reject(id, payload.actor.as_deref()).await?;
            Ok(Json(json!({ "match": row })))
        }
        "merge" => {
            let canonical_id = state
                .match_engine
                .merge(id, &payload.merge, payload.actor.as_deref())
                .await?;
            Ok(Json(json!({ "canonicalId": canonical_id })))
        }
        other => Err(ApiError::Validation(ValidationError::field(
            "action",
            format!("unknown action: {other}"),
        ))),
    }
}
