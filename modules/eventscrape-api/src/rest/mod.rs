pub mod events;
pub mod exports;
pub mod logs;
pub mod matches;
pub mod runs;
pub mod schedules;
pub mod settings;
pub mod sources;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::AppState;

/// DB probe; load balancers poll this.
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    state.store.ping().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
