//! Run log endpoints: historical JSON and live SSE tail.
//!
//! The SSE stream sends a `connected` event, replays up to 1,000 historical
//! entries, then long-polls the stream store in 5-second blocks. A comment
//! heartbeat every 15 seconds keeps proxies from reaping idle streams. The
//! dedicated stream-store connection is dropped with the stream when the
//! client goes away.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const REPLAY_LIMIT: usize = 1_000;
const HEARTBEAT_SECS: u64 = 15;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub start: Option<String>,
    pub end: Option<String>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(500).min(2_000);
    let entries = state
        .logs
        .history(run_id, query.start.as_deref(), query.end.as_deref(), limit)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(json!({ "logs": entries })))
}

pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let logs = state.logs.clone();

    let stream = async_stream::stream! {
        yield Ok(Event::default().json_data(json!({ "type": "connected" })).unwrap_or_default());

        // Replay history first, tracking the cursor so the tail picks up
        // exactly where the replay stopped.
        let mut cursor: Option<String> = None;
        match logs.history(run_id, None, None, REPLAY_LIMIT).await {
            Ok(entries) => {
                for entry in entries {
                    cursor = Some(entry.id.clone());
                    if let Ok(event) = Event::default().event("log").json_data(&entry) {
                        yield Ok(event);
                    }
                }
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Log replay failed");
                yield Ok(Event::default()
                    .event("error")
                    .json_data(json!({ "message": "replay failed" }))
                    .unwrap_or_default());
                return;
            }
        }

        let mut tail = match logs.tail(run_id, cursor).await {
            Ok(tail) => tail,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Log tail open failed");
                return;
            }
        };
        debug!(run_id = %run_id, cursor = tail.cursor(), "Log tail started");

        loop {
            match tail.next_batch().await {
                Ok(entries) => {
                    for entry in entries {
                        if let Ok(event) = Event::default().event("log").json_data(&entry) {
                            yield Ok(event);
                        }
                    }
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Log tail read failed, closing stream");
                    return;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(HEARTBEAT_SECS))
            .text("heartbeat"),
    )
}
