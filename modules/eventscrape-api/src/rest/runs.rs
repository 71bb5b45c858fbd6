use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eventscrape_common::scraper::{MatchJobData, ScrapeJobData};
use eventscrape_queue::{CancelState, JobOptions, INSTAGRAM_SCRAPE_QUEUE, MATCH_QUEUE, SCRAPE_QUEUE};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Deserialize)]
pub struct RunsQuery {
    pub source_id: Option<Uuid>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let runs = state.store.runs().list(params.source_id, limit).await?;
    Ok(Json(json!({ "runs": runs })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let run = state.store.runs().get(id).await?;
    let children = state.store.runs().children(id).await?;
    Ok(Json(json!({ "run": run, "children": children })))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdHocScrapePayload {
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub scrape_mode: Option<String>,
    #[serde(default)]
    pub pagination_options: Option<serde_json::Value>,
}

/// Enqueue a one-off scrape for a module key; creates the run row.
pub async fn scrape_now(
    State(state): State<Arc<AppState>>,
    Path(module_key): Path<String>,
    payload: Option<Json<AdHocScrapePayload>>,
) -> ApiResult<impl IntoResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let source = state.store.sources().get_by_module_key(&module_key).await?;
    if !source.active {
        return Err(ApiError::Conflict(format!("source {} is inactive", source.name)));
    }

    let run = state.store.runs().create(Some(source.id), None, None).await?;
    let data = ScrapeJobData {
        source_id: source.id,
        run_id: run.id,
        module_key: source.module_key.clone(),
        source_name: source.name.clone(),
        test_mode: payload.test_mode,
        scrape_mode: payload
            .scrape_mode
            .as_deref()
            .and_then(|m| m.parse().ok())
            .unwrap_or_default(),
        pagination_options: payload.pagination_options,
        uploaded_file: None,
    };
    let job_id = state
        .queue
        .enqueue(
            &SCRAPE_QUEUE,
            "scrape",
            serde_json::to_value(&data).unwrap_or_default(),
            JobOptions::default(),
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run": run, "jobId": job_id })),
    ))
}

/// Kick a match pass over a window.
pub async fn generate_matches(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<MatchJobData>>,
) -> ApiResult<impl IntoResponse> {
    let data = payload.map(|Json(p)| p).unwrap_or_default();
    let job_id = state
        .queue
        .enqueue(
            &MATCH_QUEUE,
            "match",
            serde_json::to_value(&data).unwrap_or_default(),
            JobOptions::default(),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

/// Cancel an Instagram scrape job: queued jobs are removed outright, active
/// jobs get the cooperative flag and finalize at their next safe point.
pub async fn cancel_instagram_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .queue
        .remove_waiting(INSTAGRAM_SCRAPE_QUEUE.name, &job_id)
        .await?;
    let flag_state = if removed {
        CancelState::Cancelled
    } else {
        CancelState::Requested
    };
    state
        .flags
        .set(INSTAGRAM_SCRAPE_QUEUE.name, &job_id, flag_state)
        .await?;
    Ok(Json(json!({ "jobId": job_id, "removed": removed, "cancel": flag_state })))
}

/// Pause or resume a named queue. Paused queues hold waiting jobs; active
/// jobs drain normally.
pub async fn set_queue_paused(
    State(state): State<Arc<AppState>>,
    Path((queue_name, action)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let Some(spec) = eventscrape_queue::spec_for_queue(&queue_name) else {
        return Err(ApiError::NotFound(format!("queue {queue_name}")));
    };
    match action.as_str() {
        "pause" => state.queue.pause(spec.name).await?,
        "resume" => state.queue.resume(spec.name).await?,
        other => {
            return Err(ApiError::Validation(
                eventscrape_common::ValidationError::field(
                    "action",
                    format!("unknown action: {other}"),
                ),
            ))
        }
    }
    Ok(Json(json!({ "queue": spec.name, "action": action })))
}

/// Job state, folding the cancel flag in: a cancelled job reports
/// `cancelled` even after the queue has forgotten it.
pub async fn instagram_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let flag = state.flags.get(INSTAGRAM_SCRAPE_QUEUE.name, &job_id).await?;
    if matches!(flag, Some(CancelState::Cancelled)) {
        return Ok(Json(json!({ "jobId": job_id, "state": "cancelled" })));
    }
    let job_state = state
        .queue
        .get_state(INSTAGRAM_SCRAPE_QUEUE.name, &job_id)
        .await?;
    Ok(Json(json!({ "jobId": job_id, "state": job_state })))
}
