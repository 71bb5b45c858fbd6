use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use eventscrape_common::types::ExportFormat;
use eventscrape_common::ValidationError;
use eventscrape_export::ExportParams;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Deserialize)]
pub struct ExportsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub format: String,
    #[serde(flatten)]
    pub params: ExportParams,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let exports = state.store.exports().list(limit).await?;
    Ok(Json(json!({ "exports": exports })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let export = state.store.exports().get(id).await?;
    Ok(Json(json!({ "export": export })))
}

/// Accepts the export and processes it in the background; the row reaches
/// `success`/`error` eventually.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExportPayload>,
) -> ApiResult<impl IntoResponse> {
    let format = payload
        .format
        .parse::<ExportFormat>()
        .map_err(|message| ApiError::Validation(ValidationError::field("format", message)))?;
    if format == ExportFormat::WpRest && payload.params.wordpress_settings_id.is_none() {
        return Err(ApiError::Validation(ValidationError::field(
            "wordpressSettingsId",
            "required for wp-rest exports",
        )));
    }

    let params_json = serde_json::to_value(&payload.params)
        .map_err(|e| ApiError::Validation(ValidationError::field("params", e.to_string())))?;
    let row = state.store.exports().create(format, params_json, None).await?;

    let engine = state.export_engine.clone();
    let export_id = row.id;
    tokio::spawn(async move {
        if let Err(e) = engine.run(export_id).await {
            error!(export_id = %export_id, error = %e, "Export task failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "export": row }))))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let cancelled = state.store.exports().cancel(id).await?;
    if !cancelled {
        return Err(ApiError::Conflict(format!("export {id} already finished")));
    }
    Ok(Json(json!({ "cancelled": true })))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let export = state.store.exports().get(id).await?;
    let Some(file_path) = &export.file_path else {
        return Err(ApiError::NotFound(format!("export {id} has no file artifact")));
    };
    let body = tokio::fs::read(file_path)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let (content_type, ext) = match export.format()? {
        ExportFormat::Csv => ("text/csv; charset=utf-8", "csv"),
        ExportFormat::Json => ("application/json", "json"),
        ExportFormat::Ics => ("text/calendar; charset=utf-8", "ics"),
        ExportFormat::WpRest => {
            return Err(ApiError::NotFound(format!("export {id} has no file artifact")))
        }
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"export-{id}.{ext}\""),
        )
        .body(Body::from(body))
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(response)
}
