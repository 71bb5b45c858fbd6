//! HTTP error mapping. Handlers return `ApiResult<T>`; the conversion to a
//! response picks the status and a structured JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use eventscrape_common::ValidationError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(anyhow::Error),
}

impl From<eventscrape_store::StoreError> for ApiError {
    fn from(e: eventscrape_store::StoreError) -> Self {
        use eventscrape_store::StoreError;
        match e {
            StoreError::NotFound { entity, id } => ApiError::NotFound(format!("{entity} {id}")),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<eventscrape_queue::QueueError> for ApiError {
    fn from(e: eventscrape_queue::QueueError) -> Self {
        use eventscrape_queue::QueueError;
        match e {
            QueueError::InvalidCron { expr, message } => {
                ApiError::Validation(ValidationError::field("cron", format!("{expr}: {message}")))
            }
            QueueError::InvalidTimezone(tz) => {
                ApiError::Validation(ValidationError::field("timezone", format!("unknown zone: {tz}")))
            }
            QueueError::JobNotFound(id) => ApiError::NotFound(format!("job {id}")),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<eventscrape_scheduler::SchedulerError> for ApiError {
    fn from(e: eventscrape_scheduler::SchedulerError) -> Self {
        use eventscrape_scheduler::SchedulerError;
        match e {
            SchedulerError::Store(inner) => inner.into(),
            SchedulerError::Queue(inner) => inner.into(),
            SchedulerError::MissingSource(id) => {
                ApiError::Validation(ValidationError::field("source_id", format!("schedule {id} has no source")))
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<eventscrape_match::MatchError> for ApiError {
    fn from(e: eventscrape_match::MatchError) -> Self {
        use eventscrape_match::MatchError;
        match e {
            MatchError::Store(inner) => inner.into(),
            MatchError::NotOpen(id) => ApiError::Conflict(format!("match {id} is not open")),
        }
    }
}

impl From<eventscrape_export::ExportError> for ApiError {
    fn from(e: eventscrape_export::ExportError) -> Self {
        use eventscrape_export::ExportError;
        match e {
            ExportError::Store(inner) => inner.into(),
            ExportError::InvalidParams(message) => {
                ApiError::Validation(ValidationError::field("params", message))
            }
            ExportError::MissingWordPressSettings => ApiError::Validation(ValidationError::field(
                "wordpressSettingsId",
                "required for wp-rest exports",
            )),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "validation_failed", "details": err.details })),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found", "message": what })),
            )
                .into_response(),
            ApiError::Conflict(message) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "conflict", "message": message })),
            )
                .into_response(),
            ApiError::Internal(source) => {
                warn!(error = %source, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal" })),
                )
                    .into_response()
            }
        }
    }
}
