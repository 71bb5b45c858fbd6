use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use eventscrape_common::types::{ClassificationMode, InstagramScraperType, SourceType};
use eventscrape_common::ValidationError;
use eventscrape_store::sources::SourceInput;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePayload {
    pub name: String,
    pub base_url: String,
    pub module_key: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub default_timezone: Option<String>,
    #[serde(default)]
    pub rate_limit_per_min: Option<i32>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub instagram_username: Option<String>,
    #[serde(default)]
    pub classification_mode: Option<String>,
    #[serde(default)]
    pub instagram_scraper_type: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SourcePayload {
    /// The explicit parse step: every enum field and cross-field rule is
    /// checked before anything touches the store.
    fn parse(self) -> Result<SourceInput, ValidationError> {
        let mut err = ValidationError::new();

        if self.name.trim().is_empty() {
            err.push("name", "must not be empty");
        }
        if self.module_key.trim().is_empty() {
            err.push("moduleKey", "must not be empty");
        }

        let source_type = match self.source_type.as_deref().unwrap_or("website").parse::<SourceType>() {
            Ok(t) => t,
            Err(message) => {
                err.push("sourceType", message);
                SourceType::Website
            }
        };

        let classification_mode = match self.classification_mode.as_deref() {
            Some(raw) => match raw.parse::<ClassificationMode>() {
                Ok(m) => Some(m),
                Err(message) => {
                    err.push("classificationMode", message);
                    None
                }
            },
            None => None,
        };

        let instagram_scraper_type = match self.instagram_scraper_type.as_deref() {
            Some(raw) => match raw.parse::<InstagramScraperType>() {
                Ok(t) => Some(t),
                Err(message) => {
                    err.push("instagramScraperType", message);
                    None
                }
            },
            None => None,
        };

        if source_type == SourceType::Instagram && self.instagram_username.is_none() {
            err.push("instagramUsername", "required for instagram sources");
        }

        let timezone = self.default_timezone.unwrap_or_else(|| "UTC".to_string());
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            err.push("defaultTimezone", format!("unknown zone: {timezone}"));
        }

        err.into_result()?;
        Ok(SourceInput {
            name: self.name.trim().to_string(),
            base_url: self.base_url,
            module_key: self.module_key.trim().to_string(),
            active: self.active,
            default_timezone: timezone,
            rate_limit_per_min: self.rate_limit_per_min,
            source_type,
            instagram_username: self.instagram_username,
            classification_mode,
            instagram_scraper_type,
        })
    }
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let sources = state.store.sources().list().await?;
    Ok(Json(serde_json::json!({ "sources": sources })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let source = state.store.sources().get(id).await?;
    Ok(Json(serde_json::json!({ "source": source })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SourcePayload>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.parse()?;
    let source = state.store.sources().create(&input).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "source": source }))))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SourcePayload>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.parse()?;
    let source = state.store.sources().update(id, &input).await?;
    Ok(Json(serde_json::json!({ "source": source })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.store.sources().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
