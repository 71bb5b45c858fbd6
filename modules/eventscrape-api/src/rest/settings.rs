use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eventscrape_common::types::InstagramScraperType;
use eventscrape_common::ValidationError;
use eventscrape_store::settings::WordPressSettingsInput;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordPressPayload {
    pub name: String,
    pub site_url: String,
    pub username: String,
    pub app_password: String,
    #[serde(default)]
    pub default_status: Option<String>,
    #[serde(default)]
    pub source_category_mappings: Option<serde_json::Value>,
}

impl WordPressPayload {
    fn parse(self) -> Result<WordPressSettingsInput, ValidationError> {
        let mut err = ValidationError::new();
        if self.name.trim().is_empty() {
            err.push("name", "must not be empty");
        }
        if !self.site_url.starts_with("http://") && !self.site_url.starts_with("https://") {
            err.push("siteUrl", "must be an http(s) URL");
        }
        if self.username.trim().is_empty() {
            err.push("username", "must not be empty");
        }
        if self.app_password.trim().is_empty() {
            err.push("appPassword", "must not be empty");
        }
        err.into_result()?;
        Ok(WordPressSettingsInput {
            name: self.name,
            site_url: self.site_url,
            username: self.username,
            app_password: self.app_password,
            default_status: self.default_status.unwrap_or_else(|| "draft".to_string()),
            source_category_mappings: self
                .source_category_mappings
                .unwrap_or_else(|| json!({})),
        })
    }
}

pub async fn list_wordpress(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let settings = state.store.settings().list_wordpress().await?;
    Ok(Json(json!({ "wordpressSettings": settings })))
}

pub async fn create_wordpress(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WordPressPayload>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.parse()?;
    let row = state.store.settings().create_wordpress(&input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "wordpressSettings": row }))))
}

pub async fn update_wordpress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WordPressPayload>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.parse()?;
    let row = state.store.settings().update_wordpress(id, &input).await?;
    Ok(Json(json!({ "wordpressSettings": row })))
}

pub async fn delete_wordpress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.store.settings().delete_wordpress(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_system(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let settings = state.store.settings().system().await?;
    Ok(Json(json!({ "settings": settings })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPayload {
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub ai_api_key: Option<String>,
    #[serde(default)]
    pub instagram_scraper_type: Option<String>,
    #[serde(default = "default_true")]
    pub instagram_allow_source_override: bool,
    #[serde(default)]
    pub feature_flags: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

pub async fn update_system(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SystemPayload>,
) -> ApiResult<impl IntoResponse> {
    let scraper_type = payload
        .instagram_scraper_type
        .as_deref()
        .unwrap_or("apify")
        .parse::<InstagramScraperType>()
        .map_err(|message| {
            ApiError::Validation(ValidationError::field("instagramScraperType", message))
        })?;
    let settings = state
        .store
        .settings()
        .update_system(
            payload.ai_provider.as_deref(),
            payload.ai_api_key.as_deref(),
            scraper_type,
            payload.instagram_allow_source_override,
            payload.feature_flags.unwrap_or_else(|| json!({})),
        )
        .await?;
    Ok(Json(json!({ "settings": settings })))
}
