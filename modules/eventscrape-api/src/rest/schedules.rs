use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eventscrape_common::types::{ScheduleConfig, ScheduleType};
use eventscrape_common::ValidationError;
use eventscrape_queue::normalize_cron;
use eventscrape_store::schedules::ScheduleInput;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    pub schedule_type: String,
    #[serde(default)]
    pub source_id: Option<Uuid>,
    #[serde(default)]
    pub wordpress_settings_id: Option<Uuid>,
    pub cron: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl SchedulePayload {
    fn parse(self) -> Result<ScheduleInput, ValidationError> {
        let mut err = ValidationError::new();

        let schedule_type = match self.schedule_type.parse::<ScheduleType>() {
            Ok(t) => Some(t),
            Err(message) => {
                err.push("scheduleType", message);
                None
            }
        };

        if normalize_cron(&self.cron).is_err() {
            err.push("cron", "must be a valid 5-field cron expression");
        }

        let timezone = self.timezone.unwrap_or_else(|| "UTC".to_string());
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            err.push("timezone", format!("unknown zone: {timezone}"));
        }

        // The config variant must agree with the discriminator.
        let config = match (schedule_type, self.config) {
            (Some(t), Some(raw)) => match serde_json::from_value::<ScheduleConfig>(raw) {
                Ok(config) => {
                    if config_kind(&config) != t {
                        err.push("config", format!("kind does not match scheduleType {t}"));
                        None
                    } else {
                        Some(config)
                    }
                }
                Err(e) => {
                    err.push("config", e.to_string());
                    None
                }
            },
            (Some(t), None) => Some(default_config(t)),
            _ => None,
        };

        if schedule_type == Some(ScheduleType::Scrape) && self.source_id.is_none() {
            err.push("sourceId", "required for scrape schedules");
        }
        if schedule_type == Some(ScheduleType::WordpressExport)
            && self.wordpress_settings_id.is_none()
        {
            err.push("wordpressSettingsId", "required for wordpress_export schedules");
        }

        err.into_result()?;
        match (schedule_type, config) {
            (Some(schedule_type), Some(config)) => Ok(ScheduleInput {
                schedule_type,
                source_id: self.source_id,
                wordpress_settings_id: self.wordpress_settings_id,
                cron: self.cron,
                timezone,
                active: self.active,
                config,
            }),
            // Unreachable: both are None only when a detail was pushed.
            _ => Err(ValidationError::field("scheduleType", "invalid schedule")),
        }
    }
}

fn config_kind(config: &ScheduleConfig) -> ScheduleType {
    match config {
        ScheduleConfig::Scrape { .. } => ScheduleType::Scrape,
        ScheduleConfig::WordpressExport { .. } => ScheduleType::WordpressExport,
        ScheduleConfig::InstagramScrape { .. } => ScheduleType::InstagramScrape,
    }
}

fn default_config(t: ScheduleType) -> ScheduleConfig {
    match t {
        ScheduleType::Scrape => ScheduleConfig::Scrape {
            test_mode: false,
            scrape_mode: None,
            pagination_options: None,
        },
        ScheduleType::WordpressExport => ScheduleConfig::WordpressExport {
            start_offset_days: 0,
            end_offset_days: 30,
            city: None,
            category: None,
            source_ids: Vec::new(),
            update_if_exists: false,
            include_media: false,
            post_status: None,
        },
        ScheduleType::InstagramScrape => ScheduleConfig::InstagramScrape {
            scope: Default::default(),
            account_ids: Vec::new(),
            post_limit: None,
            batch_size: None,
        },
    }
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let schedules = state.store.schedules().list().await?;
    Ok(Json(json!({ "schedules": schedules })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state.store.schedules().get(id).await?;
    Ok(Json(json!({ "schedule": schedule })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SchedulePayload>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.parse()?;
    let schedule = state.scheduler.create(&input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "schedule": schedule }))))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SchedulePayload>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.parse()?;
    let schedule = state.scheduler.update(id, &input).await?;
    Ok(Json(json!({ "schedule": schedule })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn trigger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job_id = state.scheduler.trigger_now(id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

pub async fn trigger_all_active(
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let job_ids = state.scheduler.trigger_all_active().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobIds": job_ids }))))
}
