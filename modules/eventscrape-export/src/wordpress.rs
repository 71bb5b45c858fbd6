//! WordPress REST upload target.
//!
//! Posts land on `/wp-json/wp/v2/events` with find-or-create semantics: an
//! existing post is located by scanning for a matching `external_id`
//! (100 per page, client-side match), then updated or skipped per the
//! options. Recurring events emit one post per occurrence, each counted
//! individually. Uploads pace themselves at 500 ms per event.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use eventscrape_store::settings::WordPressSettingsRow;

use crate::error::{ExportError, Result};
use crate::record::ExportRecord;

const EVENTS_ROUTE: &str = "/wp-json/wp/v2/events";
const MEDIA_ROUTE: &str = "/wp-json/wp/v2/media";
const LOOKUP_PAGE_SIZE: u32 = 100;

/// Delay between event uploads.
pub const UPLOAD_PACING_MS: u64 = 500;

#[derive(Debug, Clone, TypedBuilder)]
pub struct WpUploadOptions {
    #[builder(default = false)]
    pub update_if_exists: bool,
    #[builder(default = false)]
    pub include_media: bool,
    /// Post status; falls back to the site's configured default.
    #[builder(default)]
    pub post_status: Option<String>,
}

/// One post to emit: a record plus the occurrence times it covers.
#[derive(Debug, Clone)]
pub struct WpPostPlan {
    pub record: ExportRecord,
    pub external_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub category: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WpAction {
    Created,
    Updated,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WpEventResult {
    pub event_id: String,
    pub external_id: String,
    pub action: WpAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WpUploadSummary {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub results: Vec<WpEventResult>,
}

impl WpUploadSummary {
    /// Posts created + updated + skipped — the export row's item count.
    pub fn item_count(&self) -> i32 {
        (self.created + self.updated + self.skipped) as i32
    }
}

#[derive(Serialize)]
struct WpPostBody {
    title: String,
    content: String,
    status: String,
    external_id: String,
    event_start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_venue: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_media: Option<i64>,
}

#[derive(Deserialize)]
struct WpPostRef {
    id: i64,
    #[serde(default)]
    external_id: Option<String>,
}

pub struct WordPressClient {
    client: reqwest::Client,
    site_url: String,
    username: String,
    app_password: String,
    default_status: String,
}

impl WordPressClient {
    pub fn new(settings: &WordPressSettingsRow) -> Self {
        Self {
            client: reqwest::Client::new(),
            site_url: settings.site_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            app_password: settings.app_password.clone(),
            default_status: settings.default_status.clone(),
        }
    }

    /// Scan the events endpoint for a post whose `external_id` matches.
    pub async fn find_existing(&self, external_id: &str) -> Result<Option<i64>> {
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}{EVENTS_ROUTE}?_fields=id,external_id&per_page={LOOKUP_PAGE_SIZE}&page={page}",
                self.site_url
            );
            let resp = self
                .client
                .get(&url)
                .basic_auth(&self.username, Some(&self.app_password))
                .send()
                .await?;

            // WP returns 400 once the page runs past the collection.
            if resp.status().as_u16() == 400 {
                return Ok(None);
            }
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExportError::WordPressApi {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let posts: Vec<WpPostRef> = resp.json().await?;
            let count = posts.len();
            if let Some(found) = posts
                .into_iter()
                .find(|p| p.external_id.as_deref() == Some(external_id))
            {
                return Ok(Some(found.id));
            }
            if count < LOOKUP_PAGE_SIZE as usize {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn send_post(&self, url: &str, body: &WpPostBody) -> Result<i64> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.app_password))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ExportError::WordPressApi {
                status: status.as_u16(),
                message,
            });
        }
        let created: WpPostRef = resp.json().await?;
        Ok(created.id)
    }

    /// Download an image and sideload it into the media library. Returns the
    /// media id for `featured_media`.
    pub async fn upload_media(&self, image_url: &str, filename: &str) -> Result<i64> {
        let image = self.client.get(image_url).send().await?;
        let status = image.status();
        if !status.is_success() {
            return Err(ExportError::WordPressApi {
                status: status.as_u16(),
                message: format!("image download failed: {image_url}"),
            });
        }
        let content_type = image
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = image.bytes().await?;

        let url = format!("{}{MEDIA_ROUTE}", self.site_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.app_password))
            .header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ExportError::WordPressApi {
                status: status.as_u16(),
                message,
            });
        }
        let media: WpPostRef = resp.json().await?;
        Ok(media.id)
    }

    /// Upload every planned post. Per-event failures are recorded in the
    /// summary and the batch continues.
    pub async fn upload(
        &self,
        plans: &[WpPostPlan],
        options: &WpUploadOptions,
    ) -> WpUploadSummary {
        let mut summary = WpUploadSummary::default();

        for (i, plan) in plans.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(UPLOAD_PACING_MS)).await;
            }
            let result = self.upload_one(plan, options).await;
            match &result.action {
                WpAction::Created => summary.created += 1,
                WpAction::Updated => summary.updated += 1,
                WpAction::Skipped => summary.skipped += 1,
                WpAction::Error => summary.failed += 1,
            }
            summary.results.push(result);
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "WordPress upload finished"
        );
        summary
    }

    async fn upload_one(&self, plan: &WpPostPlan, options: &WpUploadOptions) -> WpEventResult {
        match self.try_upload_one(plan, options).await {
            Ok((action, post_id)) => WpEventResult {
                event_id: plan.record.id.clone(),
                external_id: plan.external_id.clone(),
                action,
                post_id,
                error: None,
            },
            Err(e) => {
                warn!(event_id = %plan.record.id, error = %e, "WordPress upload failed for event");
                WpEventResult {
                    event_id: plan.record.id.clone(),
                    external_id: plan.external_id.clone(),
                    action: WpAction::Error,
                    post_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_upload_one(
        &self,
        plan: &WpPostPlan,
        options: &WpUploadOptions,
    ) -> Result<(WpAction, Option<i64>)> {
        let existing = self.find_existing(&plan.external_id).await?;
        if existing.is_some() && !options.update_if_exists {
            debug!(external_id = %plan.external_id, "Post exists, skipping");
            return Ok((WpAction::Skipped, existing));
        }

        let featured_media = if options.include_media {
            match &plan.record.image_url {
                Some(image_url) if !image_url.is_empty() => {
                    let filename = format!("event-{}.jpg", plan.external_id.replace(':', "-"));
                    match self.upload_media(image_url, &filename).await {
                        Ok(id) => Some(id),
                        Err(e) => {
                            warn!(image_url, error = %e, "Media upload failed, posting without image");
                            None
                        }
                    }
                }
                _ => None,
            }
        } else {
            None
        };

        let body = WpPostBody {
            title: plan.record.title.clone(),
            content: plan.record.description.clone().unwrap_or_default(),
            status: options
                .post_status
                .clone()
                .unwrap_or_else(|| self.default_status.clone()),
            external_id: plan.external_id.clone(),
            event_start: format_in_event_zone(plan.start, &plan.record.timezone),
            event_end: plan
                .end
                .map(|e| format_in_event_zone(e, &plan.record.timezone)),
            event_venue: plan.record.venue_name.clone(),
            categories: plan.category.into_iter().collect(),
            featured_media,
        };

        match existing {
            Some(post_id) => {
                let url = format!("{}{EVENTS_ROUTE}/{post_id}", self.site_url);
                let id = self.send_post(&url, &body).await?;
                Ok((WpAction::Updated, Some(id)))
            }
            None => {
                let url = format!("{}{EVENTS_ROUTE}", self.site_url);
                let id = self.send_post(&url, &body).await?;
                Ok((WpAction::Created, Some(id)))
            }
        }
    }
}

/// Format a UTC instant as local wall-clock in the event's zone; events keep
/// their advertised local time on the site. Unknown zones fall back to UTC.
fn format_in_event_zone(instant: DateTime<Utc>, timezone: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => instant
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => instant.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn times_translate_to_event_zone() {
        let utc = Utc.with_ymd_and_hms(2025, 2, 11, 3, 0, 0).unwrap();
        assert_eq!(
            format_in_event_zone(utc, "America/Vancouver"),
            "2025-02-10 19:00:00"
        );
        assert_eq!(format_in_event_zone(utc, "bogus"), "2025-02-11 03:00:00");
    }

    #[test]
    fn summary_item_count_excludes_failures() {
        let summary = WpUploadSummary {
            created: 2,
            updated: 1,
            skipped: 1,
            failed: 3,
            results: vec![],
        };
        assert_eq!(summary.item_count(), 4);
    }

    #[test]
    fn options_builder_defaults() {
        let options = WpUploadOptions::builder().build();
        assert!(!options.update_if_exists);
        assert!(!options.include_media);
        assert!(options.post_status.is_none());
    }
}
