//! The export engine: filter query → sorted event stream → format encoder
//! (CSV / JSON / ICS file) or WordPress REST upload.

pub mod csv;
pub mod error;
pub mod ics;
pub mod json;
pub mod record;
pub mod wordpress;

pub use error::{ExportError, Result};
pub use record::{ExportRecord, FieldMapEntry};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use eventscrape_common::types::ExportFormat;
use eventscrape_store::{EventFilter, Store};

use wordpress::{WordPressClient, WpPostPlan, WpUploadOptions};

/// Typed export parameters, stored as the export row's params snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    #[serde(default)]
    pub filter: EventFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_map: Option<Vec<FieldMapEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordpress_settings_id: Option<Uuid>,
    #[serde(default)]
    pub update_if_exists: bool,
    #[serde(default)]
    pub include_media: bool,
    /// WordPress post status. Preferred over the legacy `wpPostStatus`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Deprecated synonym of `status`; ignored when both are supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wp_post_status: Option<String>,
}

impl ExportParams {
    /// Effective WP post status: `status` wins when both fields are set.
    pub fn effective_post_status(&self) -> Option<&str> {
        if self.status.is_some() && self.wp_post_status.is_some() {
            warn!("Both status and wpPostStatus supplied; wpPostStatus is deprecated, using status");
        }
        self.status.as_deref().or(self.wp_post_status.as_deref())
    }
}

#[derive(Clone)]
pub struct ExportEngine {
    store: Store,
    export_dir: String,
}

impl ExportEngine {
    pub fn new(store: Store, export_dir: impl Into<String>) -> Self {
        Self {
            store,
            export_dir: export_dir.into(),
        }
    }

    /// Create the export row and process it to completion. Failures land on
    /// the row as `error` with a message; this only returns `Err` when even
    /// that bookkeeping fails.
    pub async fn create_and_run(
        &self,
        format: ExportFormat,
        params: ExportParams,
        schedule_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let params_json = serde_json::to_value(&params)
            .map_err(|e| ExportError::InvalidParams(e.to_string()))?;
        let row = self
            .store
            .exports()
            .create(format, params_json, schedule_id)
            .await?;
        self.run(row.id).await?;
        Ok(row.id)
    }

    /// Process an existing `processing` export row.
    pub async fn run(&self, export_id: Uuid) -> Result<()> {
        match self.run_inner(export_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(export_id = %export_id, error = %e, "Export failed");
                self.store
                    .exports()
                    .finish_error(export_id, &e.to_string())
                    .await?;
                Ok(())
            }
        }
    }

    async fn run_inner(&self, export_id: Uuid) -> Result<()> {
        let row = self.store.exports().get(export_id).await?;
        let format = row.format()?;
        let params: ExportParams = serde_json::from_value(row.params.clone())
            .map_err(|e| ExportError::InvalidParams(e.to_string()))?;

        let rows = self.store.events().list_raw(&params.filter).await?;
        let records: Vec<ExportRecord> = rows.iter().map(ExportRecord::from).collect();
        info!(export_id = %export_id, format = %format, events = records.len(), "Export started");

        match format {
            ExportFormat::Csv => {
                let map = params
                    .field_map
                    .clone()
                    .unwrap_or_else(csv::default_field_map);
                let body = csv::encode_csv(&records, &map);
                let path = self.write_artifact(export_id, "csv", body.as_bytes()).await?;
                self.store
                    .exports()
                    .finish_success(export_id, records.len() as i32, Some(&path), json!({}))
                    .await?;
            }
            ExportFormat::Json => {
                let body = json::encode_json(&records, params.field_map.as_deref());
                let path = self.write_artifact(export_id, "json", body.as_bytes()).await?;
                self.store
                    .exports()
                    .finish_success(export_id, records.len() as i32, Some(&path), json!({}))
                    .await?;
            }
            ExportFormat::Ics => {
                let body = ics::encode_ics(&records);
                let path = self.write_artifact(export_id, "ics", body.as_bytes()).await?;
                self.store
                    .exports()
                    .finish_success(export_id, records.len() as i32, Some(&path), json!({}))
                    .await?;
            }
            ExportFormat::WpRest => {
                self.run_wordpress(export_id, &params, &records).await?;
            }
        }
        Ok(())
    }

    async fn run_wordpress(
        &self,
        export_id: Uuid,
        params: &ExportParams,
        records: &[ExportRecord],
    ) -> Result<()> {
        let settings_id = params
            .wordpress_settings_id
            .ok_or(ExportError::MissingWordPressSettings)?;
        let settings = self.store.settings().get_wordpress(settings_id).await?;
        let client = WordPressClient::new(&settings);

        let plans = self.build_post_plans(records, &settings).await?;
        let options = WpUploadOptions::builder()
            .update_if_exists(params.update_if_exists)
            .include_media(params.include_media)
            .post_status(params.effective_post_status().map(str::to_string))
            .build();

        let summary = client.upload(&plans, &options).await;

        // Per-event failures are recorded in the results; the export only
        // errors when nothing at all went through.
        if !plans.is_empty() && summary.item_count() == 0 {
            let message = summary
                .results
                .iter()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| "all uploads failed".to_string());
            self.store
                .exports()
                .finish_error(export_id, &message)
                .await?;
            return Ok(());
        }

        self.store
            .exports()
            .finish_success(
                export_id,
                summary.item_count(),
                None,
                json!({ "wpResults": summary }),
            )
            .await?;
        Ok(())
    }

    /// Expand records into posts: one per occurrence for recurring series,
    /// one for everything else.
    async fn build_post_plans(
        &self,
        records: &[ExportRecord],
        settings: &eventscrape_store::settings::WordPressSettingsRow,
    ) -> Result<Vec<WpPostPlan>> {
        let mut plans = Vec::new();
        for record in records {
            let category = record
                .source_id
                .and_then(|sid| settings.category_for_source(sid));

            let occurrences = match record.series_id {
                Some(series_id) => self.store.events().occurrences_of_series(series_id).await?,
                None => Vec::new(),
            };

            if occurrences.len() > 1 {
                for occurrence in &occurrences {
                    plans.push(WpPostPlan {
                        record: record.clone(),
                        external_id: format!("{}:{}", record.id, occurrence.sequence),
                        start: occurrence.start_datetime_utc,
                        end: occurrence.end_datetime_utc,
                        category,
                    });
                }
            } else {
                plans.push(WpPostPlan {
                    record: record.clone(),
                    external_id: record.id.clone(),
                    start: record.start,
                    end: record.end,
                    category,
                });
            }
        }
        Ok(plans)
    }

    async fn write_artifact(&self, export_id: Uuid, ext: &str, body: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.export_dir).await?;
        let path = format!("{}/export-{export_id}.{ext}", self.export_dir);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wins_over_deprecated_synonym() {
        let params = ExportParams {
            status: Some("publish".into()),
            wp_post_status: Some("draft".into()),
            ..Default::default()
        };
        assert_eq!(params.effective_post_status(), Some("publish"));

        let only_legacy = ExportParams {
            wp_post_status: Some("draft".into()),
            ..Default::default()
        };
        assert_eq!(only_legacy.effective_post_status(), Some("draft"));

        assert_eq!(ExportParams::default().effective_post_status(), None);
    }

    #[test]
    fn params_deserialize_from_camel_case() {
        let json = serde_json::json!({
            "filter": { "city": "Prince George" },
            "updateIfExists": true,
            "wpPostStatus": "draft",
        });
        let params: ExportParams = serde_json::from_value(json).unwrap();
        assert!(params.update_if_exists);
        assert_eq!(params.filter.city.as_deref(), Some("Prince George"));
        assert_eq!(params.wp_post_status.as_deref(), Some("draft"));
    }
}
