//! The instagram-scrape-queue handler: one account per job, child runs under
//! a batch parent whose aggregation refreshes on every transition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use eventscrape_common::scraper::{InstagramJobData, RawEvent};
use eventscrape_common::types::{InstagramScraperType, RunErrorEntry, RunStatus};
use eventscrape_ingest::{IngestStats, Ingestor};
use eventscrape_queue::{
    CancelFlags, CancelState, Job, JobHandler, LogStream, INSTAGRAM_SCRAPE_QUEUE,
};
use eventscrape_store::Store;
use uuid::Uuid;

use crate::run_logger::RunLogger;

const DEFAULT_POST_LIMIT: u32 = 25;
const INGEST_BATCH_SIZE: usize = 25;

/// External Instagram scraping backend (Apify actor, private API client).
/// Returns already-classified event candidates as raw events.
#[async_trait]
pub trait InstagramBackend: Send + Sync {
    async fn fetch_events(
        &self,
        username: &str,
        post_limit: u32,
        logger: &RunLogger,
    ) -> anyhow::Result<Vec<RawEvent>>;
}

pub struct InstagramHandler {
    store: Store,
    ingestor: Ingestor,
    flags: CancelFlags,
    logs: LogStream,
    backends: HashMap<InstagramScraperType, Arc<dyn InstagramBackend>>,
}

impl InstagramHandler {
    pub fn new(
        store: Store,
        ingestor: Ingestor,
        flags: CancelFlags,
        logs: LogStream,
        backends: HashMap<InstagramScraperType, Arc<dyn InstagramBackend>>,
    ) -> Self {
        Self {
            store,
            ingestor,
            flags,
            logs,
            backends,
        }
    }

    /// Per-source override wins when the system settings allow it; otherwise
    /// the global scraper type applies.
    async fn resolve_backend(
        &self,
        source_override: Option<InstagramScraperType>,
    ) -> anyhow::Result<(InstagramScraperType, Arc<dyn InstagramBackend>)> {
        let settings = self.store.settings().system().await?;
        let global = settings.instagram_scraper_type()?;
        let chosen = if settings.instagram_allow_source_override {
            source_override.unwrap_or(global)
        } else {
            global
        };
        let backend = self
            .backends
            .get(&chosen)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no instagram backend registered for {chosen}"))?;
        Ok((chosen, backend))
    }

    async fn refresh_parent(&self, parent_run_id: Option<Uuid>) {
        if let Some(parent_id) = parent_run_id {
            if let Err(e) = self.store.runs().aggregate_parent(parent_id).await {
                warn!(parent_run_id = %parent_id, error = %e, "Parent aggregation failed");
            }
        }
    }

    async fn finalize_cancelled(
        &self,
        run_id: Uuid,
        data: &InstagramJobData,
        job: &Job,
        stats: &IngestStats,
    ) {
        if let Err(e) = self
            .store
            .runs()
            .merge_metadata(run_id, json!({ "cancelled": true }))
            .await
        {
            warn!(run_id = %run_id, error = %e, "Failed to mark run cancelled");
        }
        let _ = self
            .store
            .runs()
            .finish(
                run_id,
                RunStatus::Partial,
                0,
                stats.events_seen() as i32,
                &stats.errors,
            )
            .await;
        let _ = self
            .flags
            .set(INSTAGRAM_SCRAPE_QUEUE.name, &job.id, CancelState::Cancelled)
            .await;
        self.refresh_parent(data.parent_run_id).await;
    }
}

#[async_trait]
impl JobHandler for InstagramHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let data: InstagramJobData = job.data()?;

        let run_id = match data.run_id {
            Some(id) => id,
            None => {
                self.store
                    .runs()
                    .create(Some(data.account_id), data.parent_run_id, None)
                    .await?
                    .id
            }
        };

        if self
            .flags
            .is_requested(INSTAGRAM_SCRAPE_QUEUE.name, &job.id)
            .await
            .unwrap_or(false)
        {
            self.finalize_cancelled(run_id, &data, job, &IngestStats::default()).await;
            return Ok(());
        }

        self.store.runs().mark_running(run_id).await?;
        self.refresh_parent(data.parent_run_id).await;

        let account = match self.store.sources().get(data.account_id).await {
            Ok(s) => s,
            Err(e) => {
                let errors = [RunErrorEntry::new("load_account", e.to_string())];
                self.store
                    .runs()
                    .finish(run_id, RunStatus::Error, 0, 0, &errors)
                    .await?;
                self.refresh_parent(data.parent_run_id).await;
                return Ok(());
            }
        };

        let logger = RunLogger::new(run_id, Some(account.name.clone()), self.logs.clone());
        let username = account
            .instagram_username
            .clone()
            .unwrap_or_else(|| account.name.clone());

        let (scraper_type, backend) =
            match self.resolve_backend(account.instagram_scraper_type).await {
                Ok(pair) => pair,
                Err(e) => {
                    logger.error(format!("Backend resolution failed: {e}")).await;
                    let errors = [RunErrorEntry::new("resolve_backend", e.to_string())];
                    self.store
                        .runs()
                        .finish(run_id, RunStatus::Error, 0, 0, &errors)
                        .await?;
                    self.refresh_parent(data.parent_run_id).await;
                    return Ok(());
                }
            };

        logger
            .info(format!("Instagram scrape starting for @{username} via {scraper_type}"))
            .await;

        let post_limit = data.post_limit.unwrap_or(DEFAULT_POST_LIMIT);
        let events = match backend.fetch_events(&username, post_limit, &logger).await {
            Ok(events) => events,
            Err(e) => {
                logger.error(format!("Instagram backend failed: {e}")).await;
                if job.attempts_made >= job.max_attempts {
                    let errors = [RunErrorEntry::new("instagram_backend", e.to_string())];
                    self.store
                        .runs()
                        .finish(run_id, RunStatus::Error, 0, 0, &errors)
                        .await?;
                    self.refresh_parent(data.parent_run_id).await;
                }
                return Err(e);
            }
        };

        logger
            .info(format!("Backend returned {} event candidates", events.len()))
            .await;

        let batch_size = data
            .batch_size
            .map(|b| b.max(1) as usize)
            .unwrap_or(INGEST_BATCH_SIZE);
        let mut stats = IngestStats::default();
        for chunk in events.chunks(batch_size) {
            if self
                .flags
                .is_requested(INSTAGRAM_SCRAPE_QUEUE.name, &job.id)
                .await
                .unwrap_or(false)
            {
                logger.warn("Cancellation requested, finalizing early").await;
                self.finalize_cancelled(run_id, &data, job, &stats).await;
                return Ok(());
            }
            let batch = self.ingestor.ingest_batch(&account, Some(run_id), chunk).await?;
            stats.inserted += batch.inserted;
            stats.updated += batch.updated;
            stats.unchanged += batch.unchanged;
            stats.occurrences_written += batch.occurrences_written;
            stats.errors.extend(batch.errors);
        }

        let status = if stats.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        self.store
            .runs()
            .finish(run_id, status, 1, events.len() as i32, &stats.errors)
            .await?;
        self.store.sources().touch_last_checked(account.id).await?;
        self.refresh_parent(data.parent_run_id).await;
        Ok(())
    }
}
