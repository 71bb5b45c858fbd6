//! The scrape-queue handler: run lifecycle around one scraper module
//! invocation, batched ingestion, and cooperative cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use eventscrape_common::scraper::ScrapeJobData;
use eventscrape_common::types::{RunErrorEntry, RunStatus};
use eventscrape_ingest::{IngestStats, Ingestor};
use eventscrape_queue::{CancelFlags, CancelState, Job, JobHandler, LogStream, SCRAPE_QUEUE};
use eventscrape_store::Store;

use crate::browser::BrowserPool;
use crate::modules::{ModuleRegistry, ScrapeCtx};
use crate::run_logger::RunLogger;

const INGEST_BATCH_SIZE: usize = 50;

pub struct ScrapeHandler {
    store: Store,
    ingestor: Ingestor,
    flags: CancelFlags,
    logs: LogStream,
    browser: Arc<BrowserPool>,
    registry: Arc<ModuleRegistry>,
}

impl ScrapeHandler {
    pub fn new(
        store: Store,
        ingestor: Ingestor,
        flags: CancelFlags,
        logs: LogStream,
        browser: Arc<BrowserPool>,
        registry: Arc<ModuleRegistry>,
    ) -> Self {
        Self {
            store,
            ingestor,
            flags,
            logs,
            browser,
            registry,
        }
    }

    async fn finalize_cancelled(&self, data: &ScrapeJobData, job: &Job, stats: &IngestStats) {
        if let Err(e) = self
            .store
            .runs()
            .merge_metadata(data.run_id, json!({ "cancelled": true }))
            .await
        {
            warn!(run_id = %data.run_id, error = %e, "Failed to mark run cancelled");
        }
        let _ = self
            .store
            .runs()
            .finish(
                data.run_id,
                RunStatus::Partial,
                0,
                stats.events_seen() as i32,
                &stats.errors,
            )
            .await;
        let _ = self
            .flags
            .set(SCRAPE_QUEUE.name, &job.id, CancelState::Cancelled)
            .await;
    }
}

#[async_trait]
impl JobHandler for ScrapeHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let data: ScrapeJobData = job.data()?;

        // A cancel that landed while the job sat in the queue.
        if self
            .flags
            .is_requested(SCRAPE_QUEUE.name, &job.id)
            .await
            .unwrap_or(false)
        {
            self.finalize_cancelled(&data, job, &IngestStats::default()).await;
            return Ok(());
        }

        self.store.runs().mark_running(data.run_id).await?;
        let logger = Arc::new(RunLogger::new(
            data.run_id,
            Some(data.source_name.clone()),
            self.logs.clone(),
        ));

        let source = match self.store.sources().get(data.source_id).await {
            Ok(s) => s,
            Err(e) => {
                logger.error(format!("Source lookup failed: {e}")).await;
                let errors = [RunErrorEntry::new("load_source", e.to_string())];
                self.store
                    .runs()
                    .finish(data.run_id, RunStatus::Error, 0, 0, &errors)
                    .await?;
                return Ok(());
            }
        };

        let Some(module) = self.registry.get(&data.module_key) else {
            logger
                .error(format!("No scraper module registered for key '{}'", data.module_key))
                .await;
            let errors = [RunErrorEntry::new(
                "resolve_module",
                format!("unknown module_key: {}", data.module_key),
            )];
            self.store
                .runs()
                .finish(data.run_id, RunStatus::Error, 0, 0, &errors)
                .await?;
            return Ok(());
        };

        logger
            .info(format!("Scrape starting for {} ({})", source.name, data.module_key))
            .await;

        let ctx = ScrapeCtx::new(
            logger.clone(),
            self.browser.clone(),
            data.clone(),
            source.clone(),
            self.flags.clone(),
            SCRAPE_QUEUE.name.to_string(),
            job.id.clone(),
        );

        let output = match module.run(&ctx).await {
            Ok(output) => output,
            Err(e) => {
                logger.error(format!("Scraper module failed: {e}")).await;
                // The module raised before yielding events. Let the queue
                // retry; only the terminal attempt settles the run.
                if job.attempts_made >= job.max_attempts {
                    let errors = [RunErrorEntry::new("scraper_module", e.to_string())];
                    self.store
                        .runs()
                        .finish(data.run_id, RunStatus::Error, 0, 0, &errors)
                        .await?;
                }
                return Err(e);
            }
        };

        logger
            .info(format!(
                "Scraper returned {} events across {} pages",
                output.events.len(),
                output.pages_crawled
            ))
            .await;

        let mut stats = IngestStats::default();
        for chunk in output.events.chunks(INGEST_BATCH_SIZE) {
            if ctx.is_cancelled().await {
                logger.warn("Cancellation requested, finalizing early").await;
                self.finalize_cancelled(&data, job, &stats).await;
                return Ok(());
            }
            let batch = self
                .ingestor
                .ingest_batch(&source, Some(data.run_id), chunk)
                .await?;
            stats.inserted += batch.inserted;
            stats.updated += batch.updated;
            stats.unchanged += batch.unchanged;
            stats.occurrences_written += batch.occurrences_written;
            stats.errors.extend(batch.errors);
        }

        let mut errors = output.errors;
        errors.extend(stats.errors.iter().cloned());
        let status = if errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };

        logger
            .info(format!(
                "Ingestion done: {} inserted, {} updated, {} unchanged",
                stats.inserted, stats.updated, stats.unchanged
            ))
            .await;

        self.store
            .runs()
            .finish(
                data.run_id,
                status,
                output.pages_crawled as i32,
                output.events.len() as i32,
                &errors,
            )
            .await?;
        self.store.sources().touch_last_checked(source.id).await?;
        Ok(())
    }
}
