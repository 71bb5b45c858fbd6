//! The scraper module contract and registry.
//!
//! Modules are external collaborators: the runtime hands them a context
//! (logger, browser pool, job data, cancellation probe) and they hand back
//! raw events plus a page count. The fixture module ships in-core for tests
//! and test-mode runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use eventscrape_common::scraper::{RawEvent, ScrapeJobData, SeriesInstance};
use eventscrape_common::types::{RunErrorEntry, Source};
use eventscrape_queue::CancelFlags;

use crate::browser::BrowserPool;
use crate::run_logger::RunLogger;

/// What a module returns from one run.
#[derive(Debug, Default)]
pub struct ScrapeOutput {
    pub events: Vec<RawEvent>,
    pub pages_crawled: u32,
    pub errors: Vec<RunErrorEntry>,
}

/// Everything a module gets from the runtime.
pub struct ScrapeCtx {
    pub logger: Arc<RunLogger>,
    pub browser: Arc<BrowserPool>,
    pub job: ScrapeJobData,
    pub source: Source,
    flags: CancelFlags,
    queue_name: String,
    job_id: String,
}

impl ScrapeCtx {
    pub fn new(
        logger: Arc<RunLogger>,
        browser: Arc<BrowserPool>,
        job: ScrapeJobData,
        source: Source,
        flags: CancelFlags,
        queue_name: String,
        job_id: String,
    ) -> Self {
        Self {
            logger,
            browser,
            job,
            source,
            flags,
            queue_name,
            job_id,
        }
    }

    /// Cancellation probe; modules check between iterations.
    pub async fn is_cancelled(&self) -> bool {
        self.flags
            .is_requested(&self.queue_name, &self.job_id)
            .await
            .unwrap_or(false)
    }

    /// Sleep between detail fetches to respect the source's rate limit,
    /// with jitter so parallel workers don't align.
    pub async fn pace(&self) {
        let per_min = self.source.rate_limit_per_min.unwrap_or(30).max(1) as u64;
        let base_ms = 60_000 / per_min;
        let jitter_ms = rand::rng().random_range(0..=base_ms / 4);
        tokio::time::sleep(std::time::Duration::from_millis(base_ms + jitter_ms)).await;
    }
}

#[async_trait]
pub trait ScraperModule: Send + Sync {
    /// Stable key matching `sources.module_key`.
    fn key(&self) -> &'static str;

    async fn run(&self, ctx: &ScrapeCtx) -> anyhow::Result<ScrapeOutput>;
}

#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<&'static str, Arc<dyn ScraperModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn ScraperModule>) {
        self.modules.insert(module.key(), module);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ScraperModule>> {
        self.modules.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.modules.keys().copied().collect()
    }
}

/// Deterministic module for tests and test-mode runs: two fixed events, one
/// of them a weekly two-date series.
pub struct FixtureModule;

pub const FIXTURE_MODULE_KEY: &str = "fixture";

#[async_trait]
impl ScraperModule for FixtureModule {
    fn key(&self) -> &'static str {
        FIXTURE_MODULE_KEY
    }

    async fn run(&self, ctx: &ScrapeCtx) -> anyhow::Result<ScrapeOutput> {
        ctx.logger.info("Fixture module producing sample events").await;
        let base = &ctx.source.base_url;
        let events = vec![
            RawEvent {
                source_event_id: Some("fixture-1".into()),
                title: "Community Market".into(),
                description_html: Some("<p>Weekly market downtown</p>".into()),
                start: "2025-02-10 09:00".into(),
                end: Some("2025-02-10 14:00".into()),
                venue_name: Some("Civic Plaza".into()),
                city: Some("Prince George".into()),
                url: format!("{base}/events/fixture-1"),
                raw: serde_json::json!({"fixture": true}),
                ..Default::default()
            },
            RawEvent {
                source_event_id: Some("fixture-2".into()),
                title: "Beginner Yoga".into(),
                start: "2025-03-01T11:00:00-08:00".into(),
                venue_name: Some("Community Centre".into()),
                city: Some("Prince George".into()),
                url: format!("{base}/events/fixture-2"),
                series_dates: vec![
                    SeriesInstance {
                        start: "2025-03-01T11:00:00-08:00".into(),
                        end: Some("2025-03-01T12:00:00-08:00".into()),
                    },
                    SeriesInstance {
                        start: "2025-03-08T11:00:00-08:00".into(),
                        end: Some("2025-03-08T12:00:00-08:00".into()),
                    },
                ],
                raw: serde_json::json!({"fixture": true}),
                ..Default::default()
            },
        ];
        Ok(ScrapeOutput {
            events,
            pages_crawled: 1,
            errors: Vec::new(),
        })
    }
}
