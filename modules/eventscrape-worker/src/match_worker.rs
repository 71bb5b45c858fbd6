//! The match-queue handler.

use async_trait::async_trait;
use tracing::info;

use eventscrape_common::scraper::MatchJobData;
use eventscrape_match::MatchEngine;
use eventscrape_queue::{Job, JobHandler};

pub struct MatchHandler {
    engine: MatchEngine,
}

impl MatchHandler {
    pub fn new(engine: MatchEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for MatchHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let data: MatchJobData = job.data()?;
        let stats = self.engine.run(&data).await?;
        info!(
            job_id = %job.id,
            candidates = stats.candidates_scored,
            proposals = stats.proposals_written,
            "Match job finished"
        );
        Ok(())
    }
}
