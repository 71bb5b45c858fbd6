//! The schedule-queue handler: delegates each fire to the scheduler's
//! dispatch.

use async_trait::async_trait;

use eventscrape_common::scraper::ScheduleJobData;
use eventscrape_queue::{Job, JobHandler};
use eventscrape_scheduler::Scheduler;

pub struct ScheduleHandler {
    scheduler: Scheduler,
}

impl ScheduleHandler {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl JobHandler for ScheduleHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let data: ScheduleJobData = job.data()?;
        self.scheduler.handle_fire(&data).await?;
        Ok(())
    }
}
