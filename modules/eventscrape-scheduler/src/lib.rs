//! The scheduler singleton.
//!
//! Materializes active schedule rows into repeatable queue registrations on
//! startup, keeps the registry in sync through create/update/delete, and
//! handles schedule-queue fires by dispatching on the schedule's typed
//! config: one-off scrapes, Instagram account batches with a parent run, or
//! inline WordPress exports over an offset-based date window.

pub mod error;

pub use error::{Result, SchedulerError};

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use eventscrape_common::scraper::{InstagramJobData, ScheduleJobData, ScrapeJobData};
use eventscrape_common::types::{InstagramScope, Schedule, ScheduleConfig};
use eventscrape_export::{ExportEngine, ExportParams};
use eventscrape_queue::{
    JobOptions, JobQueue, RepeatableRegistry, RepeatableSpec, INSTAGRAM_SCRAPE_QUEUE,
    SCHEDULE_QUEUE, SCRAPE_QUEUE,
};
use eventscrape_store::schedules::ScheduleInput;
use eventscrape_store::{EventFilter, Store};

#[derive(Clone)]
pub struct Scheduler {
    store: Store,
    queue: JobQueue,
    registry: RepeatableRegistry,
    export_engine: ExportEngine,
}

impl Scheduler {
    pub fn new(store: Store, queue: JobQueue, export_engine: ExportEngine) -> Self {
        let registry = RepeatableRegistry::new(&queue);
        Self {
            store,
            queue,
            registry,
            export_engine,
        }
    }

    fn repeatable_spec(schedule: &Schedule) -> RepeatableSpec {
        let data = ScheduleJobData {
            schedule_id: schedule.id,
            source_id: schedule.source_id,
            wordpress_settings_id: schedule.wordpress_settings_id,
            config: None,
        };
        RepeatableSpec {
            queue: SCHEDULE_QUEUE.name.to_string(),
            name: "fire-schedule".to_string(),
            payload: serde_json::to_value(&data).unwrap_or_default(),
            cron: schedule.cron.clone(),
            timezone: schedule.timezone.clone(),
            job_id: format!("schedule:{}", schedule.id),
        }
    }

    /// Register every active schedule. Run once at process startup.
    pub async fn sync_on_startup(&self) -> Result<()> {
        let schedules = self.store.schedules().list_active().await?;
        let count = schedules.len();
        for schedule in schedules {
            let repeat_key = self
                .registry
                .register(Self::repeatable_spec(&schedule))
                .await?;
            self.store
                .schedules()
                .set_repeat_key(schedule.id, Some(&repeat_key))
                .await?;
        }
        info!(schedules = count, "Scheduler startup sync complete");
        Ok(())
    }

    pub async fn create(&self, input: &ScheduleInput) -> Result<Schedule> {
        let mut schedule = self.store.schedules().create(input).await?;
        if schedule.active {
            let repeat_key = self
                .registry
                .register(Self::repeatable_spec(&schedule))
                .await?;
            self.store
                .schedules()
                .set_repeat_key(schedule.id, Some(&repeat_key))
                .await?;
            schedule.repeat_key = Some(repeat_key);
        }
        Ok(schedule)
    }

    /// Update a schedule: a deactivation removes its registration; any other
    /// change re-registers (remove then register) so cron/timezone edits take
    /// effect.
    pub async fn update(&self, id: Uuid, input: &ScheduleInput) -> Result<Schedule> {
        let existing = self.store.schedules().get(id).await?;
        if let Some(repeat_key) = &existing.repeat_key {
            self.registry.remove(repeat_key).await?;
        }

        let mut schedule = self.store.schedules().update(id, input).await?;
        if schedule.active {
            let repeat_key = self
                .registry
                .register(Self::repeatable_spec(&schedule))
                .await?;
            self.store
                .schedules()
                .set_repeat_key(id, Some(&repeat_key))
                .await?;
            schedule.repeat_key = Some(repeat_key);
        } else {
            self.store.schedules().set_repeat_key(id, None).await?;
            schedule.repeat_key = None;
        }
        Ok(schedule)
    }

    /// Remove the registration and delete the row. Exports that pointed at
    /// the schedule keep their history with a nulled schedule id.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let schedule = self.store.schedules().get(id).await?;
        if let Some(repeat_key) = &schedule.repeat_key {
            self.registry.remove(repeat_key).await?;
        }
        self.store.schedules().delete(id).await?;
        Ok(())
    }

    /// Bypass cron: synthesize one schedule-queue job right now.
    pub async fn trigger_now(&self, id: Uuid) -> Result<String> {
        let schedule = self.store.schedules().get(id).await?;
        let data = ScheduleJobData {
            schedule_id: schedule.id,
            source_id: schedule.source_id,
            wordpress_settings_id: schedule.wordpress_settings_id,
            config: None,
        };
        let job_id = self
            .queue
            .enqueue(
                &SCHEDULE_QUEUE,
                "fire-schedule",
                serde_json::to_value(&data).unwrap_or_default(),
                JobOptions::default(),
            )
            .await?;
        info!(schedule_id = %id, job_id = %job_id, "Schedule triggered manually");
        Ok(job_id)
    }

    pub async fn trigger_all_active(&self) -> Result<Vec<String>> {
        let schedules = self.store.schedules().list_active().await?;
        let mut job_ids = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            job_ids.push(self.trigger_now(schedule.id).await?);
        }
        Ok(job_ids)
    }

    /// The schedule-queue job handler: one call per fire. A schedule whose
    /// row or source has gone away is a clean no-op.
    pub async fn handle_fire(&self, data: &ScheduleJobData) -> Result<()> {
        let schedule = match self.store.schedules().get(data.schedule_id).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => {
                warn!(schedule_id = %data.schedule_id, "Fired schedule no longer exists, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match &schedule.config {
            ScheduleConfig::Scrape {
                test_mode,
                scrape_mode,
                pagination_options,
            } => {
                self.fire_scrape(&schedule, *test_mode, scrape_mode.as_deref(), pagination_options)
                    .await
            }
            ScheduleConfig::InstagramScrape {
                scope,
                account_ids,
                post_limit,
                batch_size,
            } => {
                self.fire_instagram_batch(&schedule, *scope, account_ids, *post_limit, *batch_size)
                    .await
            }
            ScheduleConfig::WordpressExport { .. } => self.fire_wordpress_export(&schedule).await,
        }
    }

    async fn fire_scrape(
        &self,
        schedule: &Schedule,
        test_mode: bool,
        scrape_mode: Option<&str>,
        pagination_options: &Option<serde_json::Value>,
    ) -> Result<()> {
        let source_id = schedule
            .source_id
            .ok_or(SchedulerError::MissingSource(schedule.id))?;
        let source = match self.store.sources().get(source_id).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => {
                warn!(schedule_id = %schedule.id, source_id = %source_id, "Scheduled source is gone, skipping fire");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if !source.active {
            info!(source = %source.name, "Source inactive, skipping scheduled scrape");
            return Ok(());
        }

        let run = self.store.runs().create(Some(source.id), None, None).await?;
        let data = ScrapeJobData {
            source_id: source.id,
            run_id: run.id,
            module_key: source.module_key.clone(),
            source_name: source.name.clone(),
            test_mode,
            scrape_mode: scrape_mode.and_then(|m| m.parse().ok()).unwrap_or_default(),
            pagination_options: pagination_options.clone(),
            uploaded_file: None,
        };
        let job_id = self
            .queue
            .enqueue(
                &SCRAPE_QUEUE,
                "scrape",
                serde_json::to_value(&data).unwrap_or_default(),
                JobOptions::default(),
            )
            .await?;
        info!(source = %source.name, run_id = %run.id, job_id = %job_id, "Scheduled scrape enqueued");
        Ok(())
    }

    async fn fire_instagram_batch(
        &self,
        schedule: &Schedule,
        scope: InstagramScope,
        account_ids: &[Uuid],
        post_limit: Option<u32>,
        batch_size: Option<u32>,
    ) -> Result<()> {
        let accounts = match scope {
            InstagramScope::AllActive => self.store.sources().list_instagram(true).await?,
            InstagramScope::AllInactive => self.store.sources().list_instagram(false).await?,
            InstagramScope::Custom => {
                let mut selected = Vec::with_capacity(account_ids.len());
                for id in account_ids {
                    match self.store.sources().get(*id).await {
                        Ok(source) => selected.push(source),
                        Err(e) if e.is_not_found() => {
                            warn!(account_id = %id, "Instagram account gone, skipping in batch");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                selected
            }
        };

        let parent = self
            .store
            .runs()
            .create(
                None,
                None,
                Some(json!({
                    "batch": true,
                    "schedule_id": schedule.id,
                    "scope": scope.to_string(),
                    "account_count": accounts.len(),
                })),
            )
            .await?;

        for account in &accounts {
            let child = self
                .store
                .runs()
                .create(Some(account.id), Some(parent.id), None)
                .await?;
            let data = InstagramJobData {
                account_id: account.id,
                run_id: Some(child.id),
                post_limit,
                batch_size,
                parent_run_id: Some(parent.id),
            };
            self.queue
                .enqueue(
                    &INSTAGRAM_SCRAPE_QUEUE,
                    "instagram-scrape",
                    serde_json::to_value(&data).unwrap_or_default(),
                    JobOptions::default(),
                )
                .await?;
        }

        // An empty batch finishes immediately; otherwise the aggregation is
        // refreshed as children transition.
        self.store.runs().aggregate_parent(parent.id).await?;

        info!(
            schedule_id = %schedule.id,
            parent_run_id = %parent.id,
            accounts = accounts.len(),
            "Instagram batch enqueued"
        );
        Ok(())
    }

    async fn fire_wordpress_export(&self, schedule: &Schedule) -> Result<()> {
        let ScheduleConfig::WordpressExport {
            start_offset_days,
            end_offset_days,
            city,
            category,
            source_ids,
            update_if_exists,
            include_media,
            post_status,
        } = &schedule.config
        else {
            return Ok(());
        };

        let now = Utc::now();
        let params = ExportParams {
            filter: EventFilter {
                start_date: Some(now + Duration::days(*start_offset_days)),
                end_date: Some(now + Duration::days(*end_offset_days)),
                city: city.clone(),
                category: category.clone(),
                source_ids: source_ids.clone(),
                ..Default::default()
            },
            wordpress_settings_id: schedule.wordpress_settings_id,
            update_if_exists: *update_if_exists,
            include_media: *include_media,
            status: post_status.clone(),
            ..Default::default()
        };

        let export_id = self
            .export_engine
            .create_and_run(
                eventscrape_common::types::ExportFormat::WpRest,
                params,
                Some(schedule.id),
            )
            .await?;
        info!(schedule_id = %schedule.id, export_id = %export_id, "Scheduled WordPress export finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventscrape_common::types::ScheduleType;

    fn schedule(cron: &str, tz: &str) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            schedule_type: ScheduleType::Scrape,
            source_id: Some(Uuid::new_v4()),
            wordpress_settings_id: None,
            cron: cron.to_string(),
            timezone: tz.to_string(),
            active: true,
            repeat_key: None,
            config: ScheduleConfig::Scrape {
                test_mode: false,
                scrape_mode: None,
                pagination_options: None,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn repeatable_spec_uses_stable_job_id() {
        let s = schedule("0 6 * * *", "America/Vancouver");
        let spec = Scheduler::repeatable_spec(&s);
        assert_eq!(spec.job_id, format!("schedule:{}", s.id));
        assert_eq!(spec.queue, "schedule-queue");
        assert_eq!(spec.cron, "0 6 * * *");
        assert_eq!(spec.timezone, "America/Vancouver");
    }

    #[test]
    fn repeatable_payload_carries_schedule_context() {
        let s = schedule("0 6 * * *", "UTC");
        let spec = Scheduler::repeatable_spec(&s);
        let data: ScheduleJobData = serde_json::from_value(spec.payload).unwrap();
        assert_eq!(data.schedule_id, s.id);
        assert_eq!(data.source_id, s.source_id);
        assert!(data.config.is_none());
    }

    #[test]
    fn registration_handle_differs_per_schedule() {
        let a = Scheduler::repeatable_spec(&schedule("0 6 * * *", "UTC"));
        let b = Scheduler::repeatable_spec(&schedule("0 6 * * *", "UTC"));
        assert_ne!(a.repeat_key(), b.repeat_key());
    }
}
