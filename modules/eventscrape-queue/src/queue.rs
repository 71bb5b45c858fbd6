//! Named job queues over Redis.
//!
//! A job lives at `q:<queue>:job:<id>` as JSON with its state in a sibling
//! key. Waiting ids sit in a list, delayed ids in a sorted set scored by
//! promote-time, finished ids in sorted sets scored by finish-time for
//! retention purges. Consumers block on the wait list with a short timeout so
//! shutdown and delayed-promotion stay responsive.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{QueueError, Result};
use crate::job::{backoff_delay_ms, Job, JobOptions, JobState, QueueSpec};

/// Processes one job; an `Err` triggers the retry/backoff policy.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    conn: ConnectionManager,
}

fn job_key(queue: &str, id: &str) -> String {
    format!("q:{queue}:job:{id}")
}

fn state_key(queue: &str, id: &str) -> String {
    format!("q:{queue}:state:{id}")
}

fn wait_key(queue: &str) -> String {
    format!("q:{queue}:wait")
}

fn delayed_key(queue: &str) -> String {
    format!("q:{queue}:delayed")
}

fn completed_key(queue: &str) -> String {
    format!("q:{queue}:completed")
}

fn failed_key(queue: &str) -> String {
    format!("q:{queue}:failed")
}

fn paused_key(queue: &str) -> String {
    format!("q:{queue}:paused")
}

impl JobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn })
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    pub(crate) fn connection_manager(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Add a job. Delayed jobs park in the delayed set until due.
    pub async fn enqueue(
        &self,
        queue: &QueueSpec,
        name: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<String> {
        let delay_ms = opts.delay_ms;
        let job = Job::new(queue, name, payload, &opts);
        let mut conn = self.conn.clone();

        let json = serde_json::to_string(&job)?;
        let () = conn.set(job_key(queue.name, &job.id), json).await?;

        match delay_ms {
            Some(delay) if delay > 0 => {
                let promote_at = Utc::now().timestamp_millis() + delay as i64;
                let () = conn
                    .zadd(delayed_key(queue.name), &job.id, promote_at)
                    .await?;
                let () = conn
                    .set(state_key(queue.name, &job.id), JobState::Delayed.to_string())
                    .await?;
            }
            _ => {
                let () = conn
                    .set(state_key(queue.name, &job.id), JobState::Waiting.to_string())
                    .await?;
                let () = conn.lpush(wait_key(queue.name), &job.id).await?;
            }
        }

        debug!(queue = queue.name, job_id = %job.id, name, "Job enqueued");
        Ok(job.id)
    }

    pub async fn get_job(&self, queue: &str, job_id: &str) -> Result<Job> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(job_key(queue, job_id)).await?;
        let json = json.ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn get_state(&self, queue: &str, job_id: &str) -> Result<JobState> {
        let mut conn = self.conn.clone();
        let state: Option<String> = conn.get(state_key(queue, job_id)).await?;
        let Some(state) = state else {
            return Ok(JobState::Missing);
        };
        let state: JobState = state
            .parse()
            .map_err(|_| QueueError::JobNotFound(job_id.to_string()))?;
        if state == JobState::Waiting {
            let paused: bool = conn.exists(paused_key(queue)).await?;
            if paused {
                return Ok(JobState::Paused);
            }
        }
        Ok(state)
    }

    /// Pause a queue: consumers keep draining active jobs but waiting jobs
    /// report `paused` and stay queued until resume.
    pub async fn pause(&self, queue: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.set(paused_key(queue), 1).await?;
        Ok(())
    }

    pub async fn resume(&self, queue: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(paused_key(queue)).await?;
        Ok(())
    }

    /// Remove a job that has not started. Returns false when the job is
    /// already active or finished (it must then finalize cooperatively).
    pub async fn remove_waiting(&self, queue: &str, job_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let from_wait: i64 = conn.lrem(wait_key(queue), 0, job_id).await?;
        let from_delayed: i64 = conn.zrem(delayed_key(queue), job_id).await?;
        if from_wait > 0 || from_delayed > 0 {
            let () = conn.del(job_key(queue, job_id)).await?;
            let () = conn.del(state_key(queue, job_id)).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Run `concurrency` consumer slots until the shutdown signal flips.
    /// Each slot owns a dedicated connection so the blocking pop doesn't
    /// stall other Redis traffic.
    pub async fn consume<H: JobHandler>(
        &self,
        queue: QueueSpec,
        handler: std::sync::Arc<H>,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut tasks = Vec::new();
        for slot in 0..concurrency.max(1) {
            let this = self.clone();
            let handler = handler.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = this.consume_slot(queue, handler, shutdown, slot).await {
                    error!(queue = queue.name, slot, error = %e, "Consumer slot exited with error");
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    async fn consume_slot<H: JobHandler>(
        &self,
        queue: QueueSpec,
        handler: std::sync::Arc<H>,
        shutdown: watch::Receiver<bool>,
        slot: usize,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        info!(queue = queue.name, slot, "Consumer started");

        loop {
            if *shutdown.borrow() {
                info!(queue = queue.name, slot, "Consumer shutting down");
                return Ok(());
            }

            self.promote_delayed(&queue).await?;

            let paused: bool = {
                let mut shared = self.conn.clone();
                shared.exists(paused_key(queue.name)).await?
            };
            if paused {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }

            let popped: Option<(String, String)> =
                conn.brpop(wait_key(queue.name), 1.0).await?;
            let Some((_, job_id)) = popped else {
                continue;
            };

            if let Err(e) = self.process_job(&queue, &job_id, handler.as_ref()).await {
                // Process-level failure (job vanished, Redis hiccup) — the
                // handler's own errors are already folded into retry state.
                warn!(queue = queue.name, job_id = %job_id, error = %e, "Job processing error");
            }
        }
    }

    /// Move due delayed jobs back onto the wait list. ZREM decides the winner
    /// when several processes promote concurrently.
    async fn promote_delayed(&self, queue: &QueueSpec) -> Result<()> {
        let mut conn = self.conn.clone();
        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(delayed_key(queue.name), "-inf", now, 0, 100)
            .await?;
        for job_id in due {
            let removed: i64 = conn.zrem(delayed_key(queue.name), &job_id).await?;
            if removed == 0 {
                continue;
            }
            let () = conn
                .set(state_key(queue.name, &job_id), JobState::Waiting.to_string())
                .await?;
            let () = conn.lpush(wait_key(queue.name), &job_id).await?;
        }
        Ok(())
    }

    async fn process_job<H: JobHandler>(
        &self,
        queue: &QueueSpec,
        job_id: &str,
        handler: &H,
    ) -> Result<()> {
        let mut conn = self.conn.clone();

        let mut job = match self.get_job(queue.name, job_id).await {
            Ok(job) => job,
            Err(QueueError::JobNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        job.attempts_made += 1;
        job.processed_at_ms = Some(Utc::now().timestamp_millis());
        let () = conn
            .set(job_key(queue.name, job_id), serde_json::to_string(&job)?)
            .await?;
        let () = conn
            .set(state_key(queue.name, job_id), JobState::Active.to_string())
            .await?;

        let outcome = handler.handle(&job).await;
        let now = Utc::now().timestamp_millis();
        job.finished_at_ms = Some(now);

        match outcome {
            Ok(()) => {
                let () = conn
                    .set(job_key(queue.name, job_id), serde_json::to_string(&job)?)
                    .await?;
                let () = conn
                    .set(state_key(queue.name, job_id), JobState::Completed.to_string())
                    .await?;
                let () = conn.zadd(completed_key(queue.name), job_id, now).await?;
                self.purge_finished(queue, &job, true).await?;
            }
            Err(e) => {
                job.last_error = Some(e.to_string());
                if job.attempts_made < job.max_attempts {
                    let jitter: f64 = rand::rng().random();
                    let delay = backoff_delay_ms(job.backoff_delay_ms, job.attempts_made, jitter);
                    warn!(
                        queue = queue.name,
                        job_id,
                        attempt = job.attempts_made,
                        retry_in_ms = delay,
                        error = %e,
                        "Job failed, scheduling retry"
                    );
                    job.finished_at_ms = None;
                    let () = conn
                        .set(job_key(queue.name, job_id), serde_json::to_string(&job)?)
                        .await?;
                    let () = conn
                        .set(state_key(queue.name, job_id), JobState::Delayed.to_string())
                        .await?;
                    let () = conn
                        .zadd(delayed_key(queue.name), job_id, now + delay as i64)
                        .await?;
                } else {
                    error!(
                        queue = queue.name,
                        job_id,
                        attempts = job.attempts_made,
                        error = %e,
                        "Job failed terminally"
                    );
                    let () = conn
                        .set(job_key(queue.name, job_id), serde_json::to_string(&job)?)
                        .await?;
                    let () = conn
                        .set(state_key(queue.name, job_id), JobState::Failed.to_string())
                        .await?;
                    let () = conn.zadd(failed_key(queue.name), job_id, now).await?;
                    self.purge_finished(queue, &job, false).await?;
                }
            }
        }
        Ok(())
    }

    /// Apply the retention policy after a job finishes: age-expire both
    /// finished sets, and cap the completed set by count.
    async fn purge_finished(&self, queue: &QueueSpec, job: &Job, completed: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let now = Utc::now().timestamp_millis();

        let (set, age_secs) = if completed {
            (completed_key(queue.name), job.remove_on_complete_age_secs)
        } else {
            (failed_key(queue.name), job.remove_on_fail_age_secs)
        };

        let cutoff = now - (age_secs as i64) * 1_000;
        let expired: Vec<String> = conn.zrangebyscore(&set, "-inf", cutoff).await?;
        for id in &expired {
            let () = conn.del(job_key(queue.name, id)).await?;
            let () = conn.del(state_key(queue.name, id)).await?;
        }
        if !expired.is_empty() {
            let () = conn.zrembyscore(&set, "-inf", cutoff).await?;
        }

        if completed {
            let count: i64 = conn.zcard(&set).await?;
            let excess = count - job.remove_on_complete_count as i64;
            if excess > 0 {
                let last = (excess - 1) as isize;
                let oldest: Vec<String> = conn.zrange(&set, 0, last).await?;
                for id in &oldest {
                    let () = conn.del(job_key(queue.name, id)).await?;
                    let () = conn.del(state_key(queue.name, id)).await?;
                }
                let () = conn.zremrangebyrank(&set, 0, last).await?;
            }
        }
        Ok(())
    }
}
