//! Repeatable (cron) job registry.
//!
//! Schedules register here with a stable job id; the registry stores the
//! spec and the next fire time in a sorted set. A tick loop promotes due
//! entries into ordinary jobs. A `SET NX` fire marker keyed by
//! `(repeat_key, fire_ms)` guarantees one delivery per tick even when
//! several processes run the loop.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{QueueError, Result};
use crate::job::JobOptions;
use crate::queue::JobQueue;
use crate::{INSTAGRAM_SCRAPE_QUEUE, MATCH_QUEUE, SCHEDULE_QUEUE, SCRAPE_QUEUE};

/// Normalize a 5-field cron expression to the 6-field form the cron crate
/// parses (seconds prepended). Validates the expression.
pub fn normalize_cron(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(QueueError::InvalidCron {
            expr: expr.to_string(),
            message: format!("expected 5 fields, got {}", fields.len()),
        });
    }
    let normalized = format!("0 {}", fields.join(" "));
    Schedule::from_str(&normalized).map_err(|e| QueueError::InvalidCron {
        expr: expr.to_string(),
        message: e.to_string(),
    })?;
    Ok(normalized)
}

/// Next fire time of a 5-field cron expression, evaluated in `timezone`,
/// strictly after `after`.
pub fn next_fire(expr: &str, timezone: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let normalized = normalize_cron(expr)?;
    let tz: Tz = timezone
        .parse()
        .map_err(|_| QueueError::InvalidTimezone(timezone.to_string()))?;
    // Parse can't fail here; normalize_cron already validated.
    let schedule = Schedule::from_str(&normalized).map_err(|e| QueueError::InvalidCron {
        expr: expr.to_string(),
        message: e.to_string(),
    })?;
    let next = schedule
        .after(&after.with_timezone(&tz))
        .next()
        .ok_or_else(|| QueueError::InvalidCron {
            expr: expr.to_string(),
            message: "no upcoming fire time".to_string(),
        })?;
    Ok(next.with_timezone(&Utc))
}

/// What to enqueue on each fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatableSpec {
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    /// 5-field cron expression.
    pub cron: String,
    pub timezone: String,
    /// Stable id; each fire enqueues `<job_id>:<fire_ms>`.
    pub job_id: String,
}

impl RepeatableSpec {
    /// The opaque handle identifying this registration. Changing the cron or
    /// timezone yields a different key, so updates are remove + register.
    pub fn repeat_key(&self) -> String {
        format!("{}::{}::{}::{}", self.queue, self.job_id, self.cron, self.timezone)
    }
}

fn spec_storage_key(repeat_key: &str) -> String {
    format!("repeat:spec:{repeat_key}")
}

const NEXT_FIRE_INDEX: &str = "repeat:next";

#[derive(Clone)]
pub struct RepeatableRegistry {
    conn: ConnectionManager,
}

impl RepeatableRegistry {
    pub fn new(queue: &JobQueue) -> Self {
        Self {
            conn: queue.connection_manager(),
        }
    }

    /// Register a repeatable. Returns the repeat key to persist alongside
    /// the schedule row.
    pub async fn register(&self, spec: RepeatableSpec) -> Result<String> {
        let repeat_key = spec.repeat_key();
        let next = next_fire(&spec.cron, &spec.timezone, Utc::now())?;

        let mut conn = self.conn.clone();
        let () = conn
            .set(spec_storage_key(&repeat_key), serde_json::to_string(&spec)?)
            .await?;
        let () = conn
            .zadd(NEXT_FIRE_INDEX, &repeat_key, next.timestamp_millis())
            .await?;

        info!(
            repeat_key = %repeat_key,
            cron = %spec.cron,
            timezone = %spec.timezone,
            next_fire = %next,
            "Repeatable registered"
        );
        Ok(repeat_key)
    }

    pub async fn remove(&self, repeat_key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(spec_storage_key(repeat_key)).await?;
        let () = conn.zrem(NEXT_FIRE_INDEX, repeat_key).await?;
        info!(repeat_key, "Repeatable removed");
        Ok(())
    }

    pub async fn exists(&self, repeat_key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(spec_storage_key(repeat_key)).await?)
    }

    /// Promote every due repeatable into an ordinary job, exactly once per
    /// tick per registration.
    pub async fn tick(&self, queue: &JobQueue) -> Result<()> {
        let mut conn = self.conn.clone();
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore_limit(NEXT_FIRE_INDEX, "-inf", now_ms, 0, 100)
            .await?;

        for repeat_key in due {
            let json: Option<String> = conn.get(spec_storage_key(&repeat_key)).await?;
            let Some(json) = json else {
                // Registration was removed; drop the stale index entry.
                let () = conn.zrem(NEXT_FIRE_INDEX, &repeat_key).await?;
                continue;
            };
            let spec: RepeatableSpec = serde_json::from_str(&json)?;

            let fire_ms: i64 = conn
                .zscore::<_, _, Option<i64>>(NEXT_FIRE_INDEX, &repeat_key)
                .await?
                .unwrap_or(now_ms);

            // One delivery per tick across processes.
            let marker = format!("repeat:fired:{repeat_key}:{fire_ms}");
            let acquired: bool = redis::cmd("SET")
                .arg(&marker)
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(3_600)
                .query_async(&mut conn)
                .await?;

            if acquired {
                let Some(queue_spec) = spec_for_queue(&spec.queue) else {
                    error!(queue = %spec.queue, repeat_key = %repeat_key, "Unknown queue in repeatable spec");
                    let () = conn.zrem(NEXT_FIRE_INDEX, &repeat_key).await?;
                    continue;
                };
                let opts = JobOptions {
                    job_id: Some(format!("{}:{fire_ms}", spec.job_id)),
                    ..Default::default()
                };
                queue
                    .enqueue(&queue_spec, &spec.name, spec.payload.clone(), opts)
                    .await?;
                debug!(repeat_key = %repeat_key, "Repeatable fired");
            }

            match next_fire(&spec.cron, &spec.timezone, now) {
                Ok(next) => {
                    let () = conn
                        .zadd(NEXT_FIRE_INDEX, &repeat_key, next.timestamp_millis())
                        .await?;
                }
                Err(e) => {
                    warn!(repeat_key = %repeat_key, error = %e, "Repeatable has no next fire, dropping");
                    let () = conn.zrem(NEXT_FIRE_INDEX, &repeat_key).await?;
                }
            }
        }
        Ok(())
    }

    /// Drive `tick` until shutdown.
    pub async fn run(&self, queue: JobQueue, shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            if *shutdown.borrow() {
                info!("Repeatable tick loop shutting down");
                return;
            }
            interval.tick().await;
            if let Err(e) = self.tick(&queue).await {
                error!(error = %e, "Repeatable tick failed");
            }
        }
    }
}

/// Resolve a queue name back to its static spec.
pub fn spec_for_queue(name: &str) -> Option<crate::job::QueueSpec> {
    match name {
        "scrape-queue" => Some(SCRAPE_QUEUE),
        "instagram-scrape-queue" => Some(INSTAGRAM_SCRAPE_QUEUE),
        "match-queue" => Some(MATCH_QUEUE),
        "schedule-queue" => Some(SCHEDULE_QUEUE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_cron_normalizes() {
        assert_eq!(normalize_cron("0 6 * * *").unwrap(), "0 0 6 * * *");
        assert_eq!(normalize_cron("*/15 * * * *").unwrap(), "0 */15 * * * *");
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        assert!(normalize_cron("0 6 * *").is_err());
        assert!(normalize_cron("0 0 6 * * *").is_err());
        assert!(normalize_cron("").is_err());
    }

    #[test]
    fn garbage_cron_is_rejected() {
        assert!(normalize_cron("a b c d e").is_err());
    }

    #[test]
    fn next_fire_respects_timezone() {
        // 06:00 in Vancouver is 14:00 UTC (PST, winter).
        let after = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let next = next_fire("0 6 * * *", "America/Vancouver", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn next_fire_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2025, 1, 15, 14, 0, 0).unwrap();
        let next = next_fire("0 6 * * *", "America/Vancouver", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 16, 14, 0, 0).unwrap());
    }

    #[test]
    fn step_expressions_fire_on_the_interval() {
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 10, 2, 30).unwrap();
        let next = next_fire("*/15 * * * *", "UTC", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = next_fire("0 6 * * *", "Mars/Olympus", Utc::now()).unwrap_err();
        assert!(matches!(err, QueueError::InvalidTimezone(_)));
    }

    #[test]
    fn repeat_key_changes_with_cron_and_tz() {
        let base = RepeatableSpec {
            queue: "schedule-queue".into(),
            name: "fire".into(),
            payload: serde_json::json!({}),
            cron: "0 6 * * *".into(),
            timezone: "UTC".into(),
            job_id: "schedule:abc".into(),
        };
        let mut changed_cron = base.clone();
        changed_cron.cron = "0 7 * * *".into();
        let mut changed_tz = base.clone();
        changed_tz.timezone = "America/Vancouver".into();

        assert_ne!(base.repeat_key(), changed_cron.repeat_key());
        assert_ne!(base.repeat_key(), changed_tz.repeat_key());
        assert_eq!(base.repeat_key(), base.clone().repeat_key());
    }
}
