use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Static definition of a named queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueSpec {
    pub name: &'static str,
    pub max_attempts: u32,
    pub backoff_delay_ms: u64,
}

/// Per-enqueue overrides and retention policy.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Explicit job id; generated when absent. Repeatable fires use stable
    /// ids so a cron tick is delivered once.
    pub job_id: Option<String>,
    pub max_attempts: Option<u32>,
    pub backoff_delay_ms: Option<u64>,
    /// Completed jobs kept this long, capped by count.
    pub remove_on_complete_age_secs: u64,
    pub remove_on_complete_count: u64,
    /// Failed jobs kept this long.
    pub remove_on_fail_age_secs: u64,
    /// Delay before the job becomes available.
    pub delay_ms: Option<u64>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            job_id: None,
            max_attempts: None,
            backoff_delay_ms: None,
            remove_on_complete_age_secs: 3_600,
            remove_on_complete_count: 100,
            remove_on_fail_age_secs: 86_400,
            delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Paused,
    Completed,
    Failed,
    Missing,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Active => write!(f, "active"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::Paused => write!(f, "paused"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Missing => write!(f, "missing"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "delayed" => Ok(Self::Delayed),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "missing" => Ok(Self::Missing),
            other => Err(format!("unknown JobState: {other}")),
        }
    }
}

/// A job as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_delay_ms: u64,
    pub remove_on_complete_age_secs: u64,
    pub remove_on_complete_count: u64,
    pub remove_on_fail_age_secs: u64,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    pub(crate) fn new(
        queue: &QueueSpec,
        name: &str,
        payload: serde_json::Value,
        opts: &JobOptions,
    ) -> Self {
        Self {
            id: opts
                .job_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            queue: queue.name.to_string(),
            name: name.to_string(),
            payload,
            attempts_made: 0,
            max_attempts: opts.max_attempts.unwrap_or(queue.max_attempts),
            backoff_delay_ms: opts.backoff_delay_ms.unwrap_or(queue.backoff_delay_ms),
            remove_on_complete_age_secs: opts.remove_on_complete_age_secs,
            remove_on_complete_count: opts.remove_on_complete_count,
            remove_on_fail_age_secs: opts.remove_on_fail_age_secs,
            created_at_ms: Utc::now().timestamp_millis(),
            processed_at_ms: None,
            finished_at_ms: None,
            last_error: None,
        }
    }

    pub fn data<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Retry delay after a failed attempt: `delay · 2^(attempts_made − 1)`,
/// plus up to 10% jitter so synchronized failures don't retry in lockstep.
pub fn backoff_delay_ms(base_delay_ms: u64, attempts_made: u32, jitter: f64) -> u64 {
    debug_assert!((0.0..=1.0).contains(&jitter));
    let exponent = attempts_made.saturating_sub(1).min(16);
    let raw = base_delay_ms.saturating_mul(1u64 << exponent);
    raw + (raw as f64 * 0.10 * jitter) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay_ms(2_000, 1, 0.0), 2_000);
        assert_eq!(backoff_delay_ms(2_000, 2, 0.0), 4_000);
        assert_eq!(backoff_delay_ms(2_000, 3, 0.0), 8_000);
    }

    #[test]
    fn backoff_jitter_is_bounded() {
        let base = backoff_delay_ms(5_000, 2, 0.0);
        let jittered = backoff_delay_ms(5_000, 2, 1.0);
        assert!(jittered >= base);
        assert!(jittered <= base + base / 10);
    }

    #[test]
    fn backoff_exponent_is_capped() {
        // Pathological attempt counts must not overflow.
        let d = backoff_delay_ms(2_000, 1_000, 0.0);
        assert_eq!(d, 2_000 * (1 << 16));
    }

    #[test]
    fn job_inherits_queue_defaults() {
        let spec = QueueSpec {
            name: "scrape-queue",
            max_attempts: 3,
            backoff_delay_ms: 2_000,
        };
        let job = Job::new(&spec, "scrape", serde_json::json!({}), &JobOptions::default());
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.backoff_delay_ms, 2_000);
        assert_eq!(job.attempts_made, 0);
        assert!(!job.id.is_empty());
    }

    #[test]
    fn job_options_override_defaults() {
        let spec = QueueSpec {
            name: "schedule-queue",
            max_attempts: 1,
            backoff_delay_ms: 1_000,
        };
        let opts = JobOptions {
            job_id: Some("schedule:abc:123".into()),
            max_attempts: Some(5),
            ..Default::default()
        };
        let job = Job::new(&spec, "fire", serde_json::json!({}), &opts);
        assert_eq!(job.id, "schedule:abc:123");
        assert_eq!(job.max_attempts, 5);
    }
}
