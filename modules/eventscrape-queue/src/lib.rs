//! Redis-backed queue and stream layer: named job queues with retry/backoff
//! and retention, a repeatable cron registry, cooperative cancel flags, and
//! per-run log streams.

pub mod cancel;
pub mod error;
pub mod job;
pub mod logs;
pub mod queue;
pub mod repeatable;

pub use cancel::{CancelFlags, CancelState};
pub use error::{QueueError, Result};
pub use job::{backoff_delay_ms, Job, JobOptions, JobState, QueueSpec};
pub use logs::LogStream;
pub use queue::{JobHandler, JobQueue};
pub use repeatable::{next_fire, normalize_cron, spec_for_queue, RepeatableRegistry, RepeatableSpec};

/// Website scrapes: 3 attempts, 2 s base delay.
pub const SCRAPE_QUEUE: QueueSpec = QueueSpec {
    name: "scrape-queue",
    max_attempts: 3,
    backoff_delay_ms: 2_000,
};

/// Instagram scrapes: 3 attempts, 5 s base delay.
pub const INSTAGRAM_SCRAPE_QUEUE: QueueSpec = QueueSpec {
    name: "instagram-scrape-queue",
    max_attempts: 3,
    backoff_delay_ms: 5_000,
};

/// Match computation: 2 attempts, 5 s base delay.
pub const MATCH_QUEUE: QueueSpec = QueueSpec {
    name: "match-queue",
    max_attempts: 2,
    backoff_delay_ms: 5_000,
};

/// Schedule fires: trigger-only, no business retry.
pub const SCHEDULE_QUEUE: QueueSpec = QueueSpec {
    name: "schedule-queue",
    max_attempts: 1,
    backoff_delay_ms: 1_000,
};
