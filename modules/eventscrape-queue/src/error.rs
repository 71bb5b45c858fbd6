use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
