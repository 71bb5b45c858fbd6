use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed date: {0:?}")]
    MalformedDate(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error(transparent)]
    Store(#[from] eventscrape_store::StoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IngestError {
    /// Per-item failures are recorded into the run and skipped; anything
    /// else aborts the job and goes through retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::MalformedDate(_) | IngestError::UnknownTimezone(_)
        )
    }
}
