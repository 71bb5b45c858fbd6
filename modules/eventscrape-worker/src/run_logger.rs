//! Per-run logger: every line goes to the process tracing subscriber and to
//! the run's Redis stream for live tailing. Stream append failures are
//! logged and swallowed — losing a log line must not abort a scrape.

use uuid::Uuid;

use eventscrape_common::logs::{LogEntry, LogLevel};
use eventscrape_queue::LogStream;

#[derive(Clone)]
pub struct RunLogger {
    run_id: Uuid,
    source: Option<String>,
    stream: LogStream,
}

impl RunLogger {
    pub fn new(run_id: Uuid, source: Option<String>, stream: LogStream) -> Self {
        Self {
            run_id,
            source,
            stream,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    async fn emit(&self, level: LogLevel, msg: &str) {
        let mut entry = LogEntry::new(self.run_id, level, msg);
        if let Some(source) = &self.source {
            entry = entry.with_source(source.clone());
        }
        if let Err(e) = self.stream.append(&entry).await {
            tracing::warn!(run_id = %self.run_id, error = %e, "Failed to append run log entry");
        }
    }

    pub async fn debug(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::debug!(run_id = %self.run_id, "{msg}");
        self.emit(LogLevel::DEBUG, msg).await;
    }

    pub async fn info(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::info!(run_id = %self.run_id, "{msg}");
        self.emit(LogLevel::INFO, msg).await;
    }

    pub async fn warn(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::warn!(run_id = %self.run_id, "{msg}");
        self.emit(LogLevel::WARN, msg).await;
    }

    pub async fn error(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::error!(run_id = %self.run_id, "{msg}");
        self.emit(LogLevel::ERROR, msg).await;
    }
}
