//! Per-run append-only log streams.
//!
//! Entries go into `logs:<run_id>` via XADD and come back out either as a
//! historical range (oldest first) or a blocking tail for SSE. Each tail
//! session opens a dedicated connection so its blocking reads don't stall
//! anything else; readers trim the stream to the retention window on open.

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use uuid::Uuid;

use eventscrape_common::logs::LogEntry;

use crate::error::Result;
use crate::queue::JobQueue;

/// Streams are trimmed to roughly this many entries when a reader opens.
pub const LOG_RETENTION_ENTRIES: usize = 2_000;

/// Tail reads block for this long before returning empty.
pub const TAIL_BLOCK_MS: usize = 5_000;

fn stream_key(run_id: Uuid) -> String {
    format!("logs:{run_id}")
}

#[derive(Clone)]
pub struct LogStream {
    client: redis::Client,
    conn: ConnectionManager,
}

/// A dedicated tail session. Dropping it drops its connection, releasing any
/// blocked read server-side.
pub struct LogTail {
    conn: redis::aio::MultiplexedConnection,
    key: String,
    cursor: String,
}

impl LogStream {
    pub fn new(queue: &JobQueue) -> Self {
        Self {
            client: queue.client().clone(),
            conn: queue.connection_manager(),
        }
    }

    /// Append one entry; returns the assigned stream id.
    pub async fn append(&self, entry: &LogEntry) -> Result<String> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(entry)?;
        let id: String = conn
            .xadd(stream_key(entry.run_id), "*", &[("data", json)])
            .await?;
        Ok(id)
    }

    /// Trim the stream to the retention window. Called when a reader opens.
    pub async fn trim(&self, run_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = redis::cmd("XTRIM")
            .arg(stream_key(run_id))
            .arg("MAXLEN")
            .arg("~")
            .arg(LOG_RETENTION_ENTRIES)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Historical range, oldest first. `start`/`end` default to the full
    /// stream (`-` / `+`).
    pub async fn history(
        &self,
        run_id: Uuid,
        start: Option<&str>,
        end: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        self.trim(run_id).await?;
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamRangeReply = conn
            .xrange_count(
                stream_key(run_id),
                start.unwrap_or("-"),
                end.unwrap_or("+"),
                limit,
            )
            .await?;
        Ok(parse_range(reply))
    }

    /// Open a tail session starting after `cursor` (or from the beginning).
    pub async fn tail(&self, run_id: Uuid, cursor: Option<String>) -> Result<LogTail> {
        self.trim(run_id).await?;
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(LogTail {
            conn,
            key: stream_key(run_id),
            cursor: cursor.unwrap_or_else(|| "0".to_string()),
        })
    }
}

impl LogTail {
    /// Block up to the tail window for new entries; empty when none arrived.
    /// Advances the cursor past everything returned.
    pub async fn next_batch(&mut self) -> Result<Vec<LogEntry>> {
        let opts = StreamReadOptions::default()
            .block(TAIL_BLOCK_MS)
            .count(100);
        let reply: StreamReadReply = self
            .conn
            .xread_options(&[&self.key], &[&self.cursor], &opts)
            .await?;

        let mut entries = Vec::new();
        for stream in reply.keys {
            for id in stream.ids {
                self.cursor = id.id.clone();
                if let Some(entry) = parse_entry(&id.id, id.map.get("data")) {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }
}

fn parse_range(reply: redis::streams::StreamRangeReply) -> Vec<LogEntry> {
    reply
        .ids
        .iter()
        .filter_map(|id| parse_entry(&id.id, id.map.get("data")))
        .collect()
}

fn parse_entry(id: &str, data: Option<&redis::Value>) -> Option<LogEntry> {
    let value = data?;
    let json: String = redis::from_redis_value(value).ok()?;
    let mut entry: LogEntry = serde_json::from_str(&json).ok()?;
    entry.id = id.to_string();
    Some(entry)
}
