//! Cooperative cancellation flags.
//!
//! Cancelling a queued job removes it outright; cancelling an active job
//! sets a flag the worker polls at every safe point. The flag value moves
//! `requested` → `cancelled` when the worker finalizes.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::JobQueue;

/// Flags expire on their own after a day in case nobody cleans up.
const FLAG_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelState {
    Requested,
    Cancelled,
}

impl std::fmt::Display for CancelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelState::Requested => write!(f, "requested"),
            CancelState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CancelState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown CancelState: {other}")),
        }
    }
}

fn flag_key(queue: &str, job_id: &str) -> String {
    format!("{queue}:cancel:{job_id}")
}

#[derive(Clone)]
pub struct CancelFlags {
    conn: ConnectionManager,
}

impl CancelFlags {
    pub fn new(queue: &JobQueue) -> Self {
        Self {
            conn: queue.connection_manager(),
        }
    }

    pub async fn set(&self, queue: &str, job_id: &str, state: CancelState) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(flag_key(queue, job_id), state.to_string(), FLAG_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get(&self, queue: &str, job_id: &str) -> Result<Option<CancelState>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(flag_key(queue, job_id)).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// True when cancellation has been requested (in either state). The
    /// worker polls this at every I/O boundary.
    pub async fn is_requested(&self, queue: &str, job_id: &str) -> Result<bool> {
        Ok(self.get(queue, job_id).await?.is_some())
    }

    pub async fn clear(&self, queue: &str, job_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(flag_key(queue, job_id)).await?;
        Ok(())
    }
}
