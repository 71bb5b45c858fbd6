//! Wire shape of per-run log entries, shared by the worker (producer), the
//! stream store, and the SSE endpoint (consumer).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric log levels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogLevel(pub u8);

impl LogLevel {
    pub const TRACE: LogLevel = LogLevel(10);
    pub const DEBUG: LogLevel = LogLevel(20);
    pub const INFO: LogLevel = LogLevel(30);
    pub const WARN: LogLevel = LogLevel(40);
    pub const ERROR: LogLevel = LogLevel(50);

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            10 => "trace",
            20 => "debug",
            30 => "info",
            40 => "warn",
            50 => "error",
            _ => "info",
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(LogLevel(u8::deserialize(deserializer)?))
    }
}

/// One entry in a run's append-only log stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Stream entry id assigned by the store; empty until appended.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub level: LogLevel,
    pub msg: String,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Original structured payload, when the producer had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LogEntry {
    pub fn new(run_id: Uuid, level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            level,
            msg: msg.into(),
            run_id,
            source: None,
            raw: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_serialize_as_numbers() {
        let entry = LogEntry::new(Uuid::new_v4(), LogLevel::WARN, "slow page");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], 40);
        assert_eq!(json["msg"], "slow page");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn level_labels() {
        assert_eq!(LogLevel::INFO.label(), "info");
        assert_eq!(LogLevel::ERROR.label(), "error");
        assert_eq!(LogLevel(99).label(), "info");
    }
}
