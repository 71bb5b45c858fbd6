use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Source ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Website,
    Instagram,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Website => write!(f, "website"),
            SourceType::Instagram => write!(f, "instagram"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            "instagram" => Ok(Self::Instagram),
            other => Err(format!("unknown SourceType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    #[default]
    Manual,
    Auto,
}

impl std::fmt::Display for ClassificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationMode::Manual => write!(f, "manual"),
            ClassificationMode::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for ClassificationMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown ClassificationMode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstagramScraperType {
    #[default]
    Apify,
    PrivateApi,
}

impl std::fmt::Display for InstagramScraperType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstagramScraperType::Apify => write!(f, "apify"),
            InstagramScraperType::PrivateApi => write!(f, "private_api"),
        }
    }
}

impl std::str::FromStr for InstagramScraperType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "apify" => Ok(Self::Apify),
            "private_api" => Ok(Self::PrivateApi),
            other => Err(format!("unknown InstagramScraperType: {other}")),
        }
    }
}

/// A configured scrape target. Soft-disabled via `active = false`, never
/// deleted while runs reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    /// Stable key identifying the scraper module that handles this source.
    pub module_key: String,
    pub active: bool,
    pub default_timezone: String,
    pub rate_limit_per_min: Option<i32>,
    pub source_type: SourceType,
    pub instagram_username: Option<String>,
    pub classification_mode: Option<ClassificationMode>,
    pub instagram_scraper_type: Option<InstagramScraperType>,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Run ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Partial,
    Error,
}

impl RunStatus {
    /// Terminal states carry a `finished_at` timestamp; a run never moves
    /// backwards out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Partial | RunStatus::Error)
    }

    /// Ordering used to enforce forward-only transitions.
    fn rank(&self) -> u8 {
        match self {
            RunStatus::Queued => 0,
            RunStatus::Running => 1,
            RunStatus::Success | RunStatus::Partial | RunStatus::Error => 2,
        }
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown RunStatus: {other}")),
        }
    }
}

/// A structured per-item failure recorded on a run. Recoverable failures
/// accumulate here while the job continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunErrorEntry {
    pub message: String,
    /// What the worker was doing when the failure happened, e.g.
    /// "parse_event", "detail_fetch", "wordpress_upload".
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl RunErrorEntry {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: context.into(),
            item: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }
}

/// One invocation of a scraper against one source, or one child within an
/// Instagram batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub source_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub pages_crawled: i32,
    pub events_found: i32,
    pub errors: Vec<RunErrorEntry>,
    pub parent_run_id: Option<Uuid>,
    /// Batch context and cancellation markers (`cancelled: true`).
    pub metadata: Option<serde_json::Value>,
}

// --- Series / occurrences ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceType {
    Single,
    MultiDay,
    AllDay,
    Recurring,
    Virtual,
}

impl std::fmt::Display for OccurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OccurrenceType::Single => write!(f, "single"),
            OccurrenceType::MultiDay => write!(f, "multi_day"),
            OccurrenceType::AllDay => write!(f, "all_day"),
            OccurrenceType::Recurring => write!(f, "recurring"),
            OccurrenceType::Virtual => write!(f, "virtual"),
        }
    }
}

impl std::str::FromStr for OccurrenceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "multi_day" => Ok(Self::MultiDay),
            "all_day" => Ok(Self::AllDay),
            "recurring" => Ok(Self::Recurring),
            "virtual" => Ok(Self::Virtual),
            other => Err(format!("unknown OccurrenceType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl std::fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecurrenceType::None => write!(f, "none"),
            RecurrenceType::Daily => write!(f, "daily"),
            RecurrenceType::Weekly => write!(f, "weekly"),
            RecurrenceType::Monthly => write!(f, "monthly"),
            RecurrenceType::Yearly => write!(f, "yearly"),
            RecurrenceType::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for RecurrenceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown RecurrenceType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Canceled,
    Postponed,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Scheduled => write!(f, "scheduled"),
            EventStatus::Canceled => write!(f, "canceled"),
            EventStatus::Postponed => write!(f, "postponed"),
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "canceled" => Ok(Self::Canceled),
            "postponed" => Ok(Self::Postponed),
            other => Err(format!("unknown EventStatus: {other}")),
        }
    }
}

// --- Matches ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Open,
    Confirmed,
    Rejected,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Open => write!(f, "open"),
            MatchStatus::Confirmed => write!(f, "confirmed"),
            MatchStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown MatchStatus: {other}")),
        }
    }
}

// --- Canonical events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    #[default]
    New,
    Ready,
    Exported,
    Ignored,
}

impl std::fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalStatus::New => write!(f, "new"),
            CanonicalStatus::Ready => write!(f, "ready"),
            CanonicalStatus::Exported => write!(f, "exported"),
            CanonicalStatus::Ignored => write!(f, "ignored"),
        }
    }
}

impl std::str::FromStr for CanonicalStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "ready" => Ok(Self::Ready),
            "exported" => Ok(Self::Exported),
            "ignored" => Ok(Self::Ignored),
            other => Err(format!("unknown CanonicalStatus: {other}")),
        }
    }
}

// --- Schedules ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Scrape,
    WordpressExport,
    InstagramScrape,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleType::Scrape => write!(f, "scrape"),
            ScheduleType::WordpressExport => write!(f, "wordpress_export"),
            ScheduleType::InstagramScrape => write!(f, "instagram_scrape"),
        }
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scrape" => Ok(Self::Scrape),
            "wordpress_export" => Ok(Self::WordpressExport),
            "instagram_scrape" => Ok(Self::InstagramScrape),
            other => Err(format!("unknown ScheduleType: {other}")),
        }
    }
}

/// Which Instagram accounts an instagram_scrape schedule covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstagramScope {
    #[default]
    AllActive,
    AllInactive,
    Custom,
}

impl std::fmt::Display for InstagramScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstagramScope::AllActive => write!(f, "all_active"),
            InstagramScope::AllInactive => write!(f, "all_inactive"),
            InstagramScope::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for InstagramScope {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all_active" => Ok(Self::AllActive),
            "all_inactive" => Ok(Self::AllInactive),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown InstagramScope: {other}")),
        }
    }
}

/// Per-type schedule configuration, discriminated by `schedule_type` on the
/// schedule row. Stored as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    Scrape {
        #[serde(default)]
        test_mode: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scrape_mode: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pagination_options: Option<serde_json::Value>,
    },
    WordpressExport {
        /// Window start, days relative to the fire time (0 = today).
        #[serde(default)]
        start_offset_days: i64,
        /// Window end, days relative to the fire time.
        #[serde(default = "default_end_offset")]
        end_offset_days: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        city: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        source_ids: Vec<Uuid>,
        #[serde(default)]
        update_if_exists: bool,
        #[serde(default)]
        include_media: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_status: Option<String>,
    },
    InstagramScrape {
        #[serde(default)]
        scope: InstagramScope,
        /// Only consulted when `scope` is `custom`.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        account_ids: Vec<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_size: Option<u32>,
    },
}

fn default_end_offset() -> i64 {
    30
}

/// A cron-driven job definition. `repeat_key` is the opaque handle returned
/// by the queue layer when the schedule is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub schedule_type: ScheduleType,
    pub source_id: Option<Uuid>,
    pub wordpress_settings_id: Option<Uuid>,
    /// 5-field cron expression (minute hour dom month dow).
    pub cron: String,
    /// IANA timezone name the cron expression is evaluated in.
    pub timezone: String,
    pub active: bool,
    pub repeat_key: Option<String>,
    pub config: ScheduleConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Exports ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    Csv,
    Json,
    Ics,
    WpRest,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Ics => write!(f, "ics"),
            ExportFormat::WpRest => write!(f, "wp-rest"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "ics" => Ok(Self::Ics),
            "wp-rest" => Ok(Self::WpRest),
            other => Err(format!("unknown ExportFormat: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Processing,
    Success,
    Error,
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportStatus::Processing => write!(f, "processing"),
            ExportStatus::Success => write!(f, "success"),
            ExportStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ExportStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown ExportStatus: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn run_status_never_moves_backwards() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Success));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Partial));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Error));

        assert!(!RunStatus::Running.can_transition_to(RunStatus::Queued));
        assert!(!RunStatus::Success.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Error.can_transition_to(RunStatus::Partial));
        assert!(!RunStatus::Partial.can_transition_to(RunStatus::Success));
    }

    #[test]
    fn queued_can_finish_directly() {
        // A queued job removed by cancellation finalizes without ever running.
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Partial));
    }

    #[test]
    fn enum_round_trips() {
        for s in ["website", "instagram"] {
            assert_eq!(SourceType::from_str(s).unwrap().to_string(), s);
        }
        for s in ["single", "multi_day", "all_day", "recurring", "virtual"] {
            assert_eq!(OccurrenceType::from_str(s).unwrap().to_string(), s);
        }
        for s in ["none", "daily", "weekly", "monthly", "yearly", "custom"] {
            assert_eq!(RecurrenceType::from_str(s).unwrap().to_string(), s);
        }
        for s in ["csv", "json", "ics", "wp-rest"] {
            assert_eq!(ExportFormat::from_str(s).unwrap().to_string(), s);
        }
        for s in ["scrape", "wordpress_export", "instagram_scrape"] {
            assert_eq!(ScheduleType::from_str(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn schedule_config_is_tagged_by_kind() {
        let cfg = ScheduleConfig::InstagramScrape {
            scope: InstagramScope::Custom,
            account_ids: vec![Uuid::new_v4()],
            post_limit: Some(25),
            batch_size: None,
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["kind"], "instagram_scrape");
        assert_eq!(json["scope"], "custom");

        let back: ScheduleConfig = serde_json::from_value(json).unwrap();
        match back {
            ScheduleConfig::InstagramScrape { post_limit, .. } => {
                assert_eq!(post_limit, Some(25));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
