pub mod config;
pub mod error;
pub mod hash;
pub mod logs;
pub mod scraper;
pub mod types;

pub use config::Config;
pub use error::{FieldError, ValidationError};
pub use hash::{content_hash, occurrence_hash, series_content_hash};
pub use logs::{LogEntry, LogLevel};
pub use scraper::{RawEvent, ScrapeJobData, ScrapeMode, SeriesInstance};
pub use types::*;
