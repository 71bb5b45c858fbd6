use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Stores
    pub database_url: String,
    pub redis_url: String,

    // API server
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub api_rate_limit_max: u32,
    pub api_rate_limit_time_window_secs: u64,

    // Artifact directories
    pub export_dir: String,
    pub instagram_images_dir: String,
    pub backup_dir: String,

    // Worker
    pub worker_concurrency: usize,
    pub browser_pool_size: usize,
    pub playwright_headless: bool,
}

impl Config {
    /// Load config for the API server.
    /// Panics with a clear message if required vars are missing.
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: required_env("REDIS_URL"),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .expect("PORT must be a number"),
            cors_allowed_origins: split_csv(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default()),
            api_rate_limit_max: parse_or("API_RATE_LIMIT_MAX", 100),
            api_rate_limit_time_window_secs: parse_or("API_RATE_LIMIT_TIME_WINDOW", 60),
            export_dir: env::var("EXPORT_DIR").unwrap_or_else(|_| "./exports".to_string()),
            instagram_images_dir: env::var("INSTAGRAM_IMAGES_DIR")
                .unwrap_or_else(|_| "./instagram-images".to_string()),
            backup_dir: env::var("BACKUP_DIR").unwrap_or_else(|_| "./backups".to_string()),
            worker_concurrency: 0,
            browser_pool_size: 0,
            playwright_headless: true,
        }
    }

    /// Load config for a worker process (no HTTP surface).
    pub fn worker_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: required_env("REDIS_URL"),
            port: 0,
            cors_allowed_origins: Vec::new(),
            api_rate_limit_max: 0,
            api_rate_limit_time_window_secs: 0,
            export_dir: env::var("EXPORT_DIR").unwrap_or_else(|_| "./exports".to_string()),
            instagram_images_dir: env::var("INSTAGRAM_IMAGES_DIR")
                .unwrap_or_else(|_| "./instagram-images".to_string()),
            backup_dir: env::var("BACKUP_DIR").unwrap_or_else(|_| "./backups".to_string()),
            worker_concurrency: parse_or("WORKER_CONCURRENCY", 1),
            browser_pool_size: parse_or("BROWSER_POOL_SIZE", 3),
            playwright_headless: env::var("PLAYWRIGHT_HEADLESS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    /// Log connection targets without leaking credentials.
    pub fn log_redacted(&self) {
        for (name, value) in [
            ("DATABASE_URL", &self.database_url),
            ("REDIS_URL", &self.redis_url),
        ] {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_drops_empties() {
        assert_eq!(
            split_csv(" https://a.example , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(split_csv("").is_empty());
    }
}
