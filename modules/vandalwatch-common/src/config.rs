use std::env;
use std::time::Duration;

use crate::error::VandalWatchError;

const DEFAULT_KEYWORDS: &str =
    "tesla vandalized,tesla keyed,tesla graffiti,supercharger vandalized,tesla slashed tires";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // X API
    pub x_bearer_token: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Monitoring
    pub monitor: MonitorSettings,
    /// Unset disables the background scheduler; cycles then only run via the
    /// trigger endpoint.
    pub monitor_interval: Option<Duration>,
}

/// Knobs for one monitoring cycle.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub keywords: Vec<String>,
    pub accounts: Vec<String>,
    pub posts_per_query: u32,
    pub max_pages: u32,
    /// Fixed pause between ingestor calls.
    pub request_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            keywords: split_list(DEFAULT_KEYWORDS),
            accounts: Vec::new(),
            posts_per_query: 10,
            max_pages: 1,
            request_delay: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, VandalWatchError> {
        let defaults = MonitorSettings::default();

        let monitor = MonitorSettings {
            keywords: env::var("MONITOR_KEYWORDS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.keywords),
            accounts: env::var("MONITOR_ACCOUNTS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            posts_per_query: parsed_env("MONITOR_POSTS_PER_QUERY", defaults.posts_per_query)?,
            max_pages: parsed_env("MONITOR_MAX_PAGES", defaults.max_pages)?.max(1),
            request_delay: Duration::from_millis(parsed_env(
                "MONITOR_REQUEST_DELAY_MS",
                defaults.request_delay.as_millis() as u64,
            )?),
        };

        let monitor_interval = match env::var("MONITOR_INTERVAL_MINUTES") {
            Ok(raw) if !raw.trim().is_empty() => {
                let minutes: u64 = raw.trim().parse().map_err(|_| {
                    VandalWatchError::Config("MONITOR_INTERVAL_MINUTES must be a number".into())
                })?;
                (minutes > 0).then(|| Duration::from_secs(minutes * 60))
            }
            _ => None,
        };

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            x_bearer_token: required_env("X_BEARER_TOKEN")?,
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parsed_env("WEB_PORT", 3000)?,
            monitor,
            monitor_interval,
        })
    }
}

fn required_env(key: &str) -> Result<String, VandalWatchError> {
    env::var(key).map_err(|_| VandalWatchError::Config(format!("{key} environment variable is required")))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, VandalWatchError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| VandalWatchError::Config(format!("{key} must be a number"))),
        Err(_) => Ok(default),
    }
}

/// Comma-separated list, trimmed, empties dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
