// 7.0 config.rs: all settings in one place. endpoints, request tolerances, paging, cadence, outputs.
// 7.1 Credentials are kept apart so the config itself can be logged and serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::scheduler::ScheduleMode;

/// Log filter used when RUST_LOG is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Exchange-documented cap on rows per income-history call.
pub const MAX_INCOME_PAGE_SIZE: usize = 1000;

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Mainnet,
    Testnet,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Mainnet => "https://fapi.binance.com",
            Environment::Testnet => "https://testnet.binancefuture.com",
        }
    }

    pub fn config(&self) -> MonitorConfig {
        match self {
            Environment::Mainnet => MonitorConfig::default(),
            Environment::Testnet => MonitorConfig::testnet(),
        }
    }
}

/** 7.2: complete monitor configuration */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub environment: Environment,
    // REST root, no trailing slash
    pub base_url: String,
    // server-side tolerance for the signed timestamp
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
    // rows per income-history call, capped at MAX_INCOME_PAGE_SIZE
    pub income_page_size: usize,
    // hard stop for one reconciliation pass
    pub income_max_pages: usize,
    pub schedule: ScheduleMode,
    // recent per-event points kept for display
    pub series_capacity: usize,
    // append-only JSON-lines log of funding events
    pub record_log: Option<PathBuf>,
    // key,value file rewritten every tick
    pub summary_file: Option<PathBuf>,
    // first reconciliation starts here instead of "now"
    pub start_time: Option<DateTime<Utc>>,
    // one tick then exit
    pub run_once: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Mainnet,
            base_url: Environment::Mainnet.base_url().to_string(),
            recv_window_ms: 5_000,
            request_timeout_secs: 30,
            income_page_size: MAX_INCOME_PAGE_SIZE,
            income_max_pages: 100,
            schedule: ScheduleMode::Aligned { offset_secs: 60 },
            series_capacity: 48,
            record_log: Some(PathBuf::from("output/funding_records.jsonl")),
            summary_file: Some(PathBuf::from("output/funding_summary.csv")),
            start_time: None,
            run_once: false,
        }
    }
}

impl MonitorConfig {
    pub fn testnet() -> Self {
        Self {
            environment: Environment::Testnet,
            base_url: Environment::Testnet.base_url().to_string(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Environment preset first (`FUNDING_ENV`), then individual overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("FUNDING_ENV").as_deref().map(str::trim) {
            None | Some("") | Some("mainnet") => MonitorConfig::default(),
            Some("testnet") => MonitorConfig::testnet(),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "FUNDING_ENV",
                    reason: format!("unknown environment {other:?}"),
                })
            }
        };

        if let Some(url) = lookup("FUNDING_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("FUNDING_RECV_WINDOW_MS") {
            config.recv_window_ms = parse_value("FUNDING_RECV_WINDOW_MS", &raw)?;
        }
        if let Some(raw) = lookup("FUNDING_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_value("FUNDING_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("FUNDING_PAGE_SIZE") {
            config.income_page_size = parse_value("FUNDING_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("FUNDING_SERIES_CAPACITY") {
            config.series_capacity = parse_value("FUNDING_SERIES_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("FUNDING_INTERVAL_SECS") {
            let secs: u64 = parse_value("FUNDING_INTERVAL_SECS", &raw)?;
            config.schedule = ScheduleMode::Fixed {
                interval: Duration::from_secs(secs),
            };
        }
        if let Some(raw) = lookup("FUNDING_ALIGN_OFFSET_SECS") {
            config.schedule = ScheduleMode::Aligned {
                offset_secs: parse_value("FUNDING_ALIGN_OFFSET_SECS", &raw)?,
            };
        }
        if let Some(path) = lookup("FUNDING_RECORD_LOG") {
            config.record_log = non_empty_path(&path);
        }
        if let Some(path) = lookup("FUNDING_SUMMARY_FILE") {
            config.summary_file = non_empty_path(&path);
        }
        if let Some(raw) = lookup("FUNDING_START_TIME") {
            config.start_time = Some(parse_start_time(&raw)?);
        }
        if let Some(raw) = lookup("FUNDING_RUN_ONCE") {
            config.run_once = matches!(raw.trim(), "1" | "true" | "TRUE" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.recv_window_ms == 0 || self.recv_window_ms > 60_000 {
            return Err(ConfigError::InvalidValue {
                key: "recv_window_ms",
                reason: "must be within 1..=60000".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.income_page_size == 0 || self.income_page_size > MAX_INCOME_PAGE_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "income_page_size",
                reason: format!("must be within 1..={MAX_INCOME_PAGE_SIZE}"),
            });
        }
        if self.income_max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "income_max_pages",
                reason: "must be positive".to_string(),
            });
        }
        if self.series_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "series_capacity",
                reason: "must be positive".to_string(),
            });
        }
        self.schedule.validate()
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        reason: format!("cannot parse {raw:?}"),
    })
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

/// Accepts `2025-01-01`, `2025-01-01T08:00:00` (UTC assumed) or full RFC 3339.
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    let normalized = raw.trim().replace(' ', "T");
    if let Ok(at) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Some(naive) = chrono::NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }
    Err(ConfigError::InvalidValue {
        key: "FUNDING_START_TIME",
        reason: format!("unrecognized time {raw:?}"),
    })
}

/// RUST_LOG as given, else `info`. The raw value is never widened or narrowed.
pub fn log_filter(raw: Option<String>) -> EnvFilter {
    raw.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

// 7.3: the two opaque secrets. never printed.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("BINANCE_API_KEY").filter(|v| !v.trim().is_empty());
        let api_secret = lookup("BINANCE_API_SECRET").filter(|v| !v.trim().is_empty());
        match (api_key, api_secret) {
            (Some(api_key), Some(api_secret)) => Ok(Self { api_key, api_secret }),
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

// Configuration errors. all of them are fatal before the loop starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("API key/secret missing: set BINANCE_API_KEY and BINANCE_API_SECRET")]
    MissingCredentials,

    #[error("invalid {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tracing::level_filters::LevelFilter;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
        assert!(MonitorConfig::testnet().validate().is_ok());
    }

    #[test]
    fn test_environment_presets() {
        assert_eq!(Environment::Mainnet.config().base_url, "https://fapi.binance.com");
        assert_eq!(
            Environment::Testnet.config().base_url,
            "https://testnet.binancefuture.com"
        );
    }

    #[test]
    fn test_page_size_capped() {
        let mut config = MonitorConfig::default();
        config.income_page_size = MAX_INCOME_PAGE_SIZE + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "income_page_size", .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            ("FUNDING_ENV", "testnet"),
            ("FUNDING_INTERVAL_SECS", "300"),
            ("FUNDING_PAGE_SIZE", "500"),
            ("FUNDING_RECORD_LOG", ""),
            ("FUNDING_RUN_ONCE", "1"),
        ]))
        .unwrap();
        assert_eq!(config.environment, Environment::Testnet);
        assert_eq!(config.income_page_size, 500);
        assert_eq!(
            config.schedule,
            ScheduleMode::Fixed {
                interval: Duration::from_secs(300)
            }
        );
        assert!(config.record_log.is_none());
        assert!(config.run_once);
    }

    #[test]
    fn test_env_bad_number() {
        let result = MonitorConfig::from_lookup(lookup_from(&[("FUNDING_PAGE_SIZE", "lots")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "FUNDING_PAGE_SIZE", .. })
        ));
    }

    #[test]
    fn test_start_time_formats() {
        let day = parse_start_time("2025-01-01").unwrap();
        assert_eq!(day.timestamp(), 1_735_689_600);
        let with_time = parse_start_time("2025-01-01 08:00:00").unwrap();
        assert_eq!(with_time.timestamp(), 1_735_689_600 + 8 * 3600);
        let offset = parse_start_time("2025-01-01T08:00:00+08:00").unwrap();
        assert_eq!(offset.timestamp(), 1_735_689_600);
        assert!(parse_start_time("yesterday").is_err());
    }

    #[test]
    fn test_missing_credentials() {
        let result = Credentials::from_lookup(lookup_from(&[("BINANCE_API_KEY", "k")]));
        assert_eq!(result.unwrap_err(), ConfigError::MissingCredentials);

        let creds = Credentials::from_lookup(lookup_from(&[
            ("BINANCE_API_KEY", "k"),
            ("BINANCE_API_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn test_config_serialization() {
        let config = MonitorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_url, config.base_url);
        assert_eq!(back.schedule, config.schedule);
    }

    #[test]
    fn test_log_filter_honors_rust_log() {
        assert_eq!(log_filter(Some("debug".to_string())).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(Some("warn".to_string())).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("funding_monitor=loud".to_string())).max_level_hint(), Some(LevelFilter::INFO));
    }
}
