use brawl_api::client::BRAWL_STARS_API;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgSslMode;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CUTOFF: &str = "2024-11-01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} is not set"),
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "{key}={value:?} is invalid: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub db: DbSettings,
    pub crawl: CrawlSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub token: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub ssl_mode: PgSslMode,
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub workers: usize,
    /// Distinct players queued in one cycle before the cycle restarts.
    pub player_threshold: usize,
    /// Battles before this instant are never stored.
    pub cutoff: DateTime<Utc>,
    pub poll_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            workers: 20,
            player_threshold: 500_000,
            cutoff: parse_cutoff("CRAWL_CUTOFF_DATE", DEFAULT_CUTOFF).unwrap_or_default(),
            poll_interval: Duration::from_secs(5),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let api = ApiSettings {
            token: required("BRAWL_STARS_TOKEN")?,
            base_url: get("BRAWL_STARS_API_URL").unwrap_or_else(|| BRAWL_STARS_API.to_owned()),
        };

        let db = DbSettings {
            host: required("POSTGRES_HOST")?,
            port: parse_value("POSTGRES_PORT", &required("POSTGRES_PORT")?)?,
            database: required("POSTGRES_DB")?,
            user: required("POSTGRES_USER")?,
            password: required("POSTGRES_PASSWORD")?,
            pool_min: optional(&get, "POSTGRES_POOL_MIN", 10)?,
            pool_max: optional(&get, "POSTGRES_POOL_MAX", 20)?,
            ssl_mode: optional(&get, "POSTGRES_SSLMODE", PgSslMode::Prefer)?,
        };
        if db.pool_min > db.pool_max || db.pool_max == 0 {
            return Err(ConfigError::Invalid {
                key: "POSTGRES_POOL_MAX",
                value: db.pool_max.to_string(),
                reason: format!("must be positive and at least POSTGRES_POOL_MIN ({})", db.pool_min),
            });
        }

        let defaults = CrawlSettings::default();
        let crawl = CrawlSettings {
            workers: optional(&get, "CRAWL_WORKERS", defaults.workers)?,
            player_threshold: optional(&get, "CRAWL_PLAYER_THRESHOLD", defaults.player_threshold)?,
            cutoff: match get("CRAWL_CUTOFF_DATE") {
                Some(raw) => parse_cutoff("CRAWL_CUTOFF_DATE", &raw)?,
                None => defaults.cutoff,
            },
            poll_interval: Duration::from_secs(optional(&get, "CRAWL_POLL_SECS", 5)?),
            backoff_initial: defaults.backoff_initial,
            backoff_max: Duration::from_secs(optional(&get, "CRAWL_BACKOFF_MAX_SECS", 300)?),
        };
        if crawl.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CRAWL_POLL_SECS",
                value: "0".into(),
                reason: "poll interval must be at least one second".into(),
            });
        }
        if crawl.player_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "CRAWL_PLAYER_THRESHOLD",
                value: "0".into(),
                reason: "threshold must be at least one player".into(),
            });
        }
        if crawl.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "CRAWL_WORKERS",
                value: "0".into(),
                reason: "at least one worker is required".into(),
            });
        }

        Ok(Self { api, db, crawl })
    }
}

fn optional<T, F>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
        reason: e.to_string(),
    })
}

/// `YYYY-MM-DD`, taken as midnight UTC.
fn parse_cutoff(key: &'static str, raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|e| ConfigError::Invalid {
            key,
            value: raw.to_owned(),
            reason: e.to_string(),
        })
}
