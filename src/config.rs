use std::env;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::error::TrendingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = TrendingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(TrendingError::Config(format!(
                "Unknown store backend: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub redis_key_prefix: String,
    /// Connect and response timeout of the Redis connection manager.
    pub redis_timeout: Duration,
    pub http_port: u16,
    pub view_cooldown: Duration,
    pub view_settle_delay: Duration,
    pub archive_retention: usize,
    pub archive_hour: u32,
    pub archive_minute: u32,
    pub archive_utc_offset_hours: i32,
    pub archive_lease: Duration,
    pub trending_cache_ttl: Duration,
    pub article_catalog_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_key_prefix: "trending:".to_string(),
            redis_timeout: Duration::from_millis(500),
            http_port: 9700,
            view_cooldown: Duration::from_secs(60 * 60),
            view_settle_delay: Duration::from_millis(2000),
            archive_retention: 7,
            archive_hour: 3,
            archive_minute: 0,
            archive_utc_offset_hours: 0,
            archive_lease: Duration::from_secs(600),
            trending_cache_ttl: Duration::from_secs(60),
            article_catalog_path: None,
        }
    }
}

impl Settings {
    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<(), TrendingError> {
        validate_port(self.http_port)?;
        if self.store_backend == StoreBackend::Redis {
            validate_redis_url(&self.redis_url)?;
        }
        if self.redis_key_prefix.is_empty() {
            return Err(TrendingError::Config("Key prefix cannot be empty".into()));
        }
        if self.archive_retention == 0 {
            return Err(TrendingError::Config(
                "Archive retention must keep at least one archive".into(),
            ));
        }
        if self.archive_hour > 23 || self.archive_minute > 59 {
            return Err(TrendingError::Config(format!(
                "Invalid archive time {:02}:{:02}",
                self.archive_hour, self.archive_minute
            )));
        }
        if !(-12..=14).contains(&self.archive_utc_offset_hours) {
            return Err(TrendingError::Config(format!(
                "UTC offset out of range: {}",
                self.archive_utc_offset_hours
            )));
        }
        if self.view_cooldown.is_zero() {
            return Err(TrendingError::Config("View cooldown cannot be 0".into()));
        }
        Ok(())
    }
}

/// Validates that the port is in valid range (1-65535).
fn validate_port(port: u16) -> Result<(), TrendingError> {
    if port == 0 {
        return Err(TrendingError::Config("Port cannot be 0".into()));
    }
    Ok(())
}

fn validate_redis_url(url: &str) -> Result<(), TrendingError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(TrendingError::Config("Redis URL cannot be empty".into()));
    }
    if !(url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("unix://"))
    {
        return Err(TrendingError::Config(format!(
            "Redis URL must use redis://, rediss:// or unix://, got {url}"
        )));
    }
    Ok(())
}

/// Read a value from environment variable, with support for _FILE suffix (Docker Secrets)
fn get_env_or_file(env_name: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let file_env = format!("{env_name}_FILE");
    if let Ok(file_path) = env::var(&file_env) {
        return match fs::read_to_string(&file_path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) => Err(format!("Failed to read {file_env}: {e}").into()),
        };
    }

    Ok(env::var(env_name).ok())
}

fn parse_or<T>(env_name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(env_name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| format!("Invalid {env_name}: {e}").into()),
        Err(_) => Ok(default),
    }
}

/// Port the HTTP server listens on, read from `HTTP_PORT` exactly as
/// [`get_configuration`] reads it.
pub fn http_port() -> Result<u16, TrendingError> {
    let port = parse_or("HTTP_PORT", Settings::default().http_port)
        .map_err(|e| TrendingError::Config(e.to_string()))?;
    validate_port(port)?;
    Ok(port)
}

pub fn get_configuration() -> Result<Settings, Box<dyn std::error::Error>> {
    let defaults = Settings::default();

    let store_backend = parse_or("STORE_BACKEND", defaults.store_backend)?;
    let redis_url = get_env_or_file("REDIS_URL")?.unwrap_or(defaults.redis_url);
    let redis_key_prefix = env::var("REDIS_KEY_PREFIX").unwrap_or(defaults.redis_key_prefix);
    let redis_timeout = Duration::from_millis(parse_or("REDIS_TIMEOUT_MS", 500_u64)?);

    let http_port = http_port()?;

    let view_cooldown = Duration::from_secs(parse_or("VIEW_COOLDOWN_SECS", 3600_u64)?);
    let view_settle_delay = Duration::from_millis(parse_or("VIEW_SETTLE_DELAY_MS", 2000_u64)?);

    let archive_retention = parse_or("ARCHIVE_RETENTION", defaults.archive_retention)?;
    let archive_hour = parse_or("ARCHIVE_HOUR", defaults.archive_hour)?;
    let archive_minute = parse_or("ARCHIVE_MINUTE", defaults.archive_minute)?;
    let archive_utc_offset_hours =
        parse_or("ARCHIVE_UTC_OFFSET_HOURS", defaults.archive_utc_offset_hours)?;
    let archive_lease = Duration::from_secs(parse_or("ARCHIVE_LEASE_SECS", 600_u64)?);

    let trending_cache_ttl = Duration::from_secs(parse_or("TRENDING_CACHE_TTL_SECS", 60_u64)?);
    let article_catalog_path = env::var("ARTICLE_CATALOG_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty());

    let settings = Settings {
        store_backend,
        redis_url,
        redis_key_prefix,
        redis_timeout,
        http_port,
        view_cooldown,
        view_settle_delay,
        archive_retention,
        archive_hour,
        archive_minute,
        archive_utc_offset_hours,
        archive_lease,
        trending_cache_ttl,
        article_catalog_path,
    };

    settings.validate()?;

    Ok(settings)
}
