//! Configuration loader for the `farmsense-health` service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). Everything else receives a typed
//! [`Config`] and never calls `env::var` itself.
//!
//! Invalid values are startup errors; nothing is silently defaulted.

use std::env;
use std::fs;
use std::net::SocketAddr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;

use crate::engine::{EngineSettings, StatusMessages};
use crate::refresh::RefreshConfig;

/// Parse an optional unsigned environment variable with a default value.
macro_rules! parse_env_u64 {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr, $why:expr) => {
        $lookup($var_name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment {}", $var_name, $why))?
    };
}

// ---

/// Where sensors, thresholds and readings come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Postgres { db_url: String, db_pool_max: u32 },
    Http { api_url: String, api_max_pages: u32 },
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub source: SourceKind,

    /// Refresh tick in milliseconds.
    pub poll_interval_ms: u64,

    pub auto_refresh: bool,

    /// Offline threshold in milliseconds; 0 disables the age check.
    pub staleness_window_ms: u64,

    pub live_retention_ms: u64,

    pub delta_interval_ms: u64,

    /// Maximum readings per fetch.
    pub fetch_limit: u32,

    /// Restrict the engine to a single farm.
    pub farm_id: Option<String>,

    /// JSON file overriding the status message table.
    pub status_messages_path: Option<String>,

    pub listen_addr: SocketAddr,
}

/// Load configuration from the process environment.
///
/// Required:
/// - `DATABASE_URL` when `DATA_SOURCE=postgres` (the default)
/// - `SENSOR_API_URL` when `DATA_SOURCE=http`
///
/// Everything else is optional; see [`load_with`] for defaults.
pub fn load_from_env() -> Result<Config> {
    load_with(|name| env::var(name).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// Optional variables and defaults:
/// - `DB_POOL_MAX` (5), `API_MAX_PAGES` (100)
/// - `POLL_INTERVAL_MS` (15000), `AUTO_REFRESH` (true)
/// - `STALENESS_WINDOW_MS` (1800000), `LIVE_RETENTION_MS` (86400000)
/// - `DELTA_INTERVAL_MS` (3600000), `FETCH_LIMIT` (10000)
/// - `FARM_ID`, `STATUS_MESSAGES_PATH` (unset)
/// - `LISTEN_ADDR` (`0.0.0.0:8080`)
pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let source = match lookup("DATA_SOURCE")
        .map(|v| v.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("") | Some("postgres") => SourceKind::Postgres {
            db_url: require_env!(lookup, "DATABASE_URL", "when DATA_SOURCE=postgres"),
            db_pool_max: to_u32("DB_POOL_MAX", parse_env_u64!(lookup, "DB_POOL_MAX", 5))?,
        },
        Some("http") => SourceKind::Http {
            api_url: require_env!(lookup, "SENSOR_API_URL", "when DATA_SOURCE=http"),
            api_max_pages: to_u32("API_MAX_PAGES", parse_env_u64!(lookup, "API_MAX_PAGES", 100))?,
        },
        Some(other) => bail!("Invalid DATA_SOURCE: '{other}', expected 'postgres' or 'http'"),
    };

    let poll_interval_ms = parse_env_u64!(lookup, "POLL_INTERVAL_MS", 15_000);
    if poll_interval_ms == 0 {
        bail!("Invalid POLL_INTERVAL_MS: must be greater than 0");
    }

    let auto_refresh = match lookup("AUTO_REFRESH") {
        None => true,
        Some(v) => parse_bool(&v).ok_or_else(|| anyhow!("Invalid AUTO_REFRESH: '{v}'"))?,
    };

    let listen_addr = lookup("LISTEN_ADDR")
        .unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .trim()
        .parse::<SocketAddr>()
        .context("Invalid LISTEN_ADDR")?;

    Ok(Config {
        source,
        poll_interval_ms,
        auto_refresh,
        staleness_window_ms: parse_env_u64!(lookup, "STALENESS_WINDOW_MS", 30 * 60 * 1000),
        live_retention_ms: parse_env_u64!(lookup, "LIVE_RETENTION_MS", 24 * 60 * 60 * 1000),
        delta_interval_ms: parse_env_u64!(lookup, "DELTA_INTERVAL_MS", 60 * 60 * 1000),
        fetch_limit: to_u32("FETCH_LIMIT", parse_env_u64!(lookup, "FETCH_LIMIT", 10_000))?,
        farm_id: non_empty(lookup("FARM_ID")),
        status_messages_path: non_empty(lookup("STATUS_MESSAGES_PATH")),
        listen_addr,
    })
}

fn to_u32(name: &str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("Invalid {name}: {value} is out of range"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Longest retention or delta interval accepted; keeps `now - d` in range.
const MAX_LOOKBACK_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(ms.min(MAX_LOOKBACK_MS) as i64)
}

/// Mask the password component of a connection URL.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // "postgres://host@..." has no password; the colon is the scheme's
            if db_url[colon_pos..].starts_with("://") {
                return db_url.to_string();
            }
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    // ---
    /// Engine tuning derived from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        // ---
        EngineSettings {
            refresh: RefreshConfig::from_millis(
                self.poll_interval_ms,
                self.auto_refresh,
                self.staleness_window_ms,
            ),
            live_retention: millis(self.live_retention_ms),
            delta_interval: millis(self.delta_interval_ms),
            fetch_limit: self.fetch_limit,
            farm_scope: self.farm_id.clone(),
        }
    }

    /// Status message table, from `STATUS_MESSAGES_PATH` when set.
    ///
    /// The file is a JSON object keyed by status; missing keys keep their
    /// English default.
    pub fn load_messages(&self) -> Result<StatusMessages> {
        // ---
        let Some(path) = &self.status_messages_path else {
            return Ok(StatusMessages::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read STATUS_MESSAGES_PATH '{path}'"))?;
        parse_messages(&text).with_context(|| format!("Invalid status message table in '{path}'"))
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing every other value.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        match &self.source {
            SourceKind::Postgres { db_url, db_pool_max } => {
                tracing::info!("  DATA_SOURCE         : postgres");
                tracing::info!("  DATABASE_URL        : {}", mask_db_url(db_url));
                tracing::info!("  DB_POOL_MAX         : {}", db_pool_max);
            }
            SourceKind::Http { api_url, api_max_pages } => {
                tracing::info!("  DATA_SOURCE         : http");
                tracing::info!("  SENSOR_API_URL      : {}", api_url);
                tracing::info!("  API_MAX_PAGES       : {}", api_max_pages);
            }
        }
        tracing::info!("  POLL_INTERVAL_MS    : {}", self.poll_interval_ms);
        tracing::info!("  AUTO_REFRESH        : {}", self.auto_refresh);
        tracing::info!("  STALENESS_WINDOW_MS : {}", self.staleness_window_ms);
        tracing::info!("  LIVE_RETENTION_MS   : {}", self.live_retention_ms);
        tracing::info!("  DELTA_INTERVAL_MS   : {}", self.delta_interval_ms);
        tracing::info!("  FETCH_LIMIT         : {}", self.fetch_limit);
        tracing::info!("  FARM_ID             : {}", self.farm_id.as_deref().unwrap_or("(all)"));
        tracing::info!("  LISTEN_ADDR         : {}", self.listen_addr);
    }
}

fn parse_messages(text: &str) -> Result<StatusMessages> {
    // ---
    let messages: StatusMessages = serde_json::from_str(text)?;
    Ok(messages)
}
