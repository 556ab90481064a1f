//! Configuration loader for the `hydrotower-insights` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Sensor good bands live here too so that a grower
//! can retune them without a rebuild.
//!
use std::env;

use anyhow::{anyhow, Result};

use crate::{SensorKey, SensorRange, Thresholds};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string for the datastore holding `sensor_data`.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Base URL of the sensor bridge (e.g. `http://10.65.171.23`).
    pub bridge_url: String,

    /// Timeout for a single bridge request, in milliseconds.
    pub bridge_timeout_ms: u32,

    /// Maximum number of rows fetched per history query (safety limit).
    pub history_max_rows: u32,

    /// Good bands for the sensors classified with the generic rule.
    pub thresholds: Thresholds,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `BRIDGE_URL` – sensor bridge base URL
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BRIDGE_TIMEOUT_MS` – bridge request timeout (default: 8000)
/// - `HISTORY_MAX_ROWS` – max rows per history query (default: 20000)
/// - `RANGE_<SENSOR>` – good band as `min,max`, e.g. `RANGE_PH_LEVEL=5.5,6.5`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let bridge_url = require_env!("BRIDGE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bridge_timeout_ms = parse_env_u32!("BRIDGE_TIMEOUT_MS", 8000);
    let history_max_rows = parse_env_u32!("HISTORY_MAX_ROWS", 20_000);

    let mut thresholds = Thresholds::default();
    for key in SensorKey::ALL {
        let var_name = range_var(key);
        let Some(range) = thresholds.range_mut(key) else {
            continue;
        };
        if let Ok(raw) = env::var(&var_name) {
            *range = parse_range(&raw).map_err(|e| anyhow!("Invalid {}: {}", var_name, e))?;
        }
    }

    Ok(Config {
        db_url,
        db_pool_max,
        bridge_url,
        bridge_timeout_ms,
        history_max_rows,
        thresholds,
    })
}

/// Environment variable overriding the band for `key`.
fn range_var(key: SensorKey) -> String {
    format!("RANGE_{}", key.as_str().to_ascii_uppercase())
}

/// Parse `min,max` into a validated range.
fn parse_range(raw: &str) -> Result<SensorRange> {
    // ---
    let (min, max) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("expected `min,max`, got `{}`", raw))?;
    let min: f64 = min.trim().parse()?;
    let max: f64 = max.trim().parse()?;

    Ok(SensorRange::new(min, max)?)
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL      : {}", masked_db_url);
        tracing::info!("  BRIDGE_URL        : {}", self.bridge_url);
        tracing::info!("  DB_POOL_MAX       : {}", self.db_pool_max);
        tracing::info!("  BRIDGE_TIMEOUT_MS : {}", self.bridge_timeout_ms);
        tracing::info!("  HISTORY_MAX_ROWS  : {}", self.history_max_rows);
        for key in SensorKey::ALL {
            if let Some(range) = self.thresholds.range(key) {
                tracing::info!(
                    "  {:<18}: {} - {} {}",
                    range_var(key),
                    range.min(),
                    range.max(),
                    key.unit()
                );
            }
        }
    }
}
