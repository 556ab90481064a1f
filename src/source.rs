//! Data sources feeding the core.
//!
//! The core never owns a client. Whoever serves requests is handed a
//! [`SensorSource`] at construction and passes the fetched data into the
//! pure classifier and aggregator.

use std::{future::Future, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::PgPool;

use crate::{Config, LiveSnapshot, SensorRecord};

// ---

/// Supplier of historical rows and live samples.
pub trait SensorSource: Send + Sync + 'static {
    /// Rows whose (mislabeled) `created_at` is at or after local time
    /// `since`, oldest first.
    fn history(&self, since: NaiveDateTime)
        -> impl Future<Output = Result<Vec<SensorRecord>>> + Send;

    /// Current sample from the sensor bridge.
    fn live(&self) -> impl Future<Output = Result<LiveSnapshot>> + Send;
}

/// Production source: the Postgres datastore for history and the
/// microcontroller bridge over HTTP for live samples.
#[derive(Debug, Clone)]
pub struct TowerSource {
    // ---
    pool: PgPool,
    http: reqwest::Client,
    bridge_url: String,
    max_rows: u32,
}

impl TowerSource {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        // ---
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(u64::from(config.bridge_timeout_ms)))
            .build()
            .map_err(|e| anyhow!("Failed to build bridge HTTP client: {}", e))?;

        Ok(Self {
            pool,
            http,
            bridge_url: config.bridge_url.trim_end_matches('/').to_string(),
            max_rows: config.history_max_rows,
        })
    }
}

/// Row shape of the `sensor_data` table.
#[derive(Debug, sqlx::FromRow)]
struct SensorRow {
    // ---
    created_at: DateTime<Utc>,
    water_temp: Option<f64>,
    ph_level: Option<f64>,
    ec_level: Option<f64>,
    env_temp: Option<f64>,
    humidity: Option<f64>,
    light_level: Option<f64>,
    co2_level: Option<f64>,
    water_level: Option<bool>,
}

impl From<SensorRow> for SensorRecord {
    fn from(row: SensorRow) -> Self {
        // ---
        SensorRecord {
            created_at: row.created_at.to_rfc3339(),
            water_temp: row.water_temp,
            ph_level: row.ph_level,
            ec_level: row.ec_level,
            env_temp: row.env_temp,
            humidity: row.humidity,
            light_level: row.light_level,
            co2_level: row.co2_level,
            water_level: row.water_level,
        }
    }
}

impl SensorSource for TowerSource {
    async fn history(&self, since: NaiveDateTime) -> Result<Vec<SensorRecord>> {
        // ---
        // The column holds local wall-clock time tagged as UTC, so the bound
        // is tagged the same way.
        let since = since.and_utc();
        tracing::debug!("Fetching sensor_data since {} (limit {})", since, self.max_rows);

        let rows: Vec<SensorRow> = sqlx::query_as(
            r#"
            SELECT
                created_at,
                water_temp::float8  AS water_temp,
                ph_level::float8    AS ph_level,
                ec_level::float8    AS ec_level,
                env_temp::float8    AS env_temp,
                humidity::float8    AS humidity,
                light_level::float8 AS light_level,
                co2_level::float8   AS co2_level,
                water_level
            FROM sensor_data
            WHERE created_at >= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(i64::from(self.max_rows))
        .fetch_all(&self.pool)
        .await?;

        if rows.len() as u64 >= u64::from(self.max_rows) {
            tracing::warn!(
                "Hit row limit of {}, history may be truncated",
                self.max_rows
            );
        }

        tracing::info!("Fetched {} sensor_data rows", rows.len());
        Ok(rows.into_iter().map(SensorRecord::from).collect())
    }

    async fn live(&self) -> Result<LiveSnapshot> {
        // ---
        let url = format!("{}/sensors", self.bridge_url);
        tracing::debug!("Fetching live sample from: {}", url);

        let snapshot: LiveSnapshot = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!("Live sample: {:?}", snapshot);
        Ok(snapshot)
    }
}
