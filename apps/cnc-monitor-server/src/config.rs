use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::time::Duration;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Names of the measurement streams and fields the services read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementConfig {
    pub telemetry: String,
    pub state: String,
    pub business: String,
    pub job: String,
    pub state_field: String,
    pub part_count_field: String,
    /// Raw elapsed-running counter published by the machine; replaced in live snapshots.
    pub raw_runtime_field: String,
    /// Telemetry key the cached runtime is published under.
    pub runtime_key: String,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            telemetry: "cnc_telemetry".to_string(),
            state: "cnc_state".to_string(),
            business: "cnc_business".to_string(),
            job: "cnc_job".to_string(),
            state_field: "machine_state".to_string(),
            part_count_field: "part_count".to_string(),
            raw_runtime_field: "running_time".to_string(),
            runtime_key: "runtime".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub database_url: String,
    pub db_pool_size: u32,
    pub cors_origins: Vec<String>,
    pub live_poll_interval_ms: u64,
    pub live_error_backoff_ms: u64,
    pub live_window_seconds: u64,
    pub job_window_seconds: u64,
    pub runtime_ttl_seconds: u64,
    pub machine_lookback_seconds: u64,
    pub measurements: MeasurementConfig,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let parse_u64 = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let database_url = non_empty("MONITOR_DATABASE_URL")
            .or_else(|| non_empty("DATABASE_URL"))
            .context("MONITOR_DATABASE_URL or DATABASE_URL is required")?;
        let database_url = normalize_database_url(database_url);

        let db_pool_size = non_empty("MONITOR_DB_POOL_SIZE")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(10);
        let cors_origins = non_empty("MONITOR_CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]);

        let defaults = MeasurementConfig::default();
        let measurements = MeasurementConfig {
            telemetry: non_empty("MONITOR_MEASUREMENT_TELEMETRY").unwrap_or(defaults.telemetry),
            state: non_empty("MONITOR_MEASUREMENT_STATE").unwrap_or(defaults.state),
            business: non_empty("MONITOR_MEASUREMENT_BUSINESS").unwrap_or(defaults.business),
            job: non_empty("MONITOR_MEASUREMENT_JOB").unwrap_or(defaults.job),
            ..defaults
        };

        Ok(Self {
            database_url,
            db_pool_size,
            cors_origins,
            live_poll_interval_ms: parse_u64("MONITOR_LIVE_POLL_INTERVAL_MS", 200),
            live_error_backoff_ms: parse_u64("MONITOR_LIVE_ERROR_BACKOFF_MS", 100),
            live_window_seconds: parse_u64("MONITOR_LIVE_WINDOW_SECONDS", 30),
            job_window_seconds: parse_u64("MONITOR_JOB_WINDOW_SECONDS", 300),
            runtime_ttl_seconds: parse_u64("MONITOR_RUNTIME_TTL_SECONDS", 30),
            machine_lookback_seconds: parse_u64("MONITOR_MACHINE_LOOKBACK_SECONDS", 3600),
            measurements,
        })
    }

    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_millis(self.live_poll_interval_ms)
    }

    pub fn live_error_backoff(&self) -> Duration {
        Duration::from_millis(self.live_error_backoff_ms)
    }

    pub fn live_window(&self) -> Duration {
        Duration::from_secs(self.live_window_seconds)
    }

    pub fn job_window(&self) -> Duration {
        Duration::from_secs(self.job_window_seconds)
    }

    pub fn runtime_ttl(&self) -> Duration {
        Duration::from_secs(self.runtime_ttl_seconds)
    }

    pub fn machine_lookback(&self) -> Duration {
        Duration::from_secs(self.machine_lookback_seconds)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.trim_end_matches('/').to_string())
        .collect()
}

fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgresql://{stripped}");
    }
    url
}
