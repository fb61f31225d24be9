use crate::config::{MeasurementConfig, MonitorConfig};
use crate::state::AppState;
use crate::store::MemorySampleStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        database_url: "postgresql://postgres@localhost/postgres".to_string(),
        db_pool_size: 1,
        cors_origins: vec!["http://localhost:5173".to_string()],
        live_poll_interval_ms: 10,
        live_error_backoff_ms: 5,
        live_window_seconds: 30,
        job_window_seconds: 300,
        runtime_ttl_seconds: 30,
        machine_lookback_seconds: 3600,
        measurements: MeasurementConfig::default(),
    }
}

pub fn test_state(store: Arc<MemorySampleStore>) -> AppState {
    AppState {
        config: test_config(),
        store,
        shutdown: CancellationToken::new(),
    }
}
