//! Live machine snapshots.
//!
//! A [`LiveSession`] belongs to one subscriber watching one machine. It polls
//! the store, keeps its own runtime cache, and pushes a [`Snapshot`] into a
//! channel every iteration until it is cancelled or the receiver goes away.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{MeasurementConfig, MonitorConfig};
use crate::services::job_history::latest_started_job;
use crate::services::state_timeline::get_running_seconds;
use crate::store::{JobEvent, LatestSample, SampleStore, SampleValue, StoreError};
use crate::time::start_of_utc_day;

#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct Snapshot {
    pub machine_id: String,
    #[serde(rename = "current_state")]
    pub state: Option<i64>,
    #[schema(value_type = Object)]
    pub telemetry: BTreeMap<String, SampleValue>,
    #[schema(value_type = Object)]
    pub business: BTreeMap<String, SampleValue>,
    pub current_job: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub latest_window: Duration,
    pub job_window: Duration,
    pub runtime_ttl: Duration,
}

impl LiveSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.live_poll_interval(),
            error_backoff: config.live_error_backoff(),
            latest_window: config.live_window(),
            job_window: config.job_window(),
            runtime_ttl: config.runtime_ttl(),
        }
    }
}

/// Wait after a failed runtime refresh before querying again.
pub const RUNTIME_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Today's running seconds for one machine, recomputed once the TTL has elapsed.
#[derive(Debug, Clone, Default)]
pub struct RuntimeCache {
    value: i64,
    computed_at: Option<Instant>,
    retry_after: Option<Instant>,
}

impl RuntimeCache {
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn needs_refresh(&self, now: Instant, ttl: Duration) -> bool {
        if self.retry_after.is_some_and(|at| now < at) {
            return false;
        }
        match self.computed_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= ttl,
        }
    }

    pub fn update(&mut self, value: i64, now: Instant) {
        self.value = value;
        self.computed_at = Some(now);
        self.retry_after = None;
    }

    /// Keeps the stale value and holds off the next attempt for `delay`.
    pub fn mark_failed(&mut self, now: Instant, delay: Duration) {
        self.retry_after = Some(now + delay);
    }
}

/// Latest readings for one machine, before the runtime figure is folded in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestReadings {
    pub state: Option<i64>,
    pub telemetry: BTreeMap<String, SampleValue>,
    pub business: BTreeMap<String, SampleValue>,
    pub current_job: Option<String>,
}

impl LatestReadings {
    pub fn collect(
        measurements: &MeasurementConfig,
        latest: Vec<LatestSample>,
        job_events: &[JobEvent],
    ) -> Self {
        let mut readings = Self::default();
        for sample in latest {
            if sample.measurement == measurements.telemetry {
                readings.telemetry.insert(sample.field, sample.value);
            } else if sample.measurement == measurements.state {
                readings.state = sample.value.as_code();
            } else if sample.measurement == measurements.business {
                readings.business.insert(sample.field, sample.value);
            }
        }
        readings.current_job = latest_started_job(job_events).map(|event| event.job_id.clone());
        readings
    }

    /// Builds the pushed snapshot. `None` when no state sample was seen recently.
    pub fn into_snapshot(
        self,
        measurements: &MeasurementConfig,
        machine_id: &str,
        runtime_sec: i64,
        timestamp: DateTime<Utc>,
    ) -> Option<Snapshot> {
        let state = self.state?;
        let mut telemetry = self.telemetry;
        telemetry.remove(&measurements.raw_runtime_field);
        telemetry.insert(
            measurements.runtime_key.clone(),
            SampleValue::Int(runtime_sec),
        );

        Some(Snapshot {
            machine_id: machine_id.to_string(),
            state: Some(state),
            telemetry,
            business: self.business,
            current_job: self.current_job,
            timestamp,
        })
    }
}

pub struct LiveSession {
    store: Arc<dyn SampleStore>,
    measurements: MeasurementConfig,
    settings: LiveSettings,
    machine_id: String,
    runtime: RuntimeCache,
}

impl LiveSession {
    pub fn new(
        store: Arc<dyn SampleStore>,
        measurements: MeasurementConfig,
        settings: LiveSettings,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            measurements,
            settings,
            machine_id: machine_id.into(),
            runtime: RuntimeCache::default(),
        }
    }

    pub fn cached_runtime(&self) -> i64 {
        self.runtime.value()
    }

    pub async fn poll_once(&mut self) -> Result<Option<Snapshot>, StoreError> {
        self.poll_at(Instant::now(), Utc::now()).await
    }

    async fn poll_at(
        &mut self,
        now: Instant,
        wall_now: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, StoreError> {
        let streams = [
            self.measurements.telemetry.clone(),
            self.measurements.state.clone(),
            self.measurements.business.clone(),
        ];
        let latest = self
            .store
            .query_latest(&streams, &self.machine_id, self.settings.latest_window)
            .await?;

        let job_window =
            ChronoDuration::from_std(self.settings.job_window).unwrap_or(ChronoDuration::minutes(5));
        let job_events = self
            .store
            .query_events(
                &self.measurements.job,
                &self.machine_id,
                wall_now - job_window,
                wall_now,
            )
            .await?;

        let readings = LatestReadings::collect(&self.measurements, latest, &job_events);
        if readings.state.is_none() {
            return Ok(None);
        }

        self.refresh_runtime(now, wall_now).await;

        Ok(readings.into_snapshot(
            &self.measurements,
            &self.machine_id,
            self.runtime.value(),
            Utc::now(),
        ))
    }

    /// Recomputes today's runtime when the cache has expired. Failures keep the
    /// previous value and retry after [`RUNTIME_RETRY_DELAY`], capped at the TTL.
    async fn refresh_runtime(&mut self, now: Instant, wall_now: DateTime<Utc>) {
        if !self.runtime.needs_refresh(now, self.settings.runtime_ttl) {
            return;
        }
        match get_running_seconds(
            self.store.as_ref(),
            &self.measurements,
            &self.machine_id,
            start_of_utc_day(wall_now),
            wall_now,
        )
        .await
        {
            Ok(value) => self.runtime.update(value, now),
            Err(err) => {
                let retry_in = RUNTIME_RETRY_DELAY.min(self.settings.runtime_ttl);
                self.runtime.mark_failed(now, retry_in);
                tracing::warn!(
                    machine_id = %self.machine_id,
                    error = %err,
                    stale_runtime = self.runtime.value(),
                    retry_in_ms = retry_in.as_millis() as u64,
                    "runtime refresh failed; serving cached value"
                );
            }
        }
    }

    /// Polls until `cancel` fires or `tx` is closed.
    pub async fn run(mut self, tx: mpsc::Sender<Snapshot>, cancel: CancellationToken) {
        tracing::debug!(machine_id = %self.machine_id, "live session started");
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.poll_once() => polled,
            };

            let delay = match polled {
                Ok(Some(snapshot)) => {
                    // Cancellation wins over a full channel.
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = tx.send(snapshot) => sent,
                    };
                    if sent.is_err() {
                        break;
                    }
                    self.settings.poll_interval
                }
                Ok(None) => self.settings.error_backoff,
                Err(err) => {
                    tracing::warn!(
                        machine_id = %self.machine_id,
                        error = %err,
                        "live snapshot poll failed"
                    );
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!(machine_id = %self.machine_id, "live session stopped");
    }
}
