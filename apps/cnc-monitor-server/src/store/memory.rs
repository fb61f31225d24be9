use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{
    JobEvent, LatestSample, MachineSummary, OrderedSample, SampleStore, SampleValue, StoreError,
};

const DEFAULT_MACHINE_LOOKBACK_SECONDS: u64 = 3600;
const JOB_ID_FIELD: &str = "job_id";
const JOB_EVENT_FIELD: &str = "event";

#[derive(Debug, Clone)]
struct StoredSample {
    machine_id: String,
    measurement: String,
    field: String,
    timestamp: DateTime<Utc>,
    value: SampleValue,
}

/// In-process store with the same query semantics as the Postgres store.
///
/// `set_failing(true)` makes every query return a backend error, which is how
/// tests exercise the failure paths of the services.
#[derive(Debug)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<StoredSample>>,
    state_measurement: String,
    machine_lookback: Duration,
    failing: AtomicBool,
}

impl MemorySampleStore {
    pub fn new(state_measurement: impl Into<String>) -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            state_measurement: state_measurement.into(),
            machine_lookback: Duration::from_secs(DEFAULT_MACHINE_LOOKBACK_SECONDS),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_machine_lookback(mut self, lookback: Duration) -> Self {
        self.machine_lookback = lookback;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn insert(
        &self,
        machine_id: &str,
        measurement: &str,
        field: &str,
        timestamp: DateTime<Utc>,
        value: impl Into<SampleValue>,
    ) {
        self.samples.write().await.push(StoredSample {
            machine_id: machine_id.to_string(),
            measurement: measurement.to_string(),
            field: field.to_string(),
            timestamp,
            value: value.into(),
        });
    }

    /// Writes a job event the way the ingest path does: two fields on one timestamp.
    pub async fn insert_job_event(
        &self,
        machine_id: &str,
        measurement: &str,
        timestamp: DateTime<Utc>,
        job_id: impl Into<SampleValue>,
        event: i64,
    ) {
        self.insert(machine_id, measurement, JOB_ID_FIELD, timestamp, job_id)
            .await;
        self.insert(machine_id, measurement, JOB_EVENT_FIELD, timestamp, event)
            .await;
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store unavailable".to_string()));
        }
        Ok(())
    }
}

fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::zero());
    now - window
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn query_latest(
        &self,
        measurements: &[String],
        machine_id: &str,
        window: Duration,
    ) -> Result<Vec<LatestSample>, StoreError> {
        self.check_available()?;
        let since = window_start(Utc::now(), window);
        let samples = self.samples.read().await;

        let mut latest: BTreeMap<(String, String), &StoredSample> = BTreeMap::new();
        for sample in samples.iter().filter(|s| {
            s.machine_id == machine_id
                && s.timestamp >= since
                && measurements.iter().any(|m| *m == s.measurement)
        }) {
            let key = (sample.measurement.clone(), sample.field.clone());
            match latest.get(&key) {
                Some(current) if current.timestamp > sample.timestamp => {}
                _ => {
                    latest.insert(key, sample);
                }
            }
        }

        Ok(latest
            .into_values()
            .map(|sample| LatestSample {
                measurement: sample.measurement.clone(),
                field: sample.field.clone(),
                value: sample.value.clone(),
                timestamp: sample.timestamp,
            })
            .collect())
    }

    async fn query_ordered(
        &self,
        measurement: &str,
        field: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<OrderedSample>, StoreError> {
        self.check_available()?;
        let samples = self.samples.read().await;
        let mut out: Vec<OrderedSample> = samples
            .iter()
            .filter(|s| {
                s.machine_id == machine_id
                    && s.measurement == measurement
                    && s.field == field
                    && s.timestamp >= start
                    && s.timestamp < stop
            })
            .map(|s| OrderedSample {
                timestamp: s.timestamp,
                value: s.value.clone(),
            })
            .collect();
        out.sort_by_key(|s| s.timestamp);
        Ok(out)
    }

    async fn query_events(
        &self,
        measurement: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<JobEvent>, StoreError> {
        self.check_available()?;
        let samples = self.samples.read().await;

        let mut rows: BTreeMap<DateTime<Utc>, (Option<String>, Option<i64>)> = BTreeMap::new();
        for sample in samples.iter().filter(|s| {
            s.machine_id == machine_id
                && s.measurement == measurement
                && s.timestamp >= start
                && s.timestamp < stop
        }) {
            let row = rows.entry(sample.timestamp).or_default();
            match sample.field.as_str() {
                JOB_ID_FIELD => row.0 = Some(sample.value.to_string()),
                JOB_EVENT_FIELD => row.1 = sample.value.as_code(),
                _ => {}
            }
        }

        Ok(rows
            .into_iter()
            .filter_map(|(timestamp, row)| match row {
                (Some(job_id), Some(event)) => Some(JobEvent {
                    timestamp,
                    job_id,
                    event,
                }),
                _ => None,
            })
            .collect())
    }

    async fn list_machines(&self) -> Result<Vec<MachineSummary>, StoreError> {
        self.check_available()?;
        let since = window_start(Utc::now(), self.machine_lookback);
        let samples = self.samples.read().await;

        let mut latest: BTreeMap<&str, &StoredSample> = BTreeMap::new();
        for sample in samples
            .iter()
            .filter(|s| s.measurement == self.state_measurement && s.timestamp >= since)
        {
            match latest.get(sample.machine_id.as_str()) {
                Some(current) if current.timestamp > sample.timestamp => {}
                _ => {
                    latest.insert(sample.machine_id.as_str(), sample);
                }
            }
        }

        Ok(latest
            .into_iter()
            .map(|(machine_id, sample)| MachineSummary {
                machine_id: machine_id.to_string(),
                current_state: sample.value.as_code(),
                last_seen: Some(sample.timestamp),
            })
            .collect())
    }
}
