//! Time-series sample store consumed by the derivation services.
//!
//! Every service receives an explicit `Arc<dyn SampleStore>` handle; there is no
//! process-wide client. Implementations must be safe for concurrent reads since
//! live sessions, reports and history requests all query the same handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod memory;
pub mod postgres;

pub use memory::MemorySampleStore;
pub use postgres::PgSampleStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One observed value. Numeric samples stay numeric; text passes through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SampleValue {
    /// Integer reading of the value. Integral floats (`1.0`) count; text and
    /// fractional floats do not.
    pub fn as_code(&self) -> Option<i64> {
        match self {
            SampleValue::Int(value) => Some(*value),
            SampleValue::Float(value)
                if value.is_finite()
                    && value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value <= i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Int(value) => Some(*value as f64),
            SampleValue::Float(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }

    /// Builds a value from a stored double, preferring the integer form when exact.
    pub fn from_f64(value: f64) -> Self {
        let candidate = SampleValue::Float(value);
        match candidate.as_code() {
            Some(code) => SampleValue::Int(code),
            None => candidate,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Int(value) => write!(f, "{value}"),
            SampleValue::Float(value) => write!(f, "{value}"),
            SampleValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for SampleValue {
    fn from(value: i64) -> Self {
        SampleValue::Int(value)
    }
}

impl From<i32> for SampleValue {
    fn from(value: i32) -> Self {
        SampleValue::Int(i64::from(value))
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        SampleValue::Float(value)
    }
}

impl From<&str> for SampleValue {
    fn from(value: &str) -> Self {
        SampleValue::Text(value.to_string())
    }
}

/// Most recent value of one (measurement, field) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestSample {
    pub measurement: String,
    pub field: String,
    pub value: SampleValue,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderedSample {
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
}

/// A job event row, pivoted from the `job_id` and `event` fields sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub event: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct MachineSummary {
    pub machine_id: String,
    pub current_state: Option<i64>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SampleStore: Send + Sync + 'static {
    /// Latest value per (measurement, field) for `machine_id` within the trailing `window`.
    async fn query_latest(
        &self,
        measurements: &[String],
        machine_id: &str,
        window: Duration,
    ) -> Result<Vec<LatestSample>, StoreError>;

    /// Samples of one field in `[start, stop)`, ascending by timestamp.
    async fn query_ordered(
        &self,
        measurement: &str,
        field: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<OrderedSample>, StoreError>;

    /// Job events in `[start, stop)`, ascending by timestamp.
    async fn query_events(
        &self,
        measurement: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<JobEvent>, StoreError>;

    /// Machines that reported a state sample recently, ordered by machine id.
    async fn list_machines(&self) -> Result<Vec<MachineSummary>, StoreError>;

    /// Latest sample of one field in `[start, stop)`.
    async fn query_last(
        &self,
        measurement: &str,
        field: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Option<OrderedSample>, StoreError> {
        let mut samples = self
            .query_ordered(measurement, field, machine_id, start, stop)
            .await?;
        Ok(samples.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_read_as_codes() {
        assert_eq!(SampleValue::Float(1.0).as_code(), Some(1));
        assert_eq!(SampleValue::Float(1.5).as_code(), None);
        assert_eq!(SampleValue::Float(f64::NAN).as_code(), None);
        assert_eq!(SampleValue::from("1").as_code(), None);
        assert_eq!(SampleValue::from_f64(101.0), SampleValue::Int(101));
        assert_eq!(SampleValue::from_f64(42.5), SampleValue::Float(42.5));
    }

    #[test]
    fn values_serialize_untagged() {
        let json = serde_json::to_string(&vec![
            SampleValue::Int(3),
            SampleValue::Float(2.5),
            SampleValue::from("J-7"),
        ])
        .unwrap();
        assert_eq!(json, r#"[3,2.5,"J-7"]"#);
        assert_eq!(SampleValue::Int(101).to_string(), "101");
    }
}
