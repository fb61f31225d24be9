use chrono::{DateTime, Utc};

use crate::config::MeasurementConfig;
use crate::store::{OrderedSample, SampleStore, StoreError};
use crate::time::floor_seconds;

pub const STATE_STOPPED: i64 = 0;
pub const STATE_RUNNING: i64 = 1;
pub const STATE_IDLE: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSample {
    pub timestamp: DateTime<Utc>,
    pub state: i64,
}

/// A span during which the machine reported one state code.
///
/// Intervals produced for one query are contiguous: each `end` is the next
/// interval's `start`. The last one ends at the final sample seen rather than at
/// the query bound, so it can be shorter than the state actually lasted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct StateInterval {
    pub state: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_sec: i64,
}

fn close_interval(state: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> StateInterval {
    StateInterval {
        state,
        start,
        end,
        duration_sec: floor_seconds(start, end),
    }
}

/// Collapses ordered state samples into intervals. Input must be ascending.
pub fn segment_states(samples: &[StateSample]) -> Vec<StateInterval> {
    let Some((first, rest)) = samples.split_first() else {
        return Vec::new();
    };

    let mut timeline = Vec::new();
    let mut current_state = first.state;
    let mut interval_start = first.timestamp;
    let mut last_seen = first.timestamp;

    for sample in rest {
        if sample.state != current_state {
            timeline.push(close_interval(current_state, interval_start, sample.timestamp));
            current_state = sample.state;
            interval_start = sample.timestamp;
        }
        last_seen = sample.timestamp;
    }

    timeline.push(close_interval(current_state, interval_start, last_seen));
    timeline
}

pub fn running_seconds(intervals: &[StateInterval]) -> i64 {
    intervals
        .iter()
        .filter(|interval| interval.state == STATE_RUNNING)
        .map(|interval| interval.duration_sec)
        .sum()
}

/// Reads state codes out of raw samples, skipping values that are not integer codes.
pub fn state_samples(raw: &[OrderedSample]) -> Vec<StateSample> {
    raw.iter()
        .filter_map(|sample| match sample.value.as_code() {
            Some(state) => Some(StateSample {
                timestamp: sample.timestamp,
                state,
            }),
            None => {
                tracing::debug!(
                    timestamp = %sample.timestamp,
                    value = %sample.value,
                    "skipping non-integer state sample"
                );
                None
            }
        })
        .collect()
}

pub async fn get_state_timeline(
    store: &dyn SampleStore,
    measurements: &MeasurementConfig,
    machine_id: &str,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Result<Vec<StateInterval>, StoreError> {
    let raw = store
        .query_ordered(
            &measurements.state,
            &measurements.state_field,
            machine_id,
            start,
            stop,
        )
        .await?;
    Ok(segment_states(&state_samples(&raw)))
}

/// Running time in `[start, stop)`, computed the same way for reports and live snapshots.
pub async fn get_running_seconds(
    store: &dyn SampleStore,
    measurements: &MeasurementConfig,
    machine_id: &str,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let timeline = get_state_timeline(store, measurements, machine_id, start, stop).await?;
    Ok(running_seconds(&timeline))
}
