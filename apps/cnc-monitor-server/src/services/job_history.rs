use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::config::MeasurementConfig;
use crate::store::{JobEvent, SampleStore, StoreError};
use crate::time::floor_seconds;

pub const JOB_EVENT_END: i64 = 0;
pub const JOB_EVENT_START: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct JobRecord {
    pub job_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_sec: i64,
}

/// Pairs start/end events into completed jobs, emitted in completion order.
///
/// A repeated start for a job that is still open replaces the pending start.
/// End events without a pending start are ignored, and jobs still open when the
/// input runs out are dropped.
pub fn pair_job_events(events: &[JobEvent]) -> Vec<JobRecord> {
    let mut open: HashMap<&str, DateTime<Utc>> = HashMap::new();
    let mut jobs = Vec::new();

    for event in events {
        match event.event {
            JOB_EVENT_START => {
                open.insert(event.job_id.as_str(), event.timestamp);
            }
            JOB_EVENT_END => {
                if let Some(start) = open.remove(event.job_id.as_str()) {
                    jobs.push(JobRecord {
                        job_id: event.job_id.clone(),
                        start,
                        end: event.timestamp,
                        duration_sec: floor_seconds(start, event.timestamp),
                    });
                }
            }
            other => {
                tracing::debug!(job_id = %event.job_id, event = other, "ignoring unknown job event code");
            }
        }
    }

    if !open.is_empty() {
        tracing::debug!(open_jobs = open.len(), "dropping jobs without an end event in window");
    }

    jobs
}

/// Most recent start event, if any. Used for the live "current job".
pub fn latest_started_job(events: &[JobEvent]) -> Option<&JobEvent> {
    events
        .iter()
        .filter(|event| event.event == JOB_EVENT_START)
        .max_by_key(|event| event.timestamp)
}

pub async fn get_job_history(
    store: &dyn SampleStore,
    measurements: &MeasurementConfig,
    machine_id: &str,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Result<Vec<JobRecord>, StoreError> {
    let events = store
        .query_events(&measurements.job, machine_id, start, stop)
        .await?;
    Ok(pair_job_events(&events))
}
