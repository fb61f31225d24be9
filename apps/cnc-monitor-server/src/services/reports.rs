use chrono::{DateTime, Utc};

use crate::config::MeasurementConfig;
use crate::services::state_timeline::get_running_seconds;
use crate::store::{SampleStore, StoreError};
use crate::time::start_of_utc_day;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct DailyReportRow {
    pub machine_id: String,
    pub runtime_sec: i64,
    pub part_count: i64,
}

pub async fn get_daily_report(
    store: &dyn SampleStore,
    measurements: &MeasurementConfig,
) -> Result<Vec<DailyReportRow>, StoreError> {
    daily_report_at(store, measurements, Utc::now()).await
}

/// One row per known machine covering `[midnight UTC, now)`, in listing order.
pub async fn daily_report_at(
    store: &dyn SampleStore,
    measurements: &MeasurementConfig,
    now: DateTime<Utc>,
) -> Result<Vec<DailyReportRow>, StoreError> {
    let start = start_of_utc_day(now);
    let machines = store.list_machines().await?;

    let mut rows = Vec::with_capacity(machines.len());
    for machine in machines {
        let runtime_sec =
            get_running_seconds(store, measurements, &machine.machine_id, start, now).await?;
        let part_count = store
            .query_last(
                &measurements.business,
                &measurements.part_count_field,
                &machine.machine_id,
                start,
                now,
            )
            .await?
            .and_then(|sample| sample.value.as_f64())
            .map(|count| count.trunc() as i64)
            .unwrap_or(0);

        rows.push(DailyReportRow {
            machine_id: machine.machine_id,
            runtime_sec,
            part_count,
        });
    }

    tracing::debug!(machines = rows.len(), "daily report computed");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySampleStore;
    use chrono::Duration;

    fn long_lookback_store(m: &MeasurementConfig) -> MemorySampleStore {
        MemorySampleStore::new(m.state.clone())
            .with_machine_lookback(std::time::Duration::from_secs(20 * 365 * 86_400))
    }

    fn at(raw: &str) -> DateTime<Utc> {
        crate::time::parse_rfc3339(raw).unwrap()
    }

    #[tokio::test]
    async fn report_sums_running_time_and_reads_latest_part_count() {
        let m = MeasurementConfig::default();
        let store = long_lookback_store(&m);
        let now = at("2024-05-01T12:00:00Z");

        // Yesterday's running stretch must not count.
        store.insert("m1", &m.state, &m.state_field, at("2024-04-30T22:00:00Z"), 1).await;
        store.insert("m1", &m.state, &m.state_field, at("2024-05-01T06:00:00Z"), 1).await;
        store.insert("m1", &m.state, &m.state_field, at("2024-05-01T06:30:00Z"), 2).await;
        store.insert("m1", &m.state, &m.state_field, at("2024-05-01T08:00:00Z"), 1).await;
        store.insert("m1", &m.state, &m.state_field, at("2024-05-01T08:30:00Z"), 0).await;
        store.insert("m1", &m.state, &m.state_field, at("2024-05-01T11:59:00Z"), 0).await;
        store.insert("m1", &m.business, &m.part_count_field, at("2024-04-30T23:00:00Z"), 7).await;
        store.insert("m1", &m.business, &m.part_count_field, at("2024-05-01T07:00:00Z"), 12).await;
        store.insert("m1", &m.business, &m.part_count_field, at("2024-05-01T09:00:00Z"), 42.0).await;

        let report = daily_report_at(&store, &m, now).await.unwrap();
        assert_eq!(
            report,
            vec![DailyReportRow {
                machine_id: "m1".to_string(),
                runtime_sec: 3600,
                part_count: 42,
            }]
        );
    }

    #[tokio::test]
    async fn machine_without_business_sample_reports_zero_parts() {
        let m = MeasurementConfig::default();
        let store = long_lookback_store(&m);
        let now = at("2024-05-01T00:00:30Z");
        store.insert("m2", &m.state, &m.state_field, now - Duration::milliseconds(1), 0).await;
        store.insert("m1", &m.state, &m.state_field, now - Duration::milliseconds(1), 1).await;

        let report = daily_report_at(&store, &m, now).await.unwrap();
        let ids: Vec<&str> = report.iter().map(|r| r.machine_id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(report.iter().all(|row| row.part_count == 0));
        assert!(report.iter().all(|row| row.runtime_sec == 0));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let m = MeasurementConfig::default();
        let store = MemorySampleStore::new(m.state.clone());
        store.set_failing(true);
        assert!(daily_report_at(&store, &m, Utc::now()).await.is_err());
    }
}
