use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

use super::{
    JobEvent, LatestSample, MachineSummary, OrderedSample, SampleStore, SampleValue, StoreError,
};

/// Samples live in one narrow table; numeric fields use `value`, text fields `value_text`.
#[derive(Clone)]
pub struct PgSampleStore {
    pool: PgPool,
    state_measurement: String,
    machine_lookback: Duration,
}

#[derive(Debug, FromRow)]
struct LatestRow {
    measurement: String,
    field: String,
    ts: DateTime<Utc>,
    value: Option<f64>,
    value_text: Option<String>,
}

#[derive(Debug, FromRow)]
struct SampleRow {
    ts: DateTime<Utc>,
    value: Option<f64>,
    value_text: Option<String>,
}

#[derive(Debug, FromRow)]
struct JobEventRow {
    ts: DateTime<Utc>,
    job_id: Option<String>,
    event: Option<f64>,
}

#[derive(Debug, FromRow)]
struct MachineRow {
    machine_id: String,
    ts: DateTime<Utc>,
    value: Option<f64>,
}

fn row_value(value: Option<f64>, value_text: Option<String>) -> Option<SampleValue> {
    match (value_text, value) {
        (Some(text), _) => Some(SampleValue::Text(text)),
        (None, Some(value)) => Some(SampleValue::from_f64(value)),
        (None, None) => None,
    }
}

impl PgSampleStore {
    pub fn new(pool: PgPool, state_measurement: impl Into<String>, machine_lookback: Duration) -> Self {
        Self {
            pool,
            state_measurement: state_measurement.into(),
            machine_lookback,
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS machine_samples (
                machine_id text not null,
                measurement text not null,
                field text not null,
                ts timestamptz not null,
                value double precision null,
                value_text text null
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS machine_samples_lookup_idx
            ON machine_samples (machine_id, measurement, field, ts DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SampleStore for PgSampleStore {
    async fn query_latest(
        &self,
        measurements: &[String],
        machine_id: &str,
        window: Duration,
    ) -> Result<Vec<LatestSample>, StoreError> {
        let rows: Vec<LatestRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (measurement, field)
                measurement,
                field,
                ts,
                value,
                value_text
            FROM machine_samples
            WHERE machine_id = $1
              AND measurement = ANY($2)
              AND ts >= now() - make_interval(secs => $3)
            ORDER BY measurement, field, ts DESC
            "#,
        )
        .bind(machine_id)
        .bind(measurements)
        .bind(window.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let value = row_value(row.value, row.value_text)?;
                Some(LatestSample {
                    measurement: row.measurement,
                    field: row.field,
                    value,
                    timestamp: row.ts,
                })
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
        let rows: Vec<SampleRow> = sqlx::query_as(
            r#"
            SELECT ts, value, value_text
            FROM machine_samples
            WHERE machine_id = $1
              AND measurement = $2
              AND field = $3
              AND ts >= $4
              AND ts < $5
            ORDER BY ts ASC
            "#,
        )
        .bind(machine_id)
        .bind(measurement)
        .bind(field)
        .bind(start)
        .bind(stop)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(OrderedSample {
                    timestamp: row.ts,
                    value: row_value(row.value, row.value_text)?,
                })
            })
            .collect())
    }

    async fn query_last(
        &self,
        measurement: &str,
        field: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Option<OrderedSample>, StoreError> {
        let row: Option<SampleRow> = sqlx::query_as(
            r#"
            SELECT ts, value, value_text
            FROM machine_samples
            WHERE machine_id = $1
              AND measurement = $2
              AND field = $3
              AND ts >= $4
              AND ts < $5
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(machine_id)
        .bind(measurement)
        .bind(field)
        .bind(start)
        .bind(stop)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| {
            Some(OrderedSample {
                timestamp: row.ts,
                value: row_value(row.value, row.value_text)?,
            })
        }))
    }

    async fn query_events(
        &self,
        measurement: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<JobEvent>, StoreError> {
        let rows: Vec<JobEventRow> = sqlx::query_as(
            r#"
            SELECT
                ts,
                max(COALESCE(value_text, value::text)) FILTER (WHERE field = 'job_id') AS job_id,
                max(value) FILTER (WHERE field = 'event') AS event
            FROM machine_samples
            WHERE machine_id = $1
              AND measurement = $2
              AND field IN ('job_id', 'event')
              AND ts >= $3
              AND ts < $4
            GROUP BY ts
            ORDER BY ts ASC
            "#,
        )
        .bind(machine_id)
        .bind(measurement)
        .bind(start)
        .bind(stop)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let event = SampleValue::from_f64(row.event?).as_code()?;
                Some(JobEvent {
                    timestamp: row.ts,
                    job_id: row.job_id?,
                    event,
                })
            })
            .collect())
    }

    async fn list_machines(&self) -> Result<Vec<MachineSummary>, StoreError> {
        let rows: Vec<MachineRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (machine_id)
                machine_id,
                ts,
                value
            FROM machine_samples
            WHERE measurement = $1
              AND ts >= now() - make_interval(secs => $2)
            ORDER BY machine_id, ts DESC
            "#,
        )
        .bind(&self.state_measurement)
        .bind(self.machine_lookback.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MachineSummary {
                machine_id: row.machine_id,
                current_state: row.value.and_then(|v| SampleValue::from_f64(v).as_code()),
                last_seen: Some(row.ts),
            })
            .collect())
    }
}
