use chrono::{DateTime, Utc};

use crate::config::MeasurementConfig;
use crate::store::{OrderedSample, SampleStore, SampleValue, StoreError};
use crate::time::align_down;

#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct TelemetryPoint {
    pub ts: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub value: SampleValue,
}

/// Averages numeric samples into buckets aligned to `interval_seconds` since the
/// epoch; each bucket is stamped with its aligned start. Text samples are skipped.
pub fn downsample(samples: &[OrderedSample], interval_seconds: i64) -> Vec<TelemetryPoint> {
    let mut points = Vec::new();
    let mut bucket: Option<(DateTime<Utc>, f64, u32)> = None;

    for sample in samples {
        let Some(value) = sample.value.as_f64() else {
            continue;
        };
        let bucket_ts = align_down(sample.timestamp, interval_seconds);
        if let Some((ts, total, count)) = bucket.as_mut() {
            if *ts == bucket_ts {
                *total += value;
                *count += 1;
                continue;
            }
        }
        if let Some((ts, total, count)) = bucket.take() {
            points.push(TelemetryPoint {
                ts,
                value: SampleValue::Float(total / f64::from(count)),
            });
        }
        bucket = Some((bucket_ts, value, 1));
    }

    if let Some((ts, total, count)) = bucket {
        points.push(TelemetryPoint {
            ts,
            value: SampleValue::Float(total / f64::from(count)),
        });
    }
    points
}

pub async fn get_telemetry_history(
    store: &dyn SampleStore,
    measurements: &MeasurementConfig,
    machine_id: &str,
    metric: &str,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    interval_seconds: Option<i64>,
) -> Result<Vec<TelemetryPoint>, StoreError> {
    let samples = store
        .query_ordered(&measurements.telemetry, metric, machine_id, start, stop)
        .await?;

    Ok(match interval_seconds {
        Some(interval) => downsample(&samples, interval.max(1)),
        None => samples
            .into_iter()
            .map(|sample| TelemetryPoint {
                ts: sample.timestamp,
                value: sample.value,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> DateTime<Utc> {
        crate::time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap()
    }

    fn sample(ms: i64, value: impl Into<SampleValue>) -> OrderedSample {
        OrderedSample {
            timestamp: base() + Duration::milliseconds(ms),
            value: value.into(),
        }
    }

    #[test]
    fn averages_samples_per_bucket() {
        let points = downsample(
            &[
                sample(0, 10),
                sample(400, 20.0),
                sample(900, "n/a"),
                sample(1_100, 5),
                sample(3_050, 7.5),
            ],
            1,
        );
        assert_eq!(
            points,
            vec![
                TelemetryPoint {
                    ts: base(),
                    value: SampleValue::Float(15.0),
                },
                TelemetryPoint {
                    ts: base() + Duration::seconds(1),
                    value: SampleValue::Float(5.0),
                },
                TelemetryPoint {
                    ts: base() + Duration::seconds(3),
                    value: SampleValue::Float(7.5),
                },
            ]
        );
    }

    #[test]
    fn empty_and_text_only_inputs_produce_nothing() {
        assert!(downsample(&[], 5).is_empty());
        assert!(downsample(&[sample(0, "idle")], 5).is_empty());
    }
}
