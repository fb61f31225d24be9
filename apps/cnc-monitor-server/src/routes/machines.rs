use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};

use crate::error::{bad_request, map_store_error};
use crate::services::job_history::{get_job_history, JobRecord};
use crate::services::state_timeline::{get_state_timeline, StateInterval};
use crate::services::telemetry::{get_telemetry_history, TelemetryPoint};
use crate::state::AppState;
use crate::store::MachineSummary;
use crate::time::parse_rfc3339;

const MAX_TELEMETRY_INTERVAL_SECONDS: i64 = 24 * 3600;

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct RangeQuery {
    from: String,
    to: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct TelemetryQuery {
    metric: String,
    from: String,
    to: String,
    #[serde(default)]
    interval: Option<i64>,
}

fn parse_range(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), (StatusCode, String)> {
    let start = parse_rfc3339(from).map_err(bad_request)?;
    let stop = parse_rfc3339(to).map_err(bad_request)?;
    if stop < start {
        return Err(bad_request("to must not be before from"));
    }
    Ok((start, stop))
}

#[utoipa::path(
    get,
    path = "/machines",
    tag = "machines",
    responses(
        (status = 200, description = "Machines with a recent state sample", body = Vec<MachineSummary>),
        (status = 500, description = "Sample store error")
    )
)]
pub(crate) async fn list_machines(
    State(state): State<AppState>,
) -> Result<Json<Vec<MachineSummary>>, (StatusCode, String)> {
    let machines = state.store.list_machines().await.map_err(map_store_error)?;
    Ok(Json(machines))
}

#[utoipa::path(
    get,
    path = "/machines/{machine_id}/state-timeline",
    tag = "machines",
    params(
        ("machine_id" = String, Path, description = "Machine id"),
        ("from" = String, Query, description = "Start timestamp (RFC3339)"),
        ("to" = String, Query, description = "End timestamp (RFC3339, exclusive)")
    ),
    responses(
        (status = 200, description = "Contiguous state intervals", body = Vec<StateInterval>),
        (status = 400, description = "Invalid range"),
        (status = 500, description = "Sample store error")
    )
)]
pub(crate) async fn machine_state_timeline(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<StateInterval>>, (StatusCode, String)> {
    let (start, stop) = parse_range(&range.from, &range.to)?;
    let timeline = get_state_timeline(
        state.store.as_ref(),
        &state.config.measurements,
        &machine_id,
        start,
        stop,
    )
    .await
    .map_err(map_store_error)?;
    Ok(Json(timeline))
}

#[utoipa::path(
    get,
    path = "/machines/{machine_id}/jobs",
    tag = "machines",
    params(
        ("machine_id" = String, Path, description = "Machine id"),
        ("from" = String, Query, description = "Start timestamp (RFC3339)"),
        ("to" = String, Query, description = "End timestamp (RFC3339, exclusive)")
    ),
    responses(
        (status = 200, description = "Jobs completed within the range", body = Vec<JobRecord>),
        (status = 400, description = "Invalid range"),
        (status = 500, description = "Sample store error")
    )
)]
pub(crate) async fn machine_jobs(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<JobRecord>>, (StatusCode, String)> {
    let (start, stop) = parse_range(&range.from, &range.to)?;
    let jobs = get_job_history(
        state.store.as_ref(),
        &state.config.measurements,
        &machine_id,
        start,
        stop,
    )
    .await
    .map_err(map_store_error)?;
    Ok(Json(jobs))
}

#[utoipa::path(
    get,
    path = "/machines/{machine_id}/telemetry",
    tag = "machines",
    params(
        ("machine_id" = String, Path, description = "Machine id"),
        ("metric" = String, Query, description = "Telemetry field, e.g. spindle_speed"),
        ("from" = String, Query, description = "Start timestamp (RFC3339)"),
        ("to" = String, Query, description = "End timestamp (RFC3339, exclusive)"),
        ("interval" = Option<i64>, Query, description = "Bucket size in seconds; raw samples when omitted")
    ),
    responses(
        (status = 200, description = "Telemetry history", body = Vec<TelemetryPoint>),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Sample store error")
    )
)]
pub(crate) async fn machine_telemetry(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
    Query(query): Query<TelemetryQuery>,
) -> Result<Json<Vec<TelemetryPoint>>, (StatusCode, String)> {
    let metric = query.metric.trim();
    if metric.is_empty() {
        return Err(bad_request("metric is required"));
    }
    if let Some(interval) = query.interval {
        if !(1..=MAX_TELEMETRY_INTERVAL_SECONDS).contains(&interval) {
            return Err(bad_request(format!(
                "interval must be 1..{MAX_TELEMETRY_INTERVAL_SECONDS} seconds"
            )));
        }
    }
    let (start, stop) = parse_range(&query.from, &query.to)?;

    let points = get_telemetry_history(
        state.store.as_ref(),
        &state.config.measurements,
        &machine_id,
        metric,
        start,
        stop,
        query.interval,
    )
    .await
    .map_err(map_store_error)?;
    Ok(Json(points))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/machines", get(list_machines))
        .route(
            "/machines/{machine_id}/state-timeline",
            get(machine_state_timeline),
        )
        .route("/machines/{machine_id}/jobs", get(machine_jobs))
        .route("/machines/{machine_id}/telemetry", get(machine_telemetry))
}
