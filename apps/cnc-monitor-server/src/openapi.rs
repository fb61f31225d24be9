use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::routes::health::HealthResponse;
use crate::services::job_history::JobRecord;
use crate::services::live::Snapshot;
use crate::services::reports::DailyReportRow;
use crate::services::state_timeline::StateInterval;
use crate::services::telemetry::TelemetryPoint;
use crate::state::AppState;
use crate::store::MachineSummary;

#[derive(OpenApi)]
#[openapi(
    info(title = "CNC Monitor API"),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::machines::list_machines,
        crate::routes::machines::machine_state_timeline,
        crate::routes::machines::machine_jobs,
        crate::routes::machines::machine_telemetry,
        crate::routes::reports::daily_report,
        crate::routes::live::machine_live_ws
    ),
    components(schemas(
        HealthResponse,
        MachineSummary,
        StateInterval,
        JobRecord,
        TelemetryPoint,
        DailyReportRow,
        Snapshot
    )),
    tags(
        (name = "machines", description = "Machine listing and per-machine history"),
        (name = "reports", description = "Daily aggregates"),
        (name = "live", description = "Live snapshot stream")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or(serde_json::Value::Null)
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}
