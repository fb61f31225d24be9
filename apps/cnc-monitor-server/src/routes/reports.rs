use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::map_store_error;
use crate::services::reports::{get_daily_report, DailyReportRow};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/reports/daily",
    tag = "reports",
    responses(
        (status = 200, description = "Today's runtime and part count per machine", body = Vec<DailyReportRow>),
        (status = 500, description = "Sample store error")
    )
)]
pub(crate) async fn daily_report(
    State(state): State<AppState>,
) -> Result<Json<Vec<DailyReportRow>>, (StatusCode, String)> {
    let rows = get_daily_report(state.store.as_ref(), &state.config.measurements)
        .await
        .map_err(map_store_error)?;
    Ok(Json(rows))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/reports/daily", get(daily_report))
}
