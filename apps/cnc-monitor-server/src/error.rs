use axum::http::StatusCode;

use crate::store::StoreError;

pub fn map_store_error(err: StoreError) -> (StatusCode, String) {
    let status = match &err {
        StoreError::Database(sqlx::Error::PoolTimedOut) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::error!(error = %err, status = %status, "store query failed");

    let message = match status {
        StatusCode::SERVICE_UNAVAILABLE => "Sample store unavailable",
        _ => "Sample store error",
    };

    (status, message.to_string())
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}
