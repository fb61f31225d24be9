pub mod health;
pub mod live;
pub mod machines;
pub mod reports;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(machines::router())
        .merge(reports::router())
        .merge(live::router())
        .nest("/api", crate::openapi::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeasurementConfig;
    use crate::store::MemorySampleStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::Value as JsonValue;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, JsonValue) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, body)
    }

    fn app(store: Arc<MemorySampleStore>) -> Router {
        router(crate::test_support::test_state(store))
    }

    fn store() -> Arc<MemorySampleStore> {
        Arc::new(MemorySampleStore::new(MeasurementConfig::default().state))
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (status, body) = get_json(app(store()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn state_timeline_returns_intervals() {
        let m = MeasurementConfig::default();
        let store = store();
        let base = crate::time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        for (offset, state) in [(0, 0), (10, 1), (25, 1), (30, 2)] {
            store
                .insert("m1", &m.state, &m.state_field, base + Duration::seconds(offset), state)
                .await;
        }

        let (status, body) = get_json(
            app(store),
            "/machines/m1/state-timeline?from=2024-01-01T00:00:00Z&to=2024-01-01T01:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let intervals = body.as_array().unwrap();
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[1]["state"], 1);
        assert_eq!(intervals[1]["start"], "2024-01-01T00:00:10Z");
        assert_eq!(intervals[1]["end"], "2024-01-01T00:00:30Z");
        assert_eq!(intervals[1]["duration_sec"], 20);
        assert_eq!(intervals[2]["duration_sec"], 0);
    }

    #[tokio::test]
    async fn reversed_or_malformed_range_is_rejected() {
        let (status, _) = get_json(
            app(store()),
            "/machines/m1/jobs?from=2024-01-02T00:00:00Z&to=2024-01-01T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            get_json(app(store()), "/machines/m1/state-timeline?from=soon&to=later").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app(store()), "/machines/m1/jobs?from=2024-01-01T00:00:00Z").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn jobs_route_pairs_events() {
        let m = MeasurementConfig::default();
        let store = store();
        let base = crate::time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        store.insert_job_event("m1", &m.job, base, 101, 1).await;
        store
            .insert_job_event("m1", &m.job, base + Duration::seconds(45), 101, 0)
            .await;
        store
            .insert_job_event("m1", &m.job, base + Duration::seconds(50), 102, 1)
            .await;

        let (status, body) = get_json(
            app(store),
            "/machines/m1/jobs?from=2024-01-01T00:00:00Z&to=2024-01-01T01:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!([{
                "job_id": "101",
                "start": "2024-01-01T00:00:00Z",
                "end": "2024-01-01T00:00:45Z",
                "duration_sec": 45
            }])
        );
    }

    #[tokio::test]
    async fn telemetry_route_downsamples_on_request() {
        let m = MeasurementConfig::default();
        let store = store();
        let base = crate::time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        for (ms, value) in [(0, 10.0), (500, 20.0), (1_000, 30.0)] {
            store
                .insert("m1", &m.telemetry, "temperature", base + Duration::milliseconds(ms), value)
                .await;
        }

        let (status, body) = get_json(
            app(store.clone()),
            "/machines/m1/telemetry?metric=temperature&from=2024-01-01T00:00:00Z&to=2024-01-01T00:01:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);

        let (status, body) = get_json(
            app(store.clone()),
            "/machines/m1/telemetry?metric=temperature&from=2024-01-01T00:00:00Z&to=2024-01-01T00:01:00Z&interval=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["value"], 15.0);
        assert_eq!(body[1]["value"], 30.0);

        let (status, _) = get_json(
            app(store),
            "/machines/m1/telemetry?metric=temperature&from=2024-01-01T00:00:00Z&to=2024-01-01T00:01:00Z&interval=0",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn machines_and_report_list_recent_machines() {
        let m = MeasurementConfig::default();
        let store = store();
        let now = Utc::now();
        store.insert("m2", &m.state, &m.state_field, now, 2).await;
        store.insert("m1", &m.state, &m.state_field, now, 1).await;
        store
            .insert("m1", &m.state, &m.state_field, now - Duration::hours(3), 1)
            .await;

        let (status, body) = get_json(app(store.clone()), "/machines").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["machine_id"], "m1");
        assert_eq!(body[0]["current_state"], 1);
        assert_eq!(body[1]["machine_id"], "m2");

        let (status, body) = get_json(app(store), "/reports/daily").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["machine_id"], "m1");
        assert_eq!(rows[1]["part_count"], 0);
    }

    #[tokio::test]
    async fn store_failure_maps_to_server_error() {
        let store = store();
        store.set_failing(true);
        let resp = app(store)
            .oneshot(Request::builder().uri("/reports/daily").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn live_route_requires_websocket_upgrade() {
        let resp = app(store())
            .oneshot(Request::builder().uri("/ws/machines/m1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let (status, body) = get_json(app(store()), "/api/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/machines/{machine_id}/state-timeline"].is_object());
        assert!(body["paths"]["/reports/daily"].is_object());
    }
}
