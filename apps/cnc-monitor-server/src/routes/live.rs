use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::services::live::{LiveSession, LiveSettings, Snapshot};
use crate::state::AppState;

const SNAPSHOT_BUFFER: usize = 4;

#[utoipa::path(
    get,
    path = "/ws/machines/{machine_id}",
    tag = "live",
    params(("machine_id" = String, Path, description = "Machine id")),
    responses(
        (status = 101, description = "WebSocket upgrade; one Snapshot JSON message per poll", body = Snapshot)
    )
)]
pub(crate) async fn machine_live_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state, machine_id))
}

/// Runs one live session for the connected client and forwards its snapshots
/// until either side goes away.
async fn stream_snapshots(socket: WebSocket, state: AppState, machine_id: String) {
    let cancel = state.shutdown.child_token();
    let (tx, mut rx) = mpsc::channel::<Snapshot>(SNAPSHOT_BUFFER);
    let session = LiveSession::new(
        state.store.clone(),
        state.config.measurements.clone(),
        LiveSettings::from_config(&state.config),
        machine_id.clone(),
    );
    let poller = tokio::spawn(session.run(tx, cancel.clone()));
    tracing::info!(machine_id = %machine_id, "live subscriber connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                let payload = match serde_json::to_string(&snapshot) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(machine_id = %machine_id, error = %err, "failed to encode snapshot");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    tracing::debug!(machine_id = %machine_id, error = %err, "live socket receive error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    cancel.cancel();
    drop(rx);
    if let Err(err) = poller.await {
        tracing::warn!(machine_id = %machine_id, error = %err, "live session task failed");
    }
    tracing::info!(machine_id = %machine_id, "live subscriber disconnected");
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/machines/{machine_id}", get(machine_live_ws))
}
