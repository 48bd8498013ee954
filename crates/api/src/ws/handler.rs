use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use clipforge_core::error::CoreError;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/v1/ws/jobs/{id}
///
/// Upgrades to a WebSocket that streams the job's progress events. Unknown
/// jobs are rejected with 404 before the upgrade.
pub async fn job_progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    if state.orchestrator.get(&job_id).await?.is_none() {
        return Err(CoreError::job_not_found(job_id).into());
    }
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, job_id))
        .into_response())
}

/// Manage a single WebSocket connection after upgrade.
///
/// Registers with `WsManager` for control frames and with the broadcaster
/// for progress events, then:
///   1. Sends a `connected` confirmation.
///   2. Spawns a sender task that merges both sources into the sink.
///   3. Answers text `ping` with `{"type":"pong"}` on the current task.
///   4. Unsubscribes on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, job_id: String) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "WebSocket connected");

    let ws_manager = state.ws_manager.clone();
    let broadcaster = state.orchestrator.broadcaster().clone();

    let mut control = ws_manager.add(conn_id.clone(), job_id.clone()).await;
    let mut subscription = broadcaster.subscribe(&job_id).await;
    let subscriber_id = subscription.id.clone();

    let connected = json!({
        "type": "connected",
        "job_id": job_id,
        "message": format!("Connected to job {job_id}"),
    });
    ws_manager
        .send_to(&conn_id, Message::Text(connected.to_string().into()))
        .await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                Some(msg) = control.recv() => msg,
                event = subscription.receiver.recv() => match event {
                    Some(event) => match serde_json::to_string(&event) {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to serialize progress event");
                            continue;
                        }
                    },
                    // Broadcaster closed (shutdown).
                    None => Message::Close(None),
                },
                else => break,
            };

            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) if text.as_str().trim() == "ping" => {
                let pong = json!({ "type": "pong" }).to_string();
                ws_manager.send_to(&conn_id, Message::Text(pong.into())).await;
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    broadcaster.unsubscribe(&job_id, &subscriber_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "WebSocket disconnected");
}
