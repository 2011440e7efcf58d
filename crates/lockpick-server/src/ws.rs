//! WebSocket transport: upgrade, per-connection loop, and the realtime
//! message dispatcher.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use uuid::Uuid;

use lockpick_core::protocol::{Frame, GuessPayload, PlayerReadyPayload};

use crate::hub::{ClientHandle, CLIENT_BACKLOG};
use crate::state::AppState;

pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Per-connection loop: forward hub broadcasts to the socket and dispatch
/// inbound frames to the engine.
pub async fn handle_socket(state: Arc<AppState>, mut socket: WebSocket) {
    let client_id = Uuid::new_v4();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(CLIENT_BACKLOG);
    state.hub.register(ClientHandle { id: client_id, tx });
    tracing::debug!(client = %client_id, "websocket connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                // A closed egress means the hub evicted this client.
                let Some(frame) = outbound else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => dispatch(&state, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(client = %client_id, %err, "websocket read error");
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }

    state.hub.unregister(client_id);
    tracing::debug!(client = %client_id, "websocket disconnected");
}

/// Decode an inbound frame and route it by tag. Unknown types and
/// malformed payloads are logged and dropped; realtime errors never
/// disconnect the client.
async fn dispatch(state: &AppState, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(%err, "ignoring malformed frame");
            return;
        }
    };

    match frame.kind.as_str() {
        "guess" => match serde_json::from_value::<GuessPayload>(frame.payload) {
            Ok(payload) => state.engine.handle_guess(payload).await,
            Err(err) => tracing::debug!(%err, "ignoring malformed guess payload"),
        },
        "player_ready" => match serde_json::from_value::<PlayerReadyPayload>(frame.payload) {
            Ok(payload) => state.engine.handle_player_ready(payload).await,
            Err(err) => tracing::debug!(%err, "ignoring malformed player_ready payload"),
        },
        other => tracing::debug!(kind = other, "ignoring unknown frame type"),
    }
}
