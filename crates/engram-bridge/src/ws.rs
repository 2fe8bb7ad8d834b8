//! WebSocket event channel.
//!
//! On connect the client gets one snapshot message, then a live stream of
//! change-bus events as `{type, payload}` frames. Reconnection is the
//! client's problem; a client that stops reading is disconnected when a
//! send exceeds the per-connection timeout.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::routes::AppState;

/// A send slower than this drops the client.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if !state.engine.settings.current().features.enable_websocket {
        return (StatusCode::FORBIDDEN, "websocket channel disabled").into_response();
    }
    ws.on_upgrade(move |socket| stream_events(state, socket))
}

async fn stream_events(state: AppState, mut socket: WebSocket) {
    let mut subscription = state.engine.bus.subscribe();

    let snapshot = json!({
        "type": "snapshot",
        "payload": {
            "memoryCount": state.engine.memories.count().await,
            "taskCount": state.engine.tasks.count().await,
            "projects": state.engine.memories.projects().await,
            "port": state.port,
        }
    });
    if send_frame(&mut socket, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let frame = json!({ "type": event.kind.as_str(), "payload": event });
                if send_frame(&mut socket, &frame).await.is_err() {
                    tracing::debug!("websocket client gone or too slow; dropping");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Clients only ever send pings/closes; anything else is
                    // ignored rather than an error.
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &serde_json::Value) -> Result<(), ()> {
    let text = frame.to_string();
    match tokio::time::timeout(SEND_TIMEOUT, socket.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(()),
    }
}
