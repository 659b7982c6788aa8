//! `WebSocket` handler for the state subscription channel.
//!
//! Clients connect to `GET /ws`. Each connection registers one hub
//! subscriber: the first frame is the state current at registration,
//! then one frame per committed change, in commit order. Nothing the
//! client sends is interpreted; pings are answered.
//!
//! A client that falls behind by more than its queue capacity is dropped
//! by the hub; the connection then closes rather than skipping ahead.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use thunderbird_core::hub::Subscription;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` subscription.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_state(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let Subscription { id, mut receiver } =
        match state.hub.subscribe(state.subscriber_queue_capacity).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(error = %e, "could not register WebSocket subscriber");
                return;
            }
        };
    debug!(%id, "WebSocket client connected");

    loop {
        tokio::select! {
            next = receiver.recv() => {
                let Some(snapshot) = next else {
                    debug!(%id, "subscription ended by hub");
                    break;
                };
                let json = match snapshot.to_json() {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(%id, error = %e, "failed to serialize state document");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(%id, "WebSocket client disconnected (send failed)");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(%id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(%id, "WebSocket error: {e}");
                        break;
                    }
                    // Client text/binary/pong frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unregister(id).await;
}
