//! WebSocket endpoint for real-time change events.
//!
//! Connections start anonymous and receive only broadcast-to-all traffic.
//! A client binds its identity with a post-connect handshake:
//!
//! ```json
//! {"type": "AUTH", "payload": {"token": "<session token>"}}
//! ```
//!
//! After a successful handshake the connection also receives
//! identity-scoped events. Liveness is probed with protocol pings on a
//! fixed interval; a connection that misses a cycle is terminated.

use crate::realtime::{ConnectionId, Outbound};
use crate::server::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Message from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientMessage {
    /// Identity handshake.
    Auth {
        /// Session token issued by the auth service.
        token: String,
    },
}

/// `GET /ws`: upgrade to a change-event stream.
pub async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let connection_id = state.registry.register(tx);
    info!(connection = %connection_id, total = state.registry.len(), "websocket connected");

    // Writer: drains the registry channel onto the socket. Ends when the
    // registry drops the connection or the socket breaks.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                Outbound::Event(json) => Message::Text(json),
                Outbound::Ping => Message::Ping(Vec::new()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Reader: pongs keep the connection alive; an AUTH frame binds identity.
    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Pong(_) => reader_state.registry.mark_alive(connection_id),
                Message::Text(text) => {
                    handle_client_message(&reader_state, connection_id, &text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.registry.deregister(connection_id);
    info!(connection = %connection_id, total = state.registry.len(), "websocket disconnected");
}

async fn handle_client_message(state: &AppState, connection_id: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Auth { token }) => match state.verifier.verify(&token).await {
            Some(user) => {
                state.registry.bind_user(connection_id, user);
                info!(connection = %connection_id, user = %user, "websocket identity bound");
            }
            None => {
                warn!(connection = %connection_id, "websocket handshake with invalid token");
            }
        },
        Err(e) => {
            debug!(connection = %connection_id, error = %e, "ignoring unparseable client message");
        }
    }
}
