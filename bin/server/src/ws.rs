//! WebSocket transport adapter.
//!
//! Each socket is one registry connection. Inbound text frames are client
//! events such as `{"event":"join_chat","data":42}`; outbound frames are
//! pushed records (`new_message`) and rejected-event reports (`error`).
//! Closing the socket removes every membership the connection held.

use crate::app::AppState;
use crate::error::ApiError;
use alumnet_core::UserId;
use alumnet_messaging::{ConnectionId, ConnectionRegistry, MessageRecord, RoomKey};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const REPLY_CAPACITY: usize = 16;

/// Events a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe this connection to the given user's room.
    JoinChat(UserId),
}

/// Events the server sends.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent<'a> {
    NewMessage(&'a MessageRecord),
    Error(&'a ApiError),
}

/// `GET /ws`
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

/// Applies one client text frame to the registry and returns the room that
/// was joined.
///
/// # Errors
///
/// Returns an `invalid_argument` error for unparseable frames, unknown
/// events, malformed user ids, or a connection that is no longer live.
pub fn handle_frame(
    registry: &ConnectionRegistry,
    connection_id: &ConnectionId,
    text: &str,
) -> Result<RoomKey, ApiError> {
    let event: ClientEvent = serde_json::from_str(text)
        .map_err(|e| ApiError::invalid(format!("unrecognized event: {e}")))?;

    match event {
        ClientEvent::JoinChat(user_id) => {
            let room = RoomKey::for_user(user_id);
            let added = registry.join(connection_id, &room)?;
            info!(%connection_id, %room, added, "joined chat");
            Ok(room)
        }
    }
}

fn encode(event: &ServerEvent<'_>) -> Option<String> {
    serde_json::to_string(event)
        .map_err(|e| warn!(error = %e, "failed to encode server event"))
        .ok()
}

async fn serve_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionId::generate();
    let (outbox, mut pushes) = mpsc::channel(state.messaging.outbox_capacity.max(1));
    state.registry.connect(connection_id.clone(), outbox);
    info!(%connection_id, live = state.registry.connection_count(), "client connected");

    let (mut sink, mut stream) = socket.split();
    let (replies, mut reply_rx) = mpsc::channel::<String>(REPLY_CAPACITY);

    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(record) = pushes.recv() => encode(&ServerEvent::NewMessage(&record)),
                Some(reply) = reply_rx.recv() => Some(reply),
                else => break,
            };
            let Some(frame) = frame else { continue };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let Err(err) = handle_frame(&state.registry, &connection_id, text.as_str()) else {
                    continue;
                };
                debug!(%connection_id, error = %err, "rejected client event");
                let Some(reply) = encode(&ServerEvent::Error(&err)) else {
                    continue;
                };
                if replies.try_send(reply).is_err() {
                    warn!(%connection_id, "reply queue full, dropping error report");
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%connection_id, error = %e, "socket read failed");
                break;
            }
        }
    }

    let user = state.registry.user_of(&connection_id);
    let rooms = state.registry.leave(&connection_id);
    writer.abort();
    info!(
        %connection_id,
        user = ?user,
        rooms,
        live = state.registry.connection_count(),
        open_rooms = state.registry.room_count(),
        "client disconnected"
    );
}
