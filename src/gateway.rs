//! WebSocket gateway (spec §6 "client join URL", §4.6 connection lifecycle).
//! Grounded on `network/gateway.rs`'s accept-loop-spawns-per-connection-task
//! shape, adapted to an `axum` WebSocket upgrade instead of a raw
//! `TcpListener`, the way `http.rs` already sets up an axum server for
//! metrics.

use crate::envelope::{ClientEnvelope, JoinQuery, ServerEnvelope};
use crate::error::EnvelopeError;
use crate::presence::Cursor;
use crate::room::{JoinPayload, RoomHandle, OUTBOUND_MAILBOX_CAPACITY};
use crate::session::SessionManager;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone)]
struct GatewayState {
    sessions: Arc<SessionManager>,
}

/// Bind and serve the room gateway. Long-running; spawn in the background
/// alongside the metrics HTTP server (spec §10.5).
pub async fn run(
    addr: SocketAddr,
    room_path_prefix: &str,
    sessions: Arc<SessionManager>,
) -> std::io::Result<()> {
    let route = format!("{room_path_prefix}/:room_id");
    let app = Router::new()
        .route(&route, get(handle_upgrade))
        .with_state(GatewayState { sessions });

    tracing::info!(%addr, route, "gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn handle_upgrade(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
    Query(query): Query<JoinQuery>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state.sessions, room_id, query))
}

#[tracing::instrument(skip(socket, sessions, query), fields(room_id = %room_id, user_id = %query.user_id))]
async fn handle_connection(
    socket: WebSocket,
    sessions: Arc<SessionManager>,
    room_id: String,
    query: JoinQuery,
) {
    let conn_id = Uuid::new_v4();
    let room = sessions.get_or_create_room(&room_id).await;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEnvelope>(OUTBOUND_MAILBOX_CAPACITY);
    let payload = JoinPayload {
        user_id: query.user_id,
        display_name: query.display_name,
        color: query.color,
        location: query.location,
        initial_storage: None,
    };

    let Some(welcome) = room.attach(conn_id, payload, outbound_tx).await else {
        tracing::warn!("room actor gone before attach completed");
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    let welcome_envelope = ServerEnvelope::StorageInit {
        root: welcome.root,
        presence: welcome.presence,
        cursors: welcome.cursors,
        live_state: welcome.live_state,
        cursor_throttle_ms: welcome.cursor_throttle_ms,
    };
    let Ok(welcome_text) = serde_json::to_string(&welcome_envelope) else {
        room.detach(conn_id).await;
        return;
    };
    if ws_tx.send(Message::Text(welcome_text)).await.is_err() {
        room.detach(conn_id).await;
        return;
    }

    // Both the room's broadcast fan-out (`outbound_rx`) and this connection's
    // own error replies write through the same `ws_tx`, so both are driven
    // from this one loop rather than a separate writer task — otherwise a
    // malformed-envelope close reason would race a task that already owns
    // the only handle to the socket's write half.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = dispatch(&room, conn_id, &text).await {
                            tracing::debug!(error = %err, error_code = err.error_code(), "closing connection");
                            crate::metrics::MALFORMED_ENVELOPES.inc();
                            let reason = ServerEnvelope::Error { reason: err.to_string() };
                            if let Ok(text) = serde_json::to_string(&reason) {
                                let _ = ws_tx.send(Message::Text(text)).await;
                            }
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            envelope = outbound_rx.recv() => {
                match envelope {
                    Some(envelope) => {
                        let Ok(text) = serde_json::to_string(&envelope) else {
                            continue;
                        };
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    room.detach(conn_id).await;
}

/// Parse and route one inbound envelope. A parse failure is spec §7's
/// `MalformedEnvelope`, which — unlike every other dropped-op error kind —
/// terminates the offending connection rather than being silently ignored;
/// the caller sends the reason and closes the socket.
async fn dispatch(room: &RoomHandle, conn_id: Uuid, text: &str) -> Result<(), EnvelopeError> {
    let envelope: ClientEnvelope = serde_json::from_str(text)
        .map_err(|e| EnvelopeError::MalformedEnvelope(e.to_string()))?;

    match envelope {
        ClientEnvelope::StorageInit { root } => room.seed(conn_id, root).await,
        ClientEnvelope::StorageOps { ops } => room.ingest_ops(conn_id, ops).await,
        ClientEnvelope::PresenceUpdate { partial } => room.update_presence(conn_id, partial).await,
        ClientEnvelope::CursorUpdate { x, y, viewport } => {
            room.update_cursor(conn_id, Cursor { x, y, viewport }).await;
        }
        ClientEnvelope::LiveStateSet {
            key,
            value,
            timestamp,
            merge,
        } => room.set_live_state(conn_id, key, value, timestamp, merge).await,
        ClientEnvelope::Message { payload } => room.broadcast(conn_id, payload).await,
        ClientEnvelope::Undo => room.undo(conn_id).await,
        ClientEnvelope::Redo => room.redo(conn_id).await,
    }
    Ok(())
}
