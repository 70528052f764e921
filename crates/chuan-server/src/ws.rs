//! WebSocket signaling relay
//!
//! Admission runs before the handshake: the role slot is reserved in
//! the room, so a losing racer gets a 4xx JSON rejection and can never
//! displace an attached peer. Once upgraded, each socket runs an
//! independent read task and write task; the first to exit tears the
//! pair down and the detach guard notifies the surviving peer exactly
//! once.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use chuan_core::{code, SignalError};
use chuan_signal::frames::Envelope;
use chuan_signal::shutdown::{self, ShutdownReceiver};
use chuan_signal::{
    PeerSocket, Room, Role, WireFrame, PING_INTERVAL, READ_TIMEOUT, ROOM_MAX_AGE, WRITE_TIMEOUT,
};

use crate::api;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    pub code: Option<String>,
    pub role: Option<String>,
    /// Client-scoped label; logged, never interpreted
    pub channel: Option<String>,
}

/// GET /api/ws/webrtc?code=…&role=…&channel=…
pub async fn upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<UpgradeQuery>,
    State(state): State<AppState>,
) -> Response {
    let (room, socket) = match admit(&state, &query) {
        Ok(admitted) => admitted,
        Err((room_code, err)) => {
            debug!(code = ?room_code, error = %err, "upgrade rejected");
            return (
                api::status_for(&err),
                Json(api::error_body(room_code.as_deref(), &err)),
            )
                .into_response();
        }
    };

    debug!(
        code = %room.code(),
        role = %socket.role(),
        channel = query.channel.as_deref().unwrap_or("-"),
        "peer attached"
    );

    let guard = DetachGuard {
        room: room.clone(),
        socket: socket.clone(),
    };
    let shutdown_rx = state.shutdown_rx.clone();
    ws.on_upgrade(move |ws| drive(ws, guard, shutdown_rx))
}

/// Validate the query and reserve the role slot.
fn admit(
    state: &AppState,
    query: &UpgradeQuery,
) -> Result<(Arc<Room>, Arc<PeerSocket>), (Option<String>, SignalError)> {
    let raw = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or((None, SignalError::BadRequest("missing room code".into())))?;

    let normalized = code::normalize_code(raw);
    if !code::validate_code(&normalized) {
        return Err((
            Some(normalized),
            SignalError::BadRequest("invalid room code".into()),
        ));
    }

    let role: Role = query
        .role
        .as_deref()
        .ok_or((
            Some(normalized.clone()),
            SignalError::BadRequest("missing role".into()),
        ))?
        .parse()
        .map_err(|err| (Some(normalized.clone()), err))?;

    let room = state
        .registry
        .lookup(&normalized)
        .ok_or((Some(normalized.clone()), SignalError::RoomNotFound))?;

    if room.is_expired(ROOM_MAX_AGE) {
        return Err((Some(normalized), SignalError::RoomExpired));
    }

    let socket = PeerSocket::new(role);
    room.attach(&socket)
        .map_err(|err| (Some(normalized), err))?;

    Ok((room, socket))
}

/// Detaches on drop, wherever the socket's lifetime ends: normal
/// teardown, task panic, or an upgrade that never completed.
struct DetachGuard {
    room: Arc<Room>,
    socket: Arc<PeerSocket>,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.room.detach(&self.socket);
    }
}

async fn drive(ws: WebSocket, guard: DetachGuard, shutdown_rx: ShutdownReceiver) {
    let room = guard.room.clone();
    let socket = guard.socket.clone();

    let (sink, stream) = ws.split();
    let mut write_task = tokio::spawn(write_loop(sink, socket.clone(), shutdown_rx));
    let mut read_task = tokio::spawn(read_loop(stream, room, socket));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    drop(guard);
}

/// Drain the send queue onto the wire; ping on an interval; close with
/// "going away" when the process shuts down.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    socket: Arc<PeerSocket>,
    shutdown_rx: ShutdownReceiver,
) {
    let start = tokio::time::Instant::now() + PING_INTERVAL;
    let mut ping = tokio::time::interval_at(start, PING_INTERVAL);

    loop {
        tokio::select! {
            frame = socket.next_outbound() => {
                let Some(frame) = frame else { break };
                let message = match frame {
                    WireFrame::Text(text) => Message::Text(text),
                    WireFrame::Binary(bytes) => Message::Binary(bytes),
                };
                match timeout(WRITE_TIMEOUT, sink.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(socket = socket.id(), error = %e, "socket write failed");
                        break;
                    }
                    Err(_) => {
                        debug!(socket = socket.id(), "socket write deadline expired");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if timeout(WRITE_TIMEOUT, sink.send(Message::Ping(Vec::new())))
                    .await
                    .map_or(true, |r| r.is_err())
                {
                    break;
                }
            }
            _ = shutdown::wait(shutdown_rx.clone()) => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break;
            }
        }
    }
}

/// Read frames under a rolling deadline and relay them to the peer.
async fn read_loop(mut stream: SplitStream<WebSocket>, room: Arc<Room>, socket: Arc<PeerSocket>) {
    loop {
        let message = match timeout(READ_TIMEOUT, stream.next()).await {
            Err(_) => {
                debug!(socket = socket.id(), "read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(socket = socket.id(), error = %e, "socket read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => match Envelope::from_json(&text) {
                Ok(envelope) => {
                    let farewell = envelope.is_disconnection();
                    // Forward the original text so the peer sees
                    // byte-identical JSON.
                    room.forward(socket.role(), WireFrame::Text(text));
                    if farewell {
                        debug!(socket = socket.id(), "client sent farewell");
                        break;
                    }
                }
                Err(e) => {
                    debug!(socket = socket.id(), error = %e, "undecodable text frame dropped");
                    room.touch();
                }
            },
            Message::Binary(bytes) => {
                room.forward(socket.role(), WireFrame::Binary(bytes));
            }
            Message::Ping(_) | Message::Pong(_) => {
                room.touch();
            }
            Message::Close(_) => break,
        }
    }
}
