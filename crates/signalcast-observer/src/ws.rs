//! `WebSocket` handler binding one dashboard to one hub session.
//!
//! Clients connect to `GET /ws`. Each connection registers a session with
//! the [`ConnectionHub`](signalcast_core::hub::ConnectionHub) and then
//! shuttles traffic both ways: queued payloads go out as text frames,
//! inbound text frames are handed to the hub as commands.
//!
//! The session ends when the client closes, a send fails, or the hub
//! drops the session (unresponsive client or relay shutdown). Every write
//! is bounded by the hub's send timeout; a client that stops reading
//! has its connection dropped rather than pinning this task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use signalcast_core::hub::SessionHandle;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` session.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Why a socket write did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendFailure {
    /// The connection is gone.
    Closed,
    /// The client stopped reading and the write outlived the timeout.
    Stalled,
}

/// Holds one slot in [`AppState::open_sockets`] for the life of a socket
/// task.
struct OpenSocket(Arc<AtomicUsize>);

impl OpenSocket {
    fn register(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenSocket {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn send_bounded(
    socket: &mut WebSocket,
    msg: Message,
    limit: Duration,
) -> Result<(), SendFailure> {
    match tokio::time::timeout(limit, socket.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(SendFailure::Closed),
        Err(_) => Err(SendFailure::Stalled),
    }
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let _open = OpenSocket::register(&state.open_sockets);
    let SessionHandle { id, mut rx } = state.hub.connect();
    let limit = state.send_timeout;
    debug!(session = %id, "WebSocket client connected");

    loop {
        tokio::select! {
            // Next payload queued by the hub.
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    debug!(session = %id, "Session dropped by hub, closing WebSocket");
                    let _ = send_bounded(&mut socket, Message::Close(None), limit).await;
                    break;
                };
                let msg = Message::Text(String::from(&*payload).into());
                match send_bounded(&mut socket, msg, limit).await {
                    Ok(()) => {}
                    Err(SendFailure::Closed) => {
                        debug!(session = %id, "WebSocket client disconnected (send failed)");
                        break;
                    }
                    Err(SendFailure::Stalled) => {
                        warn!(
                            session = %id,
                            timeout_ms = limit.as_millis(),
                            "WebSocket client stopped reading, dropping connection"
                        );
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = state.hub.handle_message(Some(id), text.as_str());
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Ok(text) = std::str::from_utf8(&bytes) {
                            let _ = state.hub.handle_message(Some(id), text);
                        } else {
                            debug!(session = %id, "Ignoring non-UTF-8 binary frame");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if send_bounded(&mut socket, Message::Pong(data), limit).await.is_err() {
                            debug!(session = %id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(session = %id, "WebSocket error: {e}");
                        break;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                }
            }
        }
    }

    state.hub.disconnect(id);
}
