//! `WebSocket` endpoint for the live task feed.
//!
//! Clients connect to `GET /task_log` and receive `update` frames carrying
//! each new snapshot plus periodic `ping` frames. Any origin may connect.
//! Frames sent by the client are read only to notice disconnects and to
//! answer protocol pings.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tracing::debug;

use crate::session::{ChannelError, ClientChannel, Inbound, run_session};
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and start a client
/// session on it.
///
/// # Route
///
/// `GET /task_log`
pub async fn ws_task_log(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");
    let summary = run_session(
        WsChannel::new(socket),
        &state.snapshots,
        &state.pings,
        &state.shutdown,
    )
    .await;
    debug!(end = ?summary.end, "WebSocket session finished");
}

/// [`ClientChannel`] over an upgraded Axum `WebSocket`.
#[derive(Debug)]
pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    /// Wrap an upgraded socket.
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl ClientChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelError(e.to_string()))
    }

    async fn recv(&mut self) -> Inbound {
        match self.socket.recv().await {
            Some(Ok(Message::Close(_))) | None => Inbound::Closed,
            Some(Ok(Message::Ping(data))) => {
                if self.socket.send(Message::Pong(data)).await.is_err() {
                    debug!("WebSocket client disconnected (pong failed)");
                    return Inbound::Closed;
                }
                Inbound::Ignored
            }
            Some(Err(e)) => {
                debug!("WebSocket error: {e}");
                Inbound::Closed
            }
            // Text and binary from the client carry nothing for this feed.
            Some(Ok(_)) => Inbound::Ignored,
        }
    }
}
