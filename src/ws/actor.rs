//! Actor-per-connection lifecycle: admission has already happened by the
//! time a connection reaches `run_connection`; from here the connection is
//! registered, serviced, and guaranteed to be cleaned out of the registry on
//! any form of disconnect.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::state::AppState;
use crate::ws::events::ClientEvent;
use crate::ws::{relay, signaling};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents registry leaks from abrupt disconnects the transport never
/// reports.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity and display profile resolved for a connection at admission time.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub full_name: String,
}

/// Run the actor for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: parses incoming JSON events and hands them to the
///   signaling router
///
/// The mpsc sender is the connection handle stored in the presence registry;
/// any part of the system can push events to this client through it.
pub async fn run_connection(socket: WebSocket, state: AppState, user: AuthedUser) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Each connection gets its own id so that when this connection's
    // disconnect fires after the same user has already reconnected, the
    // newer registry entry survives.
    let conn_id = Uuid::now_v7();

    state.registry.register(&user.id, conn_id, tx.clone());
    relay::broadcast_presence(&state.registry);

    tracing::info!(
        user_id = %user.id,
        name = %user.full_name,
        "User connected"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            signaling::handle_client_event(&state.registry, &user.id, event);
                        }
                        Err(e) => {
                            // One malformed frame never tears down the connection.
                            tracing::debug!(
                                user_id = %user.id,
                                error = %e,
                                "Ignoring unrecognized client frame"
                            );
                        }
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %user.id,
                        "Received binary frame (expected JSON text), ignoring"
                    );
                }
                Message::Pong(_) => {
                    // Pong received — notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user.id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(user_id = %user.id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Conditional removal: if this user already reconnected, the newer entry
    // stays and no presence change is announced for this stale teardown.
    if state.registry.unregister(&user.id, conn_id) {
        relay::broadcast_presence(&state.registry);
    }

    tracing::info!(
        user_id = %user.id,
        name = %user.full_name,
        "User disconnected"
    );
}

/// Writer task: receives messages from the mpsc channel and forwards them to
/// the WebSocket sink, preserving enqueue order.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
