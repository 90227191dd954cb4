//! WebSocket transport.
//!
//! HTTP surface of the relay, built on axum:
//!
//! - `GET /` answers with a JSON greeting (liveness check)
//! - `GET /ws` upgrades to a WebSocket carrying the JSON event envelope
//!
//! Every socket gets two tasks. The reader decodes text frames into
//! [`ClientMessage`]s and dispatches them to the driver, and reports ping and
//! pong frames as heartbeats. The writer drains the connection's outbound
//! queue, which is the only path by which anything is written to the socket,
//! and pings the client every heartbeat interval. A live client answers those
//! pings even while it sends nothing, so only dead sockets hit the idle
//! timeout. When either task ends the other is aborted and the driver is told
//! the connection closed.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
    routing::get,
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use huddle_core::env::Environment;
use huddle_proto::{ClientMessage, ConnectionId, MAX_MESSAGE_SIZE};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{SharedState, driver::ServerEvent};

/// Greeting served on `GET /`.
pub const GREETING: &str = "Huddle presence relay";

/// Item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    /// Encoded JSON envelope, sent as one text frame
    Text(String),
    /// Send a close frame and stop writing
    Close(String),
}

/// Build the axum router for the relay.
pub(crate) fn router(shared: Arc<SharedState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn index() -> Json<&'static str> {
    Json(GREETING)
}

async fn ws_handler(ws: WebSocketUpgrade, State(shared): State<Arc<SharedState>>) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE).on_upgrade(move |socket| handle_socket(socket, shared))
}

/// Drive one WebSocket from upgrade to teardown.
async fn handle_socket(socket: WebSocket, shared: Arc<SharedState>) {
    let connection_id = ConnectionId::from_u64(shared.env.random_u64());
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    tracing::debug!(%connection_id, "WebSocket upgraded");

    {
        let mut relay = shared.relay.lock().await;
        if !relay.attach(connection_id.clone(), tx) {
            tracing::warn!(%connection_id, "Connection id already in use, dropping socket");
            return;
        }
        if let Err(e) = relay.dispatch(ServerEvent::ConnectionAccepted {
            connection_id: connection_id.clone(),
        }) {
            tracing::warn!(%connection_id, "Connection rejected: {}", e);
            relay.detach(&connection_id);
            return;
        }
    }

    let mut send_task =
        tokio::spawn(write_loop(sink, rx, shared.heartbeat_interval, connection_id.clone()));
    let mut recv_task =
        tokio::spawn(read_loop(stream, Arc::clone(&shared), connection_id.clone()));

    let reason = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            "closed by server"
        }
        _ = &mut recv_task => {
            send_task.abort();
            "closed by client"
        }
    };

    let mut relay = shared.relay.lock().await;
    relay.detach(&connection_id);
    if let Err(e) = relay.dispatch(ServerEvent::ConnectionClosed {
        connection_id: connection_id.clone(),
        reason: reason.to_string(),
    }) {
        tracing::warn!(%connection_id, "Close processing error: {}", e);
    }
}

/// Read frames until the client goes away.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    shared: Arc<SharedState>,
    connection_id: ConnectionId,
) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let message = match ClientMessage::decode(text.as_str()) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(%connection_id, "Dropping malformed message: {}", e);
                        continue;
                    },
                };

                let mut relay = shared.relay.lock().await;
                if let Err(e) = relay.dispatch(ServerEvent::MessageReceived {
                    connection_id: connection_id.clone(),
                    message,
                }) {
                    tracing::warn!(%connection_id, "Message processing error: {}", e);
                }
            },
            Ok(Message::Binary(_)) => {
                tracing::warn!(%connection_id, "Received unsupported binary message");
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(%connection_id, "Client sent close frame");
                break;
            },
            // axum answers pings itself; both directions prove the client alive
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                let mut relay = shared.relay.lock().await;
                if let Err(e) =
                    relay.dispatch(ServerEvent::Heartbeat { connection_id: connection_id.clone() })
                {
                    tracing::debug!(%connection_id, "Heartbeat processing error: {}", e);
                }
            },
            Err(e) => {
                tracing::debug!(%connection_id, "Receive error: {}", e);
                break;
            },
        }
    }
}

/// Drain the outbound queue onto the socket, pinging between messages.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    heartbeat_interval: Duration,
    connection_id: ConnectionId,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the client was just heard from.
    heartbeat.tick().await;

    loop {
        let outbound = tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(outbound) => outbound,
                None => break,
            },
            _ = heartbeat.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    tracing::debug!(%connection_id, "Ping failed, closing connection: {}", e);
                    break;
                }
                continue;
            }
        };

        match outbound {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!(%connection_id, "Send error, closing connection: {}", e);
                    break;
                }
            },
            Outbound::Close(reason) => {
                let frame = CloseFrame { code: close_code::NORMAL, reason: reason.into() };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(%connection_id, "Close frame not delivered: {}", e);
                }
                break;
            },
        }
    }
}
