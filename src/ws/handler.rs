//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::relay::{ConnId, RelayHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ClientMsg;

/// Outbound frames buffered per connection before new ones are dropped
const OUTBOX_CAPACITY: usize = 256;

/// WebSocket upgrade handler. Connections are anonymous.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay.clone()))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, relay: RelayHandle) {
    let conn_id: ConnId = Uuid::new_v4().simple().to_string();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);

    // Spawn writer task: relay outbox -> WebSocket
    let mut writer_handle = tokio::spawn(run_writer(conn_id.clone(), ws_sink, rx));

    relay.connect(conn_id.clone(), tx).await;

    // Whichever side finishes first ends the connection. The writer finishes
    // once the hub drops the outbox, e.g. when the sweep evicts a silent client.
    tokio::select! {
        _ = run_reader(&conn_id, ws_stream, &relay) => {
            writer_handle.abort();
        }
        _ = &mut writer_handle => {
            debug!(conn_id = %conn_id, "Outbox closed by relay");
        }
    }

    relay.disconnect(conn_id.clone()).await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

async fn run_writer(
    conn_id: ConnId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, frame).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            return;
        }
    }

    // Outbox dropped by the hub: close the socket
    if let Err(e) = ws_sink.send(Message::Close(None)).await {
        debug!(conn_id = %conn_id, error = %e, "WebSocket close failed");
    }
    let _ = ws_sink.close().await;
}

/// Reader loop: WebSocket -> relay hub
async fn run_reader(conn_id: &ConnId, mut ws_stream: SplitStream<WebSocket>, relay: &RelayHandle) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_inbound() {
                    warn!(conn_id = %conn_id, "Rate limited inbound message");
                    continue;
                }

                match ClientMsg::decode(&text) {
                    Ok(msg) => relay.frame(conn_id.clone(), msg).await,
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                        relay.touch(conn_id.clone()).await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
                relay.touch(conn_id.clone()).await;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                relay.touch(conn_id.clone()).await;
            }
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a pre-encoded frame over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, frame: String) -> Result<(), axum::Error> {
    sink.send(Message::Text(frame)).await
}
