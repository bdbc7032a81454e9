//! WebSocket connection handling
//!
//! Each connection gets an unbounded outcome channel. The engine delivers into
//! the channel without waiting, and a writer task drains it onto the socket.

use crate::queue::{Outcome, ReplyHandle};
use crate::transport::handler::dispatch_frame;
use crate::transport::http::GatewayState;
use crate::utils;
use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let connection_id = utils::generate_connection_id();
    info!("Client connected - connection: {}", connection_id);
    if let Some(metrics) = &state.metrics {
        metrics.record_ws_connection_opened();
    }

    let (mut sink, mut stream) = socket.split();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<Outcome>();
    let reply: ReplyHandle = Arc::new(outcome_tx);

    let writer_id = connection_id;
    let writer = tokio::spawn(async move {
        let mut outcomes = UnboundedReceiverStream::new(outcome_rx);
        while let Some(outcome) = outcomes.next().await {
            let text = match serde_json::to_string(&outcome) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize {} outcome: {}", outcome.event_name(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                debug!("Socket closed while writing - connection: {}", writer_id);
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                dispatch_frame(state.handler.as_ref(), text.as_str(), reply.clone()).await;
            }
            Ok(Message::Binary(_)) => {
                reply.deliver(Outcome::error("Invalid message format: expected a text frame"));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error - connection: {}, error: {}", connection_id, e);
                break;
            }
        }
    }

    // Queued players stay queued; the engine only stops reaching them
    writer.abort();
    if let Some(metrics) = &state.metrics {
        metrics.record_ws_connection_closed();
    }
    info!("Client disconnected - connection: {}", connection_id);
}
