//! WebSocket replay of the transformed series
//!
//! Each connection gets its own [`StreamingSession`]. A reader task watches
//! the inbound half of the socket and fires the session's close signal when
//! the client disconnects; the session writes to the outbound half.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use ecg_common::TransformedSample;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde_json::json;
use tracing::{debug, info};

use crate::session::{SampleSink, SinkClosed, StreamingSession};
use crate::AppState;

/// GET /stream (WebSocket upgrade)
pub async fn stream_observations(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();

    let session = StreamingSession::new(state.store.clone(), state.tick_interval);
    let connection_id = session.connection_id();
    let close_signal = session.close_signal();
    info!(connection_id = %connection_id, "Client connected to replay stream");

    let reader = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        debug!(connection_id = %connection_id, "Client disconnected from replay stream");
        close_signal.cancel();
    });

    let mut sink = WsSink { sender };
    let outcome = session.run(&mut sink).await;
    reader.abort();

    info!(
        connection_id = %connection_id,
        state = ?outcome.state,
        emitted = outcome.emitted,
        "Replay stream finished"
    );
}

/// Outbound half of a WebSocket as a [`SampleSink`]
struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl SampleSink for WsSink {
    async fn send_sample(&mut self, sample: &TransformedSample) -> Result<(), SinkClosed> {
        let text = serde_json::to_string(sample).map_err(|_| SinkClosed)?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn send_error(&mut self, message: &str) -> Result<(), SinkClosed> {
        let text = json!({ "error": message }).to_string();
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn close(&mut self) {
        let _ = self.sender.send(Message::Close(None)).await;
        let _ = self.sender.close().await;
    }
}
