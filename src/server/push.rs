//! Push channel: one WebSocket task per device connection.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::ingest::Transport;
use crate::session::SessionHandle;

use super::AppState;

/// Frame sent back to a session whose payload was rejected.
pub const INVALID_PAYLOAD_FRAME: &str = "Error: Invalid payload format";

/// `GET /ws/dynamic`
pub async fn push_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (session, mut outbound) = SessionHandle::new();
    let session_id = session.id();
    state.registry.register(session.clone());

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(%session_id, error = %e, "Push channel write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let result = match frame {
            Ok(Message::Text(text)) => {
                state
                    .pipeline
                    .ingest(text.as_str(), Transport::PushChannel)
                    .await
            }
            Ok(Message::Binary(bytes)) => {
                state
                    .pipeline
                    .ingest_bytes(&bytes, Transport::PushChannel)
                    .await
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "Push channel read failed");
                break;
            }
        };

        if let Err(e) = result {
            tracing::warn!(%session_id, error = %e, "Rejected push payload");
            session.send_text(INVALID_PAYLOAD_FRAME);
        }
    }

    state.registry.unregister(session_id);
    drop(session);
    if let Err(e) = writer.await {
        tracing::warn!(%session_id, error = %e, "Push channel writer task failed");
    }
}
