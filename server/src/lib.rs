pub mod config;
pub mod manifest;
pub mod messages;
pub mod stream;

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::messages::SynthesisMessage;
use crate::stream::{CancelSignal, MessageSink, SinkError, StreamCoordinator, StreamRequest};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<StreamCoordinator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/synthesize", get(synthesize_ws))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn synthesize_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// One WebSocket connection is one synthesis request: the first text frame
/// carries the request JSON, the server streams status and chunk frames back,
/// and a "cancel" frame or disconnect interrupts the stream.
async fn handle_session(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let mut sink = WebSocketSink { sender };

    let mut request = match read_request(&mut receiver).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(reason) => {
            warn!(reason = %reason, "rejecting synthesis request");
            let _ = sink.send(SynthesisMessage::error(reason)).await;
            let _ = sink.sender.close().await;
            return;
        }
    };

    if request.session_id.is_none() {
        request.session_id = Some(uuid::Uuid::new_v4().to_string());
    }
    if request.stream_id.is_none() {
        request.stream_id = Some(uuid::Uuid::new_v4().to_string());
    }

    // Watch the client side of the socket while streaming so a disconnect or
    // an explicit cancel interrupts the coordinator between messages.
    let cancel = CancelSignal::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) if text.trim().eq_ignore_ascii_case("cancel") => {
                        cancel.cancel("canceled by client");
                        return;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            cancel.cancel("client disconnected");
        }
    });

    if let Err(err) = state.coordinator.run(request, &mut sink, &cancel).await {
        info!(error = %err, "synthesis stream ended with error");
    }

    watcher.abort();
    let _ = sink.sender.close().await;
}

/// Waits for the request frame, skipping non-text frames. `Ok(None)` means
/// the client went away before sending one.
async fn read_request(
    receiver: &mut SplitStream<WebSocket>,
) -> Result<Option<StreamRequest>, String> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| format!("invalid request: {e}"));
            }
            Ok(Message::Close(_)) | Err(_) => return Ok(None),
            Ok(_) => {}
        }
    }
    Ok(None)
}

/// Serializes each message as one JSON text frame.
struct WebSocketSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl MessageSink for WebSocketSink {
    async fn send(&mut self, msg: SynthesisMessage) -> Result<(), SinkError> {
        let payload = serde_json::to_string(&msg).map_err(|e| SinkError(e.to_string()))?;
        self.sender
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}
