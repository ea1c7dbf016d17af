use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;

use crate::protocol::ServerFrame;

/// Serialize one frame and push it down the socket. Any error means the
/// socket is dead and the pump should stop.
pub(super) async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize outbound frame");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}

/// Send a close frame with the given code; errors are ignored because the
/// peer may already be gone.
pub(super) async fn send_close(sink: &mut SplitSink<WebSocket, Message>, code: u16) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: axum::extract::ws::Utf8Bytes::default(),
        })))
        .await;
}
