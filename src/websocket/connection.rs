use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{close_codes, ClientFrame, ClientMessage, ErrorCode, ServerFrame, ServerMessage};
use crate::server::{AuthAttempt, GameServer, Outbound};

pub(super) async fn handle_socket(socket: WebSocket, server: Arc<GameServer>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(server.config().queue_capacity);

    // Sockets are accepted unconditionally; authentication happens on the
    // first `authenticate` frame, under a deadline.
    let connection_id = server.connections.register(tx);
    server.connections.send_to_connection(
        &connection_id,
        Arc::new(ServerFrame::broadcast(ServerMessage::Connected {
            connection_id,
            server_time: chrono::Utc::now(),
        })),
    );

    // Outbound pump: one writer per socket, preserving send order.
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if super::sending::send_frame(&mut sink, &frame).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(code) => {
                    super::sending::send_close(&mut sink, code).await;
                    break;
                }
            }
        }
    });

    let server_clone = Arc::clone(&server);
    let receive_task = tokio::spawn(async move {
        let server = server_clone;
        let auth_deadline = tokio::time::sleep(server.config().auth_timeout);
        tokio::pin!(auth_deadline);

        loop {
            let msg = if server.connections.is_authenticated(&connection_id) {
                match stream.next().await {
                    Some(msg) => msg,
                    None => break,
                }
            } else {
                tokio::select! {
                    msg_opt = stream.next() => {
                        match msg_opt {
                            Some(msg) => msg,
                            None => break,
                        }
                    }
                    () = &mut auth_deadline => {
                        tracing::warn!(%connection_id, "Authentication deadline expired, closing");
                        server.connections.send_to_connection(
                            &connection_id,
                            Arc::new(ServerFrame::broadcast(ServerMessage::Error {
                                code: ErrorCode::AuthTimeout,
                                message: ErrorCode::AuthTimeout.description().to_string(),
                            })),
                        );
                        server
                            .connections
                            .close(&connection_id, close_codes::AUTH_TIMEOUT);
                        break;
                    }
                }
            };

            let msg = match msg {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::debug!(%connection_id, error = %err, "WebSocket read error");
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let max_size = server.config().max_frame_size;
                    if text.len() > max_size {
                        tracing::warn!(
                            %connection_id,
                            size = text.len(),
                            max = max_size,
                            "Frame exceeds size limit"
                        );
                        reply_error(
                            &server,
                            &connection_id,
                            ErrorCode::ValidationError,
                            format!("frame too large ({} bytes, max {max_size})", text.len()),
                        );
                        continue;
                    }

                    let frame: ClientFrame = match serde_json::from_str(&text) {
                        Ok(frame) => frame,
                        Err(_) => {
                            // Distinguish malformed JSON from a well-formed
                            // frame of an unknown/invalid type.
                            let (code, message) = if serde_json::from_str::<serde_json::Value>(
                                &text,
                            )
                            .is_ok()
                            {
                                (
                                    ErrorCode::InvalidMessage,
                                    ErrorCode::InvalidMessage.description().to_string(),
                                )
                            } else {
                                (
                                    ErrorCode::ValidationError,
                                    "frame is not valid JSON".to_string(),
                                )
                            };
                            tracing::warn!(%connection_id, ?code, "Rejected client frame");
                            reply_error(&server, &connection_id, code, message);
                            continue;
                        }
                    };

                    let authenticated = server.connections.is_authenticated(&connection_id);
                    let ClientFrame {
                        request_id,
                        message,
                    } = frame;
                    match (authenticated, message) {
                        (false, ClientMessage::Authenticate { token, room_code }) => {
                            let attempt = server
                                .authenticate_connection(
                                    &connection_id,
                                    request_id,
                                    &token,
                                    &room_code,
                                )
                                .await;
                            if let AuthAttempt::Close(code) = attempt {
                                tracing::debug!(%connection_id, code, "Handshake closed the socket");
                                break;
                            }
                        }
                        (false, ClientMessage::Ping) => {
                            server
                                .dispatch(
                                    &connection_id,
                                    ClientFrame {
                                        request_id,
                                        message: ClientMessage::Ping,
                                    },
                                )
                                .await;
                        }
                        (false, _) => {
                            // Before authentication only `authenticate`
                            // and `ping` are accepted.
                            reply_error(
                                &server,
                                &connection_id,
                                ErrorCode::Unauthenticated,
                                ErrorCode::Unauthenticated.description().to_string(),
                            );
                        }
                        (true, message) => {
                            server
                                .dispatch(
                                    &connection_id,
                                    ClientFrame {
                                        request_id,
                                        message,
                                    },
                                )
                                .await;
                        }
                    }
                }
                Message::Binary(_) => {
                    reply_error(
                        &server,
                        &connection_id,
                        ErrorCode::ValidationError,
                        "binary frames are not supported".to_string(),
                    );
                }
                Message::Ping(_) | Message::Pong(_) => {
                    server.connections.record_seen(&connection_id);
                }
                Message::Close(_) => {
                    tracing::info!(%connection_id, "Client closed the connection");
                    break;
                }
            }
        }
    });

    // Whichever side finishes first tears the connection down.
    tokio::select! {
        _ = send_task => {}
        _ = receive_task => {}
    }
    server.disconnect_connection(&connection_id).await;
}

fn reply_error(
    server: &GameServer,
    connection_id: &crate::protocol::ConnectionId,
    code: ErrorCode,
    message: String,
) {
    server.connections.send_to_connection(
        connection_id,
        Arc::new(ServerFrame::broadcast(ServerMessage::Error { code, message })),
    );
}
