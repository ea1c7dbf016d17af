//! End-to-end tests over real sockets: axum server on an ephemeral port,
//! tokio-tungstenite clients speaking the JSON frame protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use ludo_stacked_server::auth::TokenValidator;
use ludo_stacked_server::cache::InMemoryCacheStore;
use ludo_stacked_server::repository::{CreateRoomParams, InMemoryRoomRepository};
use ludo_stacked_server::server::{GameServer, RuntimeConfig};
use ludo_stacked_server::websocket;

const SECRET: &str = "e2e-test-secret";

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

fn mint_token(user_id: Uuid) -> String {
    encode(
        &Header::default(),
        &TestClaims {
            sub: user_id.to_string(),
            exp: Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn spawn_server(config: RuntimeConfig) -> (Arc<GameServer>, SocketAddr) {
    let server = GameServer::new(
        config,
        Arc::new(InMemoryRoomRepository::new()),
        Arc::new(InMemoryCacheStore::new()),
        Arc::new(TokenValidator::shared_secret(SECRET)),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    let app = websocket::create_router("*").with_state(server.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    (server, addr)
}

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn ws_connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/api/v1/ws");
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), connect_async(&url))
        .await
        .expect("connect timed out")
        .expect("websocket connect failed");
    stream
}

/// Read text frames until one has the wanted `type`; panics on close.
async fn recv_type(ws: &mut WsClient, wanted: &str) -> Value {
    for _ in 0..32 {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).expect("frame is JSON");
            if value["type"] == wanted {
                return value;
            }
        }
    }
    panic!("frame of type {wanted} never arrived");
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_and_lobby_over_real_sockets() {
    let (server, addr) = spawn_server(RuntimeConfig::default()).await;

    let host_user = Uuid::new_v4();
    let created = server
        .create_room(host_user, Uuid::new_v4(), CreateRoomParams::default())
        .await
        .unwrap();

    // Host connects: greeted, then authenticates into the room.
    let mut host = ws_connect(addr).await;
    let connected = recv_type(&mut host, "connected").await;
    assert!(connected["payload"]["connection_id"].is_string());

    let request_id = Uuid::new_v4().to_string();
    send_json(
        &mut host,
        json!({
            "type": "authenticate",
            "request_id": request_id,
            "payload": { "token": mint_token(host_user), "room_code": created.code },
        }),
    )
    .await;
    let authed = recv_type(&mut host, "authenticated").await;
    assert_eq!(authed["request_id"], Value::String(request_id));
    assert_eq!(
        authed["payload"]["user_id"],
        Value::String(host_user.to_string())
    );
    assert_eq!(authed["payload"]["room"]["code"], created.code);
    assert_eq!(
        authed["payload"]["room"]["seats"][0]["user_id"],
        Value::String(host_user.to_string())
    );

    // Ping works and carries server time.
    send_json(&mut host, json!({ "type": "ping" })).await;
    let pong = recv_type(&mut host, "pong").await;
    assert!(pong["payload"]["server_time"].is_string());

    // A guest joins with the same code; the host sees the room update.
    let guest_user = Uuid::new_v4();
    let mut guest = ws_connect(addr).await;
    recv_type(&mut guest, "connected").await;
    send_json(
        &mut guest,
        json!({
            "type": "authenticate",
            "payload": { "token": mint_token(guest_user), "room_code": created.code },
        }),
    )
    .await;
    let authed = recv_type(&mut guest, "authenticated").await;
    assert_eq!(authed["payload"]["room"]["seats"][1]["seat_index"], 1);

    let update = recv_type(&mut host, "room_updated").await;
    assert_eq!(
        update["payload"]["room"]["seats"][1]["user_id"],
        Value::String(guest_user.to_string())
    );

    // Frames before authentication are rejected on a third socket.
    let mut stranger = ws_connect(addr).await;
    recv_type(&mut stranger, "connected").await;
    send_json(&mut stranger, json!({ "type": "toggle_ready" })).await;
    let error = recv_type(&mut stranger, "error").await;
    assert_eq!(error["payload"]["code"], "UNAUTHENTICATED");

    // Unknown frame types are named as such.
    send_json(&mut stranger, json!({ "type": "become_admin" })).await;
    let error = recv_type(&mut stranger, "error").await;
    assert_eq!(error["payload"]["code"], "INVALID_MESSAGE");
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_deadline_closes_with_4005() {
    let config = RuntimeConfig {
        auth_timeout: Duration::from_millis(300),
        ..RuntimeConfig::default()
    };
    let (_server, addr) = spawn_server(config).await;

    let mut ws = ws_connect(addr).await;
    recv_type(&mut ws, "connected").await;

    // Say nothing and wait out the deadline.
    let mut saw_timeout_error = false;
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for timeout close");
        match msg {
            Some(Ok(WsMessage::Text(text))) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == "error" && value["payload"]["code"] == "AUTH_TIMEOUT" {
                    saw_timeout_error = true;
                }
            }
            Some(Ok(WsMessage::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 4005);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(_)) | None => break,
        }
    }
    assert!(saw_timeout_error, "error frame precedes the 4005 close");
}
