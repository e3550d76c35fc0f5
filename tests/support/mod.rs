//! Shared helpers for integration tests: real server on a random port,
//! tempdir-backed database, REST signup, WebSocket client plumbing.

#![allow(dead_code)]

use futures_util::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsRead =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;
pub type WsWrite = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Start the server on a random port and return (base_url, addr).
pub async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = pairchat_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = pairchat_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = pairchat_server::state::AppState {
        db,
        jwt_secret,
        registry: pairchat_server::ws::registry::PresenceRegistry::new(),
    };

    let origins = vec!["http://localhost:5173".to_string()];
    let app = pairchat_server::routes::build_router(state, &origins);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

/// Sign up a user over REST and return (token, user_id).
/// The token is extracted from the http-only `jwt` cookie.
pub async fn signup_user(base_url: &str, full_name: &str, email: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&json!({
            "fullName": full_name,
            "email": email,
            "password": "secret123",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Signup failed for {}", email);

    let token = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("jwt="))
        .and_then(|v| v.split(';').next())
        .expect("Expected jwt cookie on signup response")
        .to_string();

    let body: Value = resp.json().await.unwrap();
    let user_id = body["_id"].as_str().unwrap().to_string();

    (token, user_id)
}

/// Connect to the WebSocket endpoint authenticating via `?token=`.
pub async fn connect_ws(addr: SocketAddr, token: &str) -> (WsWrite, WsRead) {
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

/// Read frames until an event with the given name arrives, skipping others
/// (presence snapshots interleave with everything). Panics on timeout.
pub async fn wait_for_event(read: &mut WsRead, event_name: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {}", event_name))
            .expect("Stream ended while waiting for event")
            .expect("WebSocket error while waiting for event");

        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).expect("Frame is not JSON");
            if value["event"] == event_name {
                return value;
            }
        }
    }
}

/// Assert that no event with the given name arrives within `window`.
/// Other events (e.g. presence snapshots) are allowed through.
pub async fn assert_no_event(read: &mut WsRead, event_name: &str, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let value: Value = serde_json::from_str(&text).expect("Frame is not JSON");
                assert_ne!(
                    value["event"], event_name,
                    "Did not expect {} but received it",
                    event_name
                );
            }
            Ok(Some(Ok(_))) => continue,
            _ => return, // timeout or stream end
        }
    }
}
