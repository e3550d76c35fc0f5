//! Integration tests for WebSocket admission, presence broadcasts, and
//! call signaling between two connected users.

mod support;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use support::*;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

fn text_frame(value: serde_json::Value) -> Message {
    Message::Text(value.to_string().into())
}

#[tokio::test]
async fn presence_snapshot_follows_connect_and_disconnect() {
    let (base_url, addr) = start_test_server().await;
    let (u1_token, u1_id) = signup_user(&base_url, "User One", "u1@test.com").await;
    let (u2_token, u2_id) = signup_user(&base_url, "User Two", "u2@test.com").await;

    let (_u1_write, mut u1_read) = connect_ws(addr, &u1_token).await;
    let snapshot = wait_for_event(&mut u1_read, "getOnlineUsers").await;
    assert_eq!(snapshot["data"], json!([u1_id]));

    // Second user connecting: everyone receives the full new snapshot.
    let (mut u2_write, mut u2_read) = connect_ws(addr, &u2_token).await;
    let mut expected = vec![u1_id.clone(), u2_id.clone()];
    expected.sort();

    let snapshot = wait_for_event(&mut u1_read, "getOnlineUsers").await;
    assert_eq!(snapshot["data"], json!(expected));
    let snapshot = wait_for_event(&mut u2_read, "getOnlineUsers").await;
    assert_eq!(snapshot["data"], json!(expected));

    // Disconnect: remaining connections see the post-removal state.
    u2_write.send(Message::Close(None)).await.unwrap();
    let snapshot = wait_for_event(&mut u1_read, "getOnlineUsers").await;
    assert_eq!(snapshot["data"], json!([u1_id]));
}

#[tokio::test]
async fn admission_rejected_without_token() {
    let (_base_url, addr) = start_test_server().await;

    let ws_url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Upgrade should succeed even when admission fails");
    let (_write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close within timeout")
        .expect("Stream ended")
        .expect("WebSocket error");
    match msg {
        Message::Close(Some(frame)) => {
            assert!(frame.reason.contains("No Token"), "reason: {}", frame.reason);
        }
        other => assert!(other.is_close(), "Expected close, got {:?}", other),
    }
}

#[tokio::test]
async fn admission_rejected_with_invalid_token() {
    let (_base_url, addr) = start_test_server().await;

    let ws_url = format!("ws://{}/ws?token=not-a-real-token", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close within timeout")
        .expect("Stream ended")
        .expect("WebSocket error");
    assert!(msg.is_close(), "Expected close, got {:?}", msg);
}

#[tokio::test]
async fn admission_accepts_bearer_header() {
    let (base_url, addr) = start_test_server().await;
    let (token, user_id) = signup_user(&base_url, "Header User", "header@test.com").await;

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );

    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("Failed to connect with Bearer header");
    let (_write, mut read) = ws_stream.split();

    let snapshot = wait_for_event(&mut read, "getOnlineUsers").await;
    assert_eq!(snapshot["data"], json!([user_id]));
}

#[tokio::test]
async fn admission_accepts_cookie_header() {
    let (base_url, addr) = start_test_server().await;
    let (token, user_id) = signup_user(&base_url, "Cookie User", "cookie@test.com").await;

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Cookie", format!("jwt={}", token).parse().unwrap());

    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("Failed to connect with cookie");
    let (_write, mut read) = ws_stream.split();

    let snapshot = wait_for_event(&mut read, "getOnlineUsers").await;
    assert_eq!(snapshot["data"], json!([user_id]));
}

#[tokio::test]
async fn call_signaling_round_trip() {
    let (base_url, addr) = start_test_server().await;
    let (u1_token, u1_id) = signup_user(&base_url, "Caller", "caller@test.com").await;
    let (u2_token, u2_id) = signup_user(&base_url, "Callee", "callee@test.com").await;

    let (mut u1_write, mut u1_read) = connect_ws(addr, &u1_token).await;
    let (mut u2_write, mut u2_read) = connect_ws(addr, &u2_token).await;
    wait_for_event(&mut u1_read, "getOnlineUsers").await;
    wait_for_event(&mut u2_read, "getOnlineUsers").await;

    // Offer with the caller's display profile attached.
    u1_write
        .send(text_frame(json!({
            "event": "call:offer",
            "data": { "to": u2_id, "sdp": "X", "fromUser": { "fullName": "Caller" } }
        })))
        .await
        .unwrap();

    let incoming = wait_for_event(&mut u2_read, "call:incoming").await;
    assert_eq!(incoming["data"]["from"], json!(u1_id));
    assert_eq!(incoming["data"]["sdp"], "X");
    assert_eq!(incoming["data"]["fromUser"]["fullName"], "Caller");

    u2_write
        .send(text_frame(json!({
            "event": "call:answer",
            "data": { "to": u1_id, "sdp": "Y" }
        })))
        .await
        .unwrap();

    let answered = wait_for_event(&mut u1_read, "call:answered").await;
    assert_eq!(answered["data"]["from"], json!(u2_id));
    assert_eq!(answered["data"]["sdp"], "Y");

    // ICE candidates flow both ways, payload untouched.
    let candidate = json!({ "candidate": "candidate:1 1 UDP 2122252543 192.0.2.1 54400 typ host" });
    u1_write
        .send(text_frame(json!({
            "event": "call:candidate",
            "data": { "to": u2_id, "candidate": candidate }
        })))
        .await
        .unwrap();

    let relayed = wait_for_event(&mut u2_read, "call:candidate").await;
    assert_eq!(relayed["data"]["from"], json!(u1_id));
    assert_eq!(relayed["data"]["candidate"], candidate);

    u2_write
        .send(text_frame(json!({
            "event": "call:hangup",
            "data": { "to": u1_id }
        })))
        .await
        .unwrap();

    let hangup = wait_for_event(&mut u1_read, "call:hangup").await;
    assert_eq!(hangup["data"]["from"], json!(u2_id));
}

#[tokio::test]
async fn signaling_to_disconnected_user_is_dropped() {
    let (base_url, addr) = start_test_server().await;
    let (u1_token, _u1_id) = signup_user(&base_url, "Caller", "c1@test.com").await;
    let (u2_token, u2_id) = signup_user(&base_url, "Callee", "c2@test.com").await;

    let (mut u1_write, mut u1_read) = connect_ws(addr, &u1_token).await;
    let (mut u2_write, mut u2_read) = connect_ws(addr, &u2_token).await;
    wait_for_event(&mut u1_read, "getOnlineUsers").await;
    wait_for_event(&mut u2_read, "getOnlineUsers").await;

    u2_write.send(Message::Close(None)).await.unwrap();
    // The disconnect produces a fresh presence snapshot for u1.
    wait_for_event(&mut u1_read, "getOnlineUsers").await;

    u1_write
        .send(text_frame(json!({
            "event": "call:candidate",
            "data": { "to": u2_id, "candidate": { "candidate": "candidate:1" } }
        })))
        .await
        .unwrap();

    // No delivery and no error back: the message is silently dropped.
    assert_no_event(&mut u1_read, "call:candidate", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_connection() {
    let (base_url, addr) = start_test_server().await;
    let (u1_token, u1_id) = signup_user(&base_url, "Sturdy", "sturdy@test.com").await;
    let (u2_token, u2_id) = signup_user(&base_url, "Peer", "peer@test.com").await;

    let (mut u1_write, mut u1_read) = connect_ws(addr, &u1_token).await;
    let (_u2_write, mut u2_read) = connect_ws(addr, &u2_token).await;
    wait_for_event(&mut u1_read, "getOnlineUsers").await;
    wait_for_event(&mut u2_read, "getOnlineUsers").await;

    u1_write
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    u1_write
        .send(text_frame(json!({ "event": "no-such-event", "data": {} })))
        .await
        .unwrap();

    // The connection survives and keeps relaying.
    u1_write
        .send(text_frame(json!({
            "event": "call:offer",
            "data": { "to": u2_id, "sdp": "still-works" }
        })))
        .await
        .unwrap();

    let incoming = wait_for_event(&mut u2_read, "call:incoming").await;
    assert_eq!(incoming["data"]["from"], json!(u1_id));
    assert_eq!(incoming["data"]["sdp"], "still-works");
}

#[tokio::test]
async fn reconnect_replaces_previous_connection() {
    let (base_url, addr) = start_test_server().await;
    let (u1_token, u1_id) = signup_user(&base_url, "Flaky", "flaky@test.com").await;
    let (u2_token, u2_id) = signup_user(&base_url, "Stable", "stable@test.com").await;

    // First connection for u1 never sends Close.
    let (_old_write, mut old_read) = connect_ws(addr, &u1_token).await;
    wait_for_event(&mut old_read, "getOnlineUsers").await;

    // Reconnect: the registry must now route to the new connection only.
    let (_new_write, mut new_read) = connect_ws(addr, &u1_token).await;
    wait_for_event(&mut new_read, "getOnlineUsers").await;

    let (mut u2_write, mut u2_read) = connect_ws(addr, &u2_token).await;
    wait_for_event(&mut u2_read, "getOnlineUsers").await;

    u2_write
        .send(text_frame(json!({
            "event": "call:offer",
            "data": { "to": u1_id, "sdp": "Z" }
        })))
        .await
        .unwrap();

    let incoming = wait_for_event(&mut new_read, "call:incoming").await;
    assert_eq!(incoming["data"]["from"], json!(u2_id));
    assert_no_event(&mut old_read, "call:incoming", Duration::from_millis(300)).await;
}
