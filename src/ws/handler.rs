//! WebSocket admission: credential checks run once per connection attempt
//! and must pass before the connection is registered anywhere.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor::{self, AuthedUser};

/// WebSocket close codes used on admission failure:
/// 4001 = token expired
/// 4002 = token missing or invalid
/// 4004 = user no longer exists
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;
const CLOSE_UNKNOWN_USER: u16 = 4004;

/// Optional query parameters for WebSocket connection.
/// `?token=` is the inline-auth fallback for clients that cannot set
/// headers or cookies on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws
///
/// Credential locations, first match wins:
/// 1. `jwt` cookie on the forwarded Cookie header
/// 2. `Authorization: Bearer <token>` header
/// 3. `?token=` query parameter
///
/// On auth failure, upgrades then immediately closes with a reason string.
/// On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = extract_token(&headers, params.token.as_deref()) else {
        tracing::warn!("WebSocket connection rejected: no token provided");
        return reject(ws, CLOSE_TOKEN_INVALID, "Unauthorized - No Token Provided");
    };

    let claims = match jwt::validate_token(&state.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Unauthorized - Token Expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Unauthorized - Invalid Token"),
            };
            tracing::warn!(close_code, reason, "WebSocket auth failed");
            return reject(ws, close_code, reason);
        }
    };

    // Resolve the token subject against the user store; a deleted user's
    // still-valid token must not be admitted.
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let full_name = tokio::task::spawn_blocking(move || {
        let conn = db.lock().ok()?;
        conn.query_row(
            "SELECT full_name FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| row.get::<_, String>(0),
        )
        .ok()
    })
    .await
    .ok()
    .flatten();

    let Some(full_name) = full_name else {
        tracing::warn!(user_id = %claims.sub, "WebSocket auth failed: user not found");
        return reject(ws, CLOSE_UNKNOWN_USER, "User not found");
    };

    tracing::info!(
        user_id = %claims.sub,
        "WebSocket connection authenticated"
    );

    let user = AuthedUser {
        id: claims.sub,
        full_name,
    };
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, user))
}

/// Pull a token from the admission-time credential locations, in priority
/// order.
fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = cookie_token(headers) {
        return Some(token);
    }

    if let Some(token) = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    query_token.map(|t| t.to_string())
}

/// `jwt=<token>` from the Cookie header, if present.
fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get("Cookie").and_then(|v| v.to_str().ok())?;
    cookie_header
        .split("; ")
        .find_map(|pair| pair.strip_prefix("jwt="))
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Upgrade the connection, then immediately close with the error reason.
/// No registry mutation has happened at this point.
fn reject(ws: WebSocketUpgrade, close_code: u16, reason: &'static str) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code: close_code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}
