//! REST endpoints for one-to-one messaging: contacts, chat partners,
//! history, send, edit and scoped delete.
//!
//! Real-time fan-out rides the presence registry: every mutation persists
//! first and only then relays the matching event to the participants'
//! connections, best-effort. An offline participant simply misses the event
//! and catches up from history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::models::{PublicUser, PUBLIC_USER_COLUMNS};
use crate::state::AppState;
use crate::ws::events::{MessagePayload, ServerEvent};
use crate::ws::relay;

/// Maximum message text length (chars).
const MAX_TEXT_LENGTH: usize = 2000;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "message": message })))
}

fn internal_error() -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// A message row as stored, with the per-user delete list decoded.
struct MessageRow {
    id: String,
    sender_id: String,
    receiver_id: String,
    text: Option<String>,
    image: Option<String>,
    audio: Option<String>,
    deleted_for: Vec<String>,
    deleted_for_everyone: bool,
    created_at: String,
    updated_at: String,
}

impl MessageRow {
    const COLUMNS: &'static str = "id, sender_id, receiver_id, text, image, audio, \
         deleted_for, deleted_for_everyone, created_at, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let deleted_for_json: String = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            text: row.get(3)?,
            image: row.get(4)?,
            audio: row.get(5)?,
            deleted_for: serde_json::from_str(&deleted_for_json).unwrap_or_default(),
            deleted_for_everyone: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

/// A message as returned from the history endpoint. Rows deleted for
/// everyone keep their position but lose their content.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub deleted_for_everyone: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        let tombstone = row.deleted_for_everyone;
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            text: if tombstone { None } else { row.text },
            image: if tombstone { None } else { row.image },
            audio: if tombstone { None } else { row.audio },
            deleted_for_everyone: tombstone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// --- Handlers ---

/// GET /api/messages/contacts — every user except the requester.
pub async fn get_contacts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let db = state.db.clone();
    let me = claims.sub.clone();

    let users = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY full_name"
            ))
            .map_err(|_| internal_error())?;
        let users: Vec<PublicUser> = stmt
            .query_map(rusqlite::params![me], PublicUser::from_row)
            .map_err(|_| internal_error())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    })
    .await
    .map_err(|_| internal_error())??;

    Ok(Json(users))
}

/// GET /api/messages/chats — users the requester has exchanged messages with.
pub async fn get_chat_partners(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let db = state.db.clone();
    let me = claims.sub.clone();

    let users = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id IN (
                     SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END
                     FROM messages
                     WHERE sender_id = ?1 OR receiver_id = ?1
                 ) ORDER BY full_name"
            ))
            .map_err(|_| internal_error())?;
        let users: Vec<PublicUser> = stmt
            .query_map(rusqlite::params![me], PublicUser::from_row)
            .map_err(|_| internal_error())?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    })
    .await
    .map_err(|_| internal_error())??;

    Ok(Json(users))
}

/// GET /api/messages/{id} — conversation with user `id`, oldest first.
/// Rows the requester deleted for themselves are omitted entirely.
pub async fn get_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(other_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let db = state.db.clone();
    let me = claims.sub.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC",
                MessageRow::COLUMNS
            ))
            .map_err(|_| internal_error())?;
        let rows: Vec<MessageRow> = stmt
            .query_map(rusqlite::params![me, other_id], MessageRow::from_row)
            .map_err(|_| internal_error())?
            .filter_map(|r| r.ok())
            .collect();

        let messages: Vec<MessageResponse> = rows
            .into_iter()
            .filter(|row| !row.deleted_for.iter().any(|id| id == &me))
            .map(MessageResponse::from)
            .collect();
        Ok(messages)
    })
    .await
    .map_err(|_| internal_error())??;

    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
}

/// POST /api/messages/send/{id} — persist a message to user `id`, then relay
/// `newMessage` to the receiver's and the sender's connections.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(receiver_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessagePayload>), ApiError> {
    let text = body
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    if text.is_none() && body.image.is_none() && body.audio.is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Text, image or audio is required.",
        ));
    }
    if let Some(ref t) = text {
        if t.len() > MAX_TEXT_LENGTH {
            return Err(api_error(StatusCode::PAYLOAD_TOO_LARGE, "Message too long"));
        }
    }
    if receiver_id == claims.sub {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Cannot send messages to yourself.",
        ));
    }

    let db = state.db.clone();
    let sender_id = claims.sub.clone();
    let rid = receiver_id.clone();
    let image = body.image.clone();
    let audio = body.audio.clone();

    let payload = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;

        let receiver_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                rusqlite::params![rid],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !receiver_exists {
            return Err(api_error(StatusCode::NOT_FOUND, "Receiver not found."));
        }

        // Sender name enriches client notifications for chats that are not
        // currently open.
        let sender_name: Option<String> = conn
            .query_row(
                "SELECT full_name FROM users WHERE id = ?1",
                rusqlite::params![sender_id],
                |row| row.get(0),
            )
            .ok();

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image, audio, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            rusqlite::params![id, sender_id, rid, text, image, audio, now],
        )
        .map_err(|_| internal_error())?;

        Ok(MessagePayload {
            id,
            sender_id,
            receiver_id: rid,
            text,
            image,
            audio,
            created_at: now.clone(),
            updated_at: now,
            sender_name,
        })
    })
    .await
    .map_err(|_| internal_error())??;

    // The row is durable; now fan out. Both sends are best-effort.
    let event = ServerEvent::NewMessage(payload.clone());
    relay::deliver_to(&state.registry, &receiver_id, &event);
    relay::deliver_to(&state.registry, &claims.sub, &event);

    Ok((StatusCode::CREATED, Json(payload)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub text: String,
}

/// PUT /api/messages/{id} — sender-only text edit; relays `messageUpdated`
/// to both participants.
pub async fn update_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
    Json(body): Json<UpdateMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = body.text.trim().to_string();
    if text.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Text is required"));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(api_error(StatusCode::PAYLOAD_TOO_LARGE, "Message too long"));
    }

    let db = state.db.clone();
    let me = claims.sub.clone();
    let mid = message_id.clone();
    let new_text = text.clone();

    let (sender_id, receiver_id, updated_at) = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", MessageRow::COLUMNS),
                rusqlite::params![mid],
                MessageRow::from_row,
            )
            .map_err(|_| api_error(StatusCode::NOT_FOUND, "Message not found"))?;

        if row.sender_id != me {
            return Err(api_error(
                StatusCode::FORBIDDEN,
                "Only sender can edit this message",
            ));
        }
        if row.deleted_for_everyone {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Cannot edit a deleted message",
            ));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE messages SET text = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![new_text, now, mid],
        )
        .map_err(|_| internal_error())?;

        Ok((row.sender_id, row.receiver_id, now))
    })
    .await
    .map_err(|_| internal_error())??;

    let event = ServerEvent::MessageUpdated {
        id: message_id.clone(),
        text: Some(text.clone()),
        updated_at: updated_at.clone(),
    };
    relay::deliver_to(&state.registry, &sender_id, &event);
    relay::deliver_to(&state.registry, &receiver_id, &event);

    Ok(Json(json!({
        "_id": message_id,
        "text": text,
        "updatedAt": updated_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub scope: Option<String>,
}

/// DELETE /api/messages/{id}?scope=me|everyone
///
/// `everyone` (sender only) nulls the content and notifies both
/// participants; `me` (either participant) hides the row for the requester
/// and notifies only their own connection.
pub async fn delete_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    let scope = query.scope.unwrap_or_else(|| "me".to_string());
    if scope != "me" && scope != "everyone" {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid scope"));
    }

    let db = state.db.clone();
    let me = claims.sub.clone();
    let mid = message_id.clone();
    let scope_for_db = scope.clone();

    let (sender_id, receiver_id) = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", MessageRow::COLUMNS),
                rusqlite::params![mid],
                MessageRow::from_row,
            )
            .map_err(|_| api_error(StatusCode::NOT_FOUND, "Message not found"))?;

        // Only participants can delete.
        if row.sender_id != me && row.receiver_id != me {
            return Err(api_error(
                StatusCode::FORBIDDEN,
                "Not allowed to delete this message",
            ));
        }

        if scope_for_db == "everyone" {
            // Only the sender can delete for everyone.
            if row.sender_id != me {
                return Err(api_error(
                    StatusCode::FORBIDDEN,
                    "Only sender can delete for everyone",
                ));
            }
            conn.execute(
                "UPDATE messages
                 SET deleted_for_everyone = 1, text = NULL, image = NULL, audio = NULL,
                     updated_at = ?1
                 WHERE id = ?2",
                rusqlite::params![Utc::now().to_rfc3339(), mid],
            )
            .map_err(|_| internal_error())?;
        } else if !row.deleted_for.iter().any(|id| id == &me) {
            let mut deleted_for = row.deleted_for.clone();
            deleted_for.push(me.clone());
            let deleted_for_json =
                serde_json::to_string(&deleted_for).map_err(|_| internal_error())?;
            conn.execute(
                "UPDATE messages SET deleted_for = ?1 WHERE id = ?2",
                rusqlite::params![deleted_for_json, mid],
            )
            .map_err(|_| internal_error())?;
        }

        Ok((row.sender_id, row.receiver_id))
    })
    .await
    .map_err(|_| internal_error())??;

    if scope == "everyone" {
        let event = ServerEvent::MessageDeleted {
            message_id: message_id.clone(),
            scope: scope.clone(),
            user_id: None,
        };
        relay::deliver_to(&state.registry, &receiver_id, &event);
        relay::deliver_to(&state.registry, &sender_id, &event);
        Ok(Json(json!({ "message": "Deleted for everyone" })))
    } else {
        // Only the requester's own UI needs to react.
        let event = ServerEvent::MessageDeleted {
            message_id: message_id.clone(),
            scope: scope.clone(),
            user_id: Some(claims.sub.clone()),
        };
        relay::deliver_to(&state.registry, &claims.sub, &event);
        Ok(Json(json!({ "message": "Deleted for you" })))
    }
}
