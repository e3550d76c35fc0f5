//! Account endpoints: signup, login, logout, current user.
//! On success the token is set as an http-only `jwt` cookie; clients that
//! cannot store cookies may instead send it as a Bearer header.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::jwt;
use crate::auth::middleware::Claims;
use crate::db::models::{PublicUser, PUBLIC_USER_COLUMNS};
use crate::state::AppState;

/// Minimum password length (chars).
const MIN_PASSWORD_LENGTH: usize = 6;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "message": message })))
}

fn internal_error() -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Build the http-only auth cookie carrying the signed token.
fn auth_cookie(token: String) -> Cookie<'static> {
    Cookie::build(("jwt", token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(7))
        .build()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<PublicUser>), ApiError> {
    let full_name = body.full_name.trim().to_string();
    let email = body.email.trim().to_lowercase();

    if full_name.is_empty() || email.is_empty() || body.password.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "All fields are required"));
    }
    if body.password.len() < MIN_PASSWORD_LENGTH {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters",
        ));
    }
    if !is_plausible_email(&email) {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid email format"));
    }

    let db = state.db.clone();
    let password = body.password.clone();

    // bcrypt and the insert both run off the async threads.
    let user = tokio::task::spawn_blocking(move || {
        let password_hash =
            bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| internal_error())?;

        let conn = db.lock().map_err(|_| internal_error())?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = conn.execute(
            "INSERT INTO users (id, email, full_name, password_hash, profile_pic, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '', ?5, ?5)",
            rusqlite::params![id, email, full_name, password_hash, now],
        );

        match inserted {
            Ok(_) => Ok(PublicUser {
                id,
                email,
                full_name,
                profile_pic: String::new(),
                created_at: now.clone(),
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(api_error(
                StatusCode::CONFLICT,
                "Email already exists",
            )),
            Err(_) => Err(internal_error()),
        }
    })
    .await
    .map_err(|_| internal_error())??;

    let token = jwt::issue_token(&state.jwt_secret, &user.id).map_err(|_| internal_error())?;

    tracing::info!(user_id = %user.id, "User signed up");

    Ok((
        StatusCode::CREATED,
        jar.add(auth_cookie(token)),
        Json(user),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<PublicUser>), ApiError> {
    let email = body.email.trim().to_lowercase();
    let db = state.db.clone();
    let password = body.password.clone();

    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;

        let row: Result<(String, PublicUser), _> = conn.query_row(
            &format!(
                "SELECT password_hash, {PUBLIC_USER_COLUMNS} FROM users WHERE email = ?1"
            ),
            rusqlite::params![email],
            |row| {
                let hash: String = row.get(0)?;
                let user = PublicUser {
                    id: row.get(1)?,
                    email: row.get(2)?,
                    full_name: row.get(3)?,
                    profile_pic: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                };
                Ok((hash, user))
            },
        );

        // Same response for unknown email and wrong password.
        let (password_hash, user) = row.map_err(|_| {
            api_error(StatusCode::UNAUTHORIZED, "Invalid credentials")
        })?;

        let valid = bcrypt::verify(&password, &password_hash).unwrap_or(false);
        if !valid {
            return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid credentials"));
        }
        Ok(user)
    })
    .await
    .map_err(|_| internal_error())??;

    let token = jwt::issue_token(&state.jwt_secret, &user.id).map_err(|_| internal_error())?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok((StatusCode::OK, jar.add(auth_cookie(token)), Json(user)))
}

/// POST /api/auth/logout — clears the auth cookie.
pub async fn logout(jar: CookieJar) -> (StatusCode, CookieJar, Json<Value>) {
    let removal = Cookie::build(("jwt", "")).path("/").build();
    (
        StatusCode::OK,
        jar.remove(removal),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

/// GET /api/auth/me — the authenticated user's profile.
pub async fn me(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<PublicUser>, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| internal_error())?;
        conn.query_row(
            &format!("SELECT {PUBLIC_USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![user_id],
            PublicUser::from_row,
        )
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "User not found"))
    })
    .await
    .map_err(|_| internal_error())??;

    Ok(Json(user))
}

/// Cheap shape check: local part, `@`, domain with a dot. Real validation
/// happens when mail is actually sent; this only catches obvious typos.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}
