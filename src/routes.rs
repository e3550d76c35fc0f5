use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::middleware::JwtSecret;
use crate::auth::routes as auth_routes;
use crate::messages::routes as message_routes;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Credentialed CORS for the browser client: only the configured origins,
/// since `Access-Control-Allow-Credentials` forbids a wildcard.
fn cors_layer(client_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = client_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState, client_origins: &[String]) -> Router {
    // Rate limiting: 5 requests per minute per IP on auth endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5) // Allow burst of 5
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Credential endpoints with rate limiting
    let auth_router = Router::new()
        .route("/api/auth/signup", axum::routing::post(auth_routes::signup))
        .route("/api/auth/login", axum::routing::post(auth_routes::login))
        .route("/api/auth/logout", axum::routing::post(auth_routes::logout))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated routes (Claims extractor validates the cookie/Bearer token)
    let api_router = Router::new()
        .route("/api/auth/me", axum::routing::get(auth_routes::me))
        .route(
            "/api/messages/contacts",
            axum::routing::get(message_routes::get_contacts),
        )
        .route(
            "/api/messages/chats",
            axum::routing::get(message_routes::get_chat_partners),
        )
        .route(
            "/api/messages/send/{id}",
            axum::routing::post(message_routes::send_message),
        )
        .route(
            "/api/messages/{id}",
            axum::routing::get(message_routes::get_history)
                .put(message_routes::update_message)
                .delete(message_routes::delete_message),
        );

    // WebSocket endpoint (admission reads cookie / Bearer / query token)
    let ws_router = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_router)
        .merge(api_router)
        .merge(ws_router)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(cors_layer(client_origins))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
