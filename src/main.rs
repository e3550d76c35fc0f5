use std::net::SocketAddr;
use tokio::net::TcpListener;

use pairchat_server::auth;
use pairchat_server::config::{generate_config_template, Config};
use pairchat_server::db;
use pairchat_server::routes;
use pairchat_server::state::AppState;
use pairchat_server::ws::registry::PresenceRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pairchat_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pairchat_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("pairchat server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // 256-bit random signing key, persisted in data_dir across restarts
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let app_state = AppState {
        db,
        jwt_secret,
        registry: PresenceRegistry::new(),
    };

    let app = routes::build_router(app_state, &config.client_origins);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo is required by the per-IP rate limiter's key extractor
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
