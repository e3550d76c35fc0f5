use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// pairchat one-to-one chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "pairchat-server", version, about = "pairchat one-to-one chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PAIRCHAT_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PAIRCHAT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pairchat.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PAIRCHAT_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "PAIRCHAT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Browser origins allowed to reach the API with credentials
    /// (comma-separated when given via CLI or env)
    #[arg(
        long,
        env = "PAIRCHAT_CLIENT_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub client_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./pairchat.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            client_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PAIRCHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PAIRCHAT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# pairchat Server Configuration
# Place this file at ./pairchat.toml or specify with --config <path>
# All settings can be overridden via environment variables (PAIRCHAT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Browser origins allowed to reach the API with credentials.
# The WebSocket endpoint and cookie-based auth both require the
# client origin to appear in this list.
# client_origins = ["http://localhost:5173"]
"#
    .to_string()
}
