//! ssogate - directory login service
//!
//! Verifies passwords against an LDAP directory and records the signed-in
//! user in an encrypted session cookie.

use anyhow::Context;
use clap::Parser;
use ssogate_core::config::SsoConfig;
use ssogate_server::SsoServer;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "/etc/ssogate/config.yaml";

#[derive(Parser)]
#[command(name = "ssogate")]
#[command(author = "ssogate Team")]
#[command(version = ssogate_core::VERSION)]
#[command(about = "Directory login service with a cookie-backed session", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SSOGATE_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "SSOGATE_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "SSOGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SSOGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config);

    config.validate().context("invalid configuration")?;

    info!(version = ssogate_core::VERSION, "Starting ssogate");
    SsoServer::new(config).run().await?;

    Ok(())
}

/// Explicit path must load; the default path is optional
fn load_config(path: Option<&str>) -> anyhow::Result<SsoConfig> {
    let mut config = match path {
        Some(path) => SsoConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            SsoConfig::from_file(DEFAULT_CONFIG_PATH).with_context(|| {
                format!("failed to load configuration from {}", DEFAULT_CONFIG_PATH)
            })?
        }
        None => SsoConfig::default(),
    };

    config.apply_env();
    Ok(config)
}

fn init_logging(config: &SsoConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let json = config.logging.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)))
        .init();
}
