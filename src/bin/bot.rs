//! Discord bot entry point
//!
//! Loads `config.json` (or the file named by `CONFIG_FILE`), connects with the
//! token from the environment and runs until Ctrl+C or connection loss.

use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use std::env;

use strp_bot::config::DEFAULT_CONFIG_PATH;
use strp_bot::extensions::{ExtensionLoader, DEFAULT_EXTENSIONS};
use strp_bot::gateway::DiscordGateway;
use strp_bot::lifecycle::{Orchestrator, Termination};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    // Configuration errors are fatal before any connection attempt
    let orchestrator = Orchestrator::load(
        &config_path,
        DiscordGateway::new(),
        ExtensionLoader::builtin(),
        DEFAULT_EXTENSIONS,
    )?;

    // Set up logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&orchestrator.config().log_level),
    )
    .init();

    info!("Starting strp-bot v{}...", env!("CARGO_PKG_VERSION"));
    info!("Loaded config from {}", config_path);

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    match orchestrator.run(shutdown).await? {
        Termination::Shutdown | Termination::Disconnected => {
            info!("Bot shut down successfully");
            Ok(())
        }
        Termination::ConnectionLost(e) => Err(anyhow::anyhow!("Gateway connection lost: {}", e)),
    }
}
