#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use ludo_stacked_server::auth::TokenValidator;
use ludo_stacked_server::cache::InMemoryCacheStore;
use ludo_stacked_server::config;
use ludo_stacked_server::logging;
use ludo_stacked_server::repository::InMemoryRoomRepository;
use ludo_stacked_server::server::{GameServer, RuntimeConfig};
use ludo_stacked_server::websocket;
use std::net::SocketAddr;
use std::sync::Arc;

/// Ludo Stacked -- real-time session server for a stacked Ludo variant
#[derive(Parser, Debug)]
#[command(name = "ludo-stacked-server")]
#[command(about = "Real-time multiplayer session server for a stacked Ludo variant")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json and the environment; defaults
    // otherwise.
    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  CORS origins: {}", cfg.cors_origins);
                println!(
                    "  Identity provider: {}",
                    cfg.identity.url.as_deref().unwrap_or("local HS256 secret")
                );
                println!(
                    "  Auth timeout: {}s",
                    cfg.websocket.auth_timeout_secs
                );
                println!(
                    "  Heartbeat interval: {}s",
                    cfg.websocket.heartbeat_interval_secs
                );
                println!(
                    "  Max players per room: {}",
                    cfg.server.default_max_players
                );
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Ludo Stacked server");

    let repository = Arc::new(InMemoryRoomRepository::new());
    let cache = Arc::new(InMemoryCacheStore::new());
    let validator = Arc::new(TokenValidator::from_config(&cfg.identity)?);

    let server = GameServer::new(
        RuntimeConfig::from_config(&cfg),
        repository,
        cache,
        validator,
    );

    tracing::info!(
        server_id = %server.server_id(),
        "Server initialized - WebSocket protocol: /api/v1/ws, health: /health"
    );

    websocket::run_server(addr, server, &cfg.cors_origins).await
}
