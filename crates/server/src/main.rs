mod bootstrap;
mod executor;
mod health;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gatekeeper_core::config::{AppConfig, LoadOptions};

/// Discord whitelist bridge: collects player names and forwards approvals to the game server.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper-server", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to gatekeeper.toml or config/gatekeeper.toml).
    #[arg(long, short, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use gatekeeper_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let require_file = cli.config.is_some();
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        require_file,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    if app.config.server.health_enabled {
        health::spawn(
            &app.config.server.bind_address,
            app.config.server.health_check_port,
            app.registry.clone(),
            app.runner.status(),
        )
        .await?;
    }

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        input_channel_id = app.config.discord.input_channel_id,
        output_channel_id = app.config.discord.output_channel_id,
        "gatekeeper-server started"
    );

    tokio::select! {
        result = app.runner.start() => {
            result?;
            tracing::warn!(
                event_name = "system.server.gateway_stopped",
                correlation_id = "runtime",
                "gateway runner stopped; waiting for shutdown signal"
            );
            wait_for_shutdown().await?;
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        pending_cleanups = app.cleanup.pending_count(),
        "gatekeeper-server stopping"
    );
    app.cleanup.shutdown();
    if let Err(error) = app.runner.stop().await {
        tracing::warn!(
            event_name = "system.server.disconnect_failed",
            correlation_id = "shutdown",
            error = %error,
            "gateway disconnect failed"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
