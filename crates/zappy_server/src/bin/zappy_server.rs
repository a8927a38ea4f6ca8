//! # Zappy Game Server
//!
//! ## Usage
//!
//! ```bash
//! zappy_server --port 12345 --width 10 --height 10 --tick-rate 100
//! RUST_LOG=debug zappy_server --config zappy.toml
//! ```

use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zappy_server::{CliAction, Server, ServerConfig, USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "cannot start server");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    };

    match server.run(shutdown).await {
        Ok(stats) => {
            info!(
                total_ticks = stats.total_ticks,
                avg_tick_us = stats.avg_tick_us,
                min_tick_us = stats.min_tick_us,
                max_tick_us = stats.max_tick_us,
                late_ticks = stats.late_ticks,
                "server stopped"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}
