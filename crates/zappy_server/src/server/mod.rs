//! # Zappy Server
//!
//! Wires the world, the tick scheduler and the acceptor together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ spawn  ┌──────────────────┐ try_push ┌───────────────┐
//! │  Acceptor   │ ─────► │ handler (1/conn) │ ───────► │ CommandIntake │
//! └─────────────┘        └──────────────────┘          └───────┬───────┘
//!                        outbox + ▲ terminate                  │ try_pop
//!                                 │                            ▼
//!                        ┌──────────────────┐  gate   ┌───────────────┐
//!                        │  TickScheduler   │ ──────► │   WorldGrid   │
//!                        └──────────────────┘         └───────────────┘
//! ```

pub mod acceptor;
pub mod connection;
pub mod tick;

pub use acceptor::Acceptor;
pub use connection::{handle_connection, ConnectionError};
pub use tick::{TickReport, TickScheduler, TickStats};

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};
use zappy_core::{World, WorldError, WorldGrid};

use crate::config::{ConfigError, ServerConfig};
use crate::rules::BasicRules;

/// Fatal server errors. Anything here stops the process.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The grid could not be built.
    #[error("cannot create world: {0}")]
    World(#[from] WorldError),

    /// The listening socket could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Other socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// A configured server, not yet listening.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    world: Arc<World>,
}

impl Server {
    /// Validates the configuration and seeds the world.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] or [`ServerError::World`].
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let grid = WorldGrid::new(config.width, config.height)?;
        let world = Arc::new(World::new(grid, config.intake_capacity));
        Ok(Self { config, world })
    }

    /// The shared world.
    #[must_use]
    pub const fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the port is unavailable.
    pub async fn run<F>(self, shutdown: F) -> Result<TickStats, ServerError>
    where
        F: Future<Output = ()>,
    {
        let acceptor = Acceptor::bind(self.config.listen_addr()).await?;
        Ok(self.serve(acceptor, shutdown).await)
    }

    /// Serves on an already bound acceptor until `shutdown` resolves.
    ///
    /// Returns the tick timing statistics of the run.
    pub async fn serve<F>(self, acceptor: Acceptor, shutdown: F) -> TickStats
    where
        F: Future<Output = ()>,
    {
        let rules = if self.config.life_decay {
            BasicRules::with_life_decay()
        } else {
            BasicRules::new()
        };
        let scheduler = TickScheduler::new(Arc::clone(&self.world), rules, self.config.tick_period())
            .with_status_interval(self.config.status_interval);

        let (stop_tx, stop_rx) = watch::channel(false);
        let ticker = tokio::spawn(scheduler.run(stop_rx));

        match acceptor.local_addr() {
            Ok(addr) => info!(
                %addr,
                width = self.config.width,
                height = self.config.height,
                tick_rate = self.config.tick_rate,
                "server listening"
            ),
            Err(err) => error!(error = %err, "listening on unknown address"),
        }

        tokio::select! {
            () = acceptor.run(Arc::clone(&self.world)) => {}
            () = shutdown => info!("shutdown requested"),
        }

        // The scheduler also stops if the sender is dropped.
        let _ = stop_tx.send(true);
        match ticker.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "tick task failed");
                TickStats::default()
            }
        }
    }
}
