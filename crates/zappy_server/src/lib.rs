//! # Zappy Server
//!
//! Tick-synchronized, line-oriented TCP game server.
//!
//! ## Design Goals
//!
//! 1. **One clock** - all game state changes happen on the tick task
//! 2. **One command per entity per tick** - in arrival order
//! 3. **Nobody blocks the tick** - full queues reject, they never wait
//! 4. **Pluggable rules** - the scheduler only knows [`CommandExecutor`]
//!
//! ## Protocol
//!
//! ```text
//! server: BIENVENUE
//! client: <team>
//! server: 0
//! server: <width> <height>
//! client: avance            (one command per line)
//! server: ok | ko | suc | mort | ...
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod rules;
pub mod server;

pub use config::{CliAction, ConfigError, ServerConfig, USAGE};
pub use rules::{BasicRules, Command, CommandExecutor, EffectReport, Vitality};
pub use server::{
    handle_connection, Acceptor, ConnectionError, Server, ServerError, TickReport, TickScheduler,
    TickStats,
};
