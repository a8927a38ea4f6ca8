//! # Server Configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. [`ServerConfig::default`]
//! 2. a TOML file passed with `--config <path>`
//! 3. command-line flags
//!
//! Every numeric setting must be a positive integer. A bad value is a fatal
//! startup error, never a runtime fault.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Highest accepted tick rate (ticks per second).
pub const MAX_TICK_RATE: u32 = 10_000;

/// Errors raised while building a [`ServerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting is zero or otherwise out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A flag value could not be parsed.
    #[error("invalid value {value:?} for {flag}")]
    BadValue {
        /// The flag.
        flag: String,
        /// The raw value.
        value: String,
    },

    /// A flag expecting a value was last on the line.
    #[error("missing value for {0}")]
    MissingValue(String),

    /// Unrecognized flag.
    #[error("unknown option {0}")]
    UnknownFlag(String),

    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What the command line asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CliAction {
    /// Start the server.
    Run(ServerConfig),
    /// Print usage and exit.
    Help,
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub host: IpAddr,
    /// TCP port to listen on.
    pub port: u16,
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Per-entity command queue capacity.
    pub intake_capacity: usize,
    /// Ticks between status log lines.
    pub status_interval: u64,
    /// Whether entities burn life every tick and starve.
    pub life_decay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 12345,
            width: 10,
            height: 10,
            tick_rate: 100,
            intake_capacity: zappy_core::DEFAULT_INTAKE_CAPACITY,
            status_interval: 500,
            life_decay: false,
        }
    }
}

/// Usage text for `--help`.
pub const USAGE: &str = "\
Usage: zappy_server [OPTIONS]

Options:
  -c, --config <PATH>        TOML config file (flags override it)
  -p, --port <PORT>          TCP port to bind (default: 12345)
  -x, --width <CELLS>        Grid width (default: 10)
  -y, --height <CELLS>       Grid height (default: 10)
  -t, --tick-rate <HZ>       Ticks per second (default: 100)
  -q, --queue <N>            Commands queued per entity (default: 10)
      --status-every <TICKS> Ticks between status lines (default: 500)
      --life-decay           Entities consume food and can starve
  -h, --help                 Show this help";

impl ServerConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Builds a validated configuration from command-line arguments
    /// (program name excluded).
    ///
    /// # Errors
    ///
    /// Returns the first unparseable, unknown or invalid setting.
    pub fn from_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut flags = Vec::new();
        let mut config_path = None;
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--help" | "-h" => return Ok(CliAction::Help),
                "--life-decay" => flags.push((flag.to_owned(), String::new())),
                "--config" | "-c" | "--port" | "-p" | "--width" | "-x" | "--height" | "-y"
                | "--tick-rate" | "-t" | "--queue" | "-q" | "--status-every" => {
                    let value = args
                        .get(i + 1)
                        .ok_or_else(|| ConfigError::MissingValue(flag.to_owned()))?
                        .clone();
                    if matches!(flag, "--config" | "-c") {
                        config_path = Some(PathBuf::from(value));
                    } else {
                        flags.push((flag.to_owned(), value));
                    }
                    i += 1;
                }
                other => return Err(ConfigError::UnknownFlag(other.to_owned())),
            }
            i += 1;
        }

        let mut config = match config_path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        for (flag, value) in &flags {
            config.apply_flag(flag, value)?;
        }

        config.validate()?;
        Ok(CliAction::Run(config))
    }

    fn apply_flag(&mut self, flag: &str, value: &str) -> Result<(), ConfigError> {
        match flag {
            "--port" | "-p" => self.port = parse_value(flag, value)?,
            "--width" | "-x" => self.width = parse_value(flag, value)?,
            "--height" | "-y" => self.height = parse_value(flag, value)?,
            "--tick-rate" | "-t" => self.tick_rate = parse_value(flag, value)?,
            "--queue" | "-q" => self.intake_capacity = parse_value(flag, value)?,
            "--status-every" => self.status_interval = parse_value(flag, value)?,
            "--life-decay" => self.life_decay = true,
            other => return Err(ConfigError::UnknownFlag(other.to_owned())),
        }
        Ok(())
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("port", u64::from(self.port))?;
        positive("width", u64::from(self.width))?;
        positive("height", u64::from(self.height))?;
        positive("tick_rate", u64::from(self.tick_rate))?;
        positive("intake_capacity", self.intake_capacity as u64)?;
        positive("status_interval", self.status_interval)?;
        if self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::Invalid {
                field: "tick_rate",
                reason: format!("{} exceeds {MAX_TICK_RATE}", self.tick_rate),
            });
        }
        Ok(())
    }

    /// Address the acceptor binds.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Wall-clock length of one tick.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        flag: flag.to_owned(),
        value: value.to_owned(),
    })
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be a positive integer".to_owned(),
        });
    }
    Ok(())
}
