//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command line arguments (applied by the binary). Every component receives
//! its settings from the `ServerConfig` held by the shared server context.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 60118;

/// Upper bound on configured producers
pub const MAX_PRODUCERS: usize = 128;

/// File name looked up under the user config directory
const CONFIG_FILE_NAME: &str = "rdistd.toml";

/// Runtime configuration of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: IpAddr,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Maximum number of queued resources
    pub buffer_capacity: usize,

    /// Number of producer tasks started with the server
    pub producer_count: usize,

    /// Time a consumer service spends `Consuming` after handing over a resource
    pub consume_delay: Duration,

    /// Idle pause of a consumer service before it reads the next command
    pub consumer_rest: Duration,

    /// Time a producer spends `Producing` after enqueueing
    pub produce_delay: Duration,

    /// Time a producer spends `Resting` before each cycle
    pub producer_rest: Duration,

    /// Debug-level logging for the server crates
    pub verbose: bool,

    /// Deadline for the handshake line on a fresh connection
    pub handshake_timeout: Duration,

    /// Deadline for writing one snapshot or reply
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            buffer_capacity: 3,
            producer_count: 5,
            consume_delay: Duration::from_secs(1),
            consumer_rest: Duration::from_secs(1),
            produce_delay: Duration::from_secs(2),
            producer_rest: Duration::from_secs(1),
            verbose: false,
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Returns the socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Checks values that would leave the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.producer_count > MAX_PRODUCERS {
            return Err(ConfigError::TooManyProducers {
                count: self.producer_count,
                max: MAX_PRODUCERS,
            });
        }
        Ok(())
    }

    /// Default location of the optional config file
    /// (`$XDG_CONFIG_HOME/rdist/rdistd.toml` on Linux).
    pub fn default_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rdist").join(CONFIG_FILE_NAME))
    }

    /// Applies a TOML file on top of this configuration.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        FileConfig::load(path)?.apply(self);
        Ok(())
    }
}

/// On-disk configuration. Every key is optional; missing keys keep the
/// value already in the `ServerConfig`.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub buffer_capacity: Option<usize>,
    pub producers: Option<usize>,
    pub consume_delay_secs: Option<u64>,
    pub consumer_rest_secs: Option<u64>,
    pub produce_delay_secs: Option<u64>,
    pub producer_rest_secs: Option<u64>,
    pub verbose: Option<bool>,
    pub handshake_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Parses TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Overwrites the fields of `config` that are set in this file.
    pub fn apply(self, config: &mut ServerConfig) {
        let secs = Duration::from_secs;

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.buffer_capacity {
            config.buffer_capacity = capacity;
        }
        if let Some(producers) = self.producers {
            config.producer_count = producers;
        }
        if let Some(s) = self.consume_delay_secs {
            config.consume_delay = secs(s);
        }
        if let Some(s) = self.consumer_rest_secs {
            config.consumer_rest = secs(s);
        }
        if let Some(s) = self.produce_delay_secs {
            config.produce_delay = secs(s);
        }
        if let Some(s) = self.producer_rest_secs {
            config.producer_rest = secs(s);
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
        }
        if let Some(s) = self.handshake_timeout_secs {
            config.handshake_timeout = secs(s);
        }
        if let Some(s) = self.write_timeout_secs {
            config.write_timeout = secs(s);
        }
    }
}

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Buffer capacity must be at least 1")]
    ZeroCapacity,

    #[error("Too many producers: {count} (max: {max})")]
    TooManyProducers { count: usize, max: usize },

    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config file: {0}")]
    Parse(String),
}
