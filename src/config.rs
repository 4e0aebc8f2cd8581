//! Server and parser configuration.
//!
//! All limits are hard ceilings against adversarial input. Defaults match
//! common Redis deployments; a TOML file can override any subset of
//! fields.

use std::path::Path;

use serde::Deserialize;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default per-connection buffer cap: 64 MiB.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Default socket read chunk: 16 KiB.
pub const DEFAULT_READ_CHUNK_BYTES: usize = 16 * 1024;

/// Default bulk payload ceiling: 512 MiB.
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Default aggregate element ceiling: 16 Mi entries.
pub const DEFAULT_MAX_AGGREGATE_LEN: usize = 16 * 1024 * 1024;

/// Default aggregate nesting ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration errors surfaced by [`ServerConfig::from_path`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Grammar limits enforced by the parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserLimits {
    /// Maximum bulk/blob/verbatim payload length in bytes.
    pub max_bulk_len: usize,
    /// Maximum element count of a single aggregate.
    pub max_aggregate_len: usize,
    /// Maximum aggregate nesting depth.
    pub max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_aggregate_len: DEFAULT_MAX_AGGREGATE_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP port bound on all interfaces. Port 0 asks the OS for an
    /// ephemeral port.
    pub port: u16,
    /// Per-connection unparsed-byte cap; exceeding it closes the
    /// connection.
    pub max_buffer_bytes: usize,
    /// Size of each socket read.
    pub read_chunk_bytes: usize,
    /// Grammar limits.
    pub limits: ParserLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            limits: ParserLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Loads and validates a TOML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_buffer_bytes == 0 {
            return Err(ConfigError::Invalid("max_buffer_bytes must be nonzero"));
        }
        if self.read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("read_chunk_bytes must be nonzero"));
        }
        if self.limits.max_bulk_len == 0 {
            return Err(ConfigError::Invalid("max_bulk_len must be nonzero"));
        }
        if self.limits.max_aggregate_len == 0 {
            return Err(ConfigError::Invalid("max_aggregate_len must be nonzero"));
        }
        if self.limits.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be nonzero"));
        }
        Ok(())
    }
}
