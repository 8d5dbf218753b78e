//! Engine configuration
//!
//! Settings come from up to three layers, later layers winning per key:
//! the user's global `config.toml`, a project `.pexec.toml`, and `PEXEC_*`
//! environment variables. See [`ConfigLoader`].

pub mod loader;


pub use loader::{default_global_path, ConfigLoader, PROJECT_CONFIG_FILE};

use crate::error::{ErrorCode, PexecError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the scheduler and subprocess futures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Parallelism limit for iterators built from this config; unset or 0 is unbounded
    pub max_parallel: Option<usize>,

    /// Longest one readiness wait may block
    #[serde(with = "humantime_serde")]
    pub default_wait: Duration,

    /// How long an abandoned command gets between SIGTERM and SIGKILL
    #[serde(with = "humantime_serde")]
    pub kill_grace: Duration,

    /// Timeout applied to every command that does not set its own
    #[serde(with = "humantime_serde")]
    pub default_timeout: Option<Duration>,

    /// Bytes requested per read from a child's stdout or stderr
    pub read_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            default_wait: crate::future::DEFAULT_WAIT,
            kill_grace: Duration::from_secs(1),
            default_timeout: None,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl EngineConfig {
    /// Parse a complete configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| {
            PexecError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, e.to_string(), None)
        })?;
        Self::from_table(table, None)
    }

    pub(crate) fn from_table(table: toml::Table, origin: Option<&Path>) -> Result<Self> {
        toml::Value::Table(table).try_into().map_err(|e: toml::de::Error| {
            PexecError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                e.to_string(),
                origin.map(Path::to_path_buf),
            )
        })
    }

    /// The parallelism limit, with 0 meaning unbounded
    pub fn parallel_limit(&self) -> Option<usize> {
        self.max_parallel.filter(|&n| n > 0)
    }
}
