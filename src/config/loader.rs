use super::EngineConfig;
use crate::error::{ErrorCode, PexecError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-project configuration file
pub const PROJECT_CONFIG_FILE: &str = ".pexec.toml";

/// Environment overrides: variable, config key, whether the value is numeric
const ENV_OVERRIDES: &[(&str, &str, bool)] = &[
    ("PEXEC_MAX_PARALLEL", "max_parallel", true),
    ("PEXEC_DEFAULT_WAIT", "default_wait", false),
    ("PEXEC_KILL_GRACE", "kill_grace", false),
    ("PEXEC_DEFAULT_TIMEOUT", "default_timeout", false),
    ("PEXEC_READ_CHUNK_SIZE", "read_chunk_size", true),
];

/// Location of the user's global configuration file
pub fn default_global_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pexec").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Builds an [`EngineConfig`] from files and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_path: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    explicit_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_path: default_global_path(),
            project_dir: std::env::current_dir().ok(),
            explicit_path: None,
        }
    }

    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    pub fn with_project_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.project_dir = dir;
        self
    }

    /// Use `path` instead of the project file. Unlike the implicit layers it
    /// must exist.
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.explicit_path = Some(path);
        self
    }

    /// Load all layers, reading overrides from the process environment
    pub fn load(&self) -> Result<EngineConfig> {
        self.load_with_env(|name| std::env::var(name).ok())
    }

    /// Load all layers, reading overrides through `env`
    pub fn load_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
        let mut table = toml::Table::new();

        if let Some(path) = &self.global_path {
            if let Some(layer) = read_layer(path)? {
                debug!("Loaded global config from {}", path.display());
                table.extend(layer);
            }
        }

        match &self.explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(PexecError::config_with_code(
                        ErrorCode::CONFIG_NOT_FOUND,
                        "config file does not exist",
                        Some(path.clone()),
                    ));
                }
                if let Some(layer) = read_layer(path)? {
                    debug!("Loaded config from {}", path.display());
                    table.extend(layer);
                }
            }
            None => {
                if let Some(dir) = &self.project_dir {
                    let path = dir.join(PROJECT_CONFIG_FILE);
                    if let Some(layer) = read_layer(&path)? {
                        debug!("Loaded project config from {}", path.display());
                        table.extend(layer);
                    }
                }
            }
        }

        merge_env_vars(&mut table, env)?;
        EngineConfig::from_table(table, self.explicit_path.as_deref())
    }
}

fn read_layer(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        PexecError::config_with_code(
            ErrorCode::CONFIG_PATH_ERROR,
            "failed to read config file",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })?;

    let table = toml::from_str(&content).map_err(|e| {
        PexecError::config_with_code(
            ErrorCode::CONFIG_INVALID_TOML,
            "invalid TOML",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })?;
    Ok(Some(table))
}

/// Apply `PEXEC_*` overrides on top of the file layers
pub fn merge_env_vars(table: &mut toml::Table, env: impl Fn(&str) -> Option<String>) -> Result<()> {
    for (var, key, numeric) in ENV_OVERRIDES {
        let Some(value) = env(var) else {
            continue;
        };

        let value = if *numeric {
            let number = value.trim().parse::<i64>().map_err(|e| {
                PexecError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!("{} must be a whole number, got '{}'", var, value),
                    None,
                )
                .with_source(e)
            })?;
            toml::Value::Integer(number)
        } else {
            toml::Value::String(value)
        };

        debug!("Config key {} overridden by {}", key, var);
        table.insert(key.to_string(), value);
    }
    Ok(())
}
