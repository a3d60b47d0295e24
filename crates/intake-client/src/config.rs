//! Client configuration: defaults, then `config.json`, then environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_BASE_URL: &str = "DISCOVERY_INTAKE_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "DISCOVERY_INTAKE_TIMEOUT_SECS";
pub const ENV_STATE_DIR: &str = "DISCOVERY_INTAKE_STATE_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Analysis service root, without the `/api/v1` suffix.
    pub base_url: String,
    pub timeout_secs: u64,
    /// Quiet interval before an auto-save is written.
    pub autosave_quiet_ms: u64,
    /// Where the saved form state lives; the platform data dir when unset.
    pub state_dir: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            timeout_secs: 60,
            autosave_quiet_ms: 1000,
            state_dir: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("in", "rxmen", "discovery-intake")
}

impl IntakeConfig {
    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads the user config file, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        base.with_overrides(std::env::vars())
    }

    /// Reads a config file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                ENV_BASE_URL => self.base_url = value,
                ENV_TIMEOUT_SECS => {
                    self.timeout_secs = value
                        .trim()
                        .parse()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            key: key.clone(),
                            value: value.clone(),
                        })?;
                }
                ENV_STATE_DIR => self.state_dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn autosave_quiet(&self) -> Duration {
        Duration::from_millis(self.autosave_quiet_ms)
    }

    pub fn resolved_state_dir(&self) -> Option<PathBuf> {
        self.state_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_local_dir().to_path_buf()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url.trim_end_matches('/'))
    }

    pub fn analyze_url(&self) -> String {
        self.endpoint("analyze")
    }

    pub fn health_url(&self) -> String {
        self.endpoint("health")
    }
}
