//! Configuration loading.
//!
//! Configuration is a single TOML file with a `[dispatch]` and a `[publish]`
//! section. Every field has a default, so an empty file (or no file at all) is
//! a valid configuration.
//!
//! Lookup order for the file:
//! 1. An explicit path (the CLI's `--config`)
//! 2. `GITHOOKS_CONFIG` environment variable
//! 3. `./.githooks/githooks.toml`
//! 4. `~/.githooks/config.toml`
//!
//! After loading, `GITHOOKS_POLICY`, `GITHOOKS_HOOKS_ROOT` and `GITHOOKS_REMOTE`
//! override the corresponding fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::policy::{ExecutionPolicy, OutputMode};

/// Project configuration file name, looked up inside the hooks root.
pub const CONFIG_FILE: &str = "githooks.toml";

/// User configuration file name, looked up inside `~/.githooks`.
pub const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// Default hooks root, relative to the working directory.
pub const DEFAULT_HOOKS_DIR: &str = ".githooks";

/// Environment variable for a custom config file path.
pub const GITHOOKS_CONFIG_ENV: &str = "GITHOOKS_CONFIG";

/// Environment variable overriding `dispatch.policy`.
pub const GITHOOKS_POLICY_ENV: &str = "GITHOOKS_POLICY";

/// Environment variable overriding `dispatch.hooks_root`.
pub const GITHOOKS_HOOKS_ROOT_ENV: &str = "GITHOOKS_HOOKS_ROOT";

/// Environment variable overriding `publish.remote`.
pub const GITHOOKS_REMOTE_ENV: &str = "GITHOOKS_REMOTE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },

    #[error("Invalid configuration: {field} - {message}")]
    Invalid { field: String, message: String },
}

/// Top level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GithooksConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Hook dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Directory holding one sub-directory per stage (default: `.githooks`)
    #[serde(default)]
    pub hooks_root: Option<PathBuf>,

    /// Policy applied when a hook fails (default: non_strict)
    #[serde(default)]
    pub policy: ExecutionPolicy,

    /// Whether hook output is captured or inherited (default: capture)
    #[serde(default)]
    pub output: OutputMode,

    /// Maximum characters of captured output kept per hook (default: 4000)
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Kill a hook that runs longer than this (default: no limit)
    #[serde(default)]
    pub hook_timeout_secs: Option<u64>,
}

fn default_max_output_chars() -> usize {
    4000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            hooks_root: None,
            policy: ExecutionPolicy::default(),
            output: OutputMode::default(),
            max_output_chars: default_max_output_chars(),
            hook_timeout_secs: None,
        }
    }
}

impl DispatchConfig {
    /// Resolve the hooks root against `cwd`.
    pub fn resolve_hooks_root(&self, cwd: &Path) -> PathBuf {
        match &self.hooks_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd.join(root),
            None => cwd.join(DEFAULT_HOOKS_DIR),
        }
    }
}

/// Branch publish settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Remote to push to (default: origin)
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch new branches are created from (default: current HEAD)
    #[serde(default)]
    pub root_branch: Option<String>,

    /// Maximum push attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds, doubled afterwards (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single delay in milliseconds (default: no cap)
    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    /// Random extra delay as a fraction of the computed delay (default: 0.1)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_jitter_ratio() -> f64 {
    0.1
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            root_branch: None,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl GithooksConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration for a process running in `cwd`, reading the
    /// real environment.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        Self::resolve_with(explicit, cwd, dirs::home_dir().as_deref(), |key| {
            std::env::var(key).ok()
        })
    }

    /// Same as [`GithooksConfig::resolve`] with the home directory and the
    /// environment supplied by the caller.
    pub fn resolve_with<F>(
        explicit: Option<&Path>,
        cwd: &Path,
        home: Option<&Path>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match find_config_file(explicit, cwd, home, &env) {
            Some(path) => {
                debug!(path = %path.display(), "Loading githooks config");
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No githooks config found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GITHOOKS_*` environment overrides.
    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = non_empty(env(GITHOOKS_POLICY_ENV)) {
            self.dispatch.policy =
                value
                    .parse()
                    .map_err(|message: String| ConfigError::InvalidEnv {
                        var: GITHOOKS_POLICY_ENV.to_string(),
                        message,
                    })?;
        }
        if let Some(value) = non_empty(env(GITHOOKS_HOOKS_ROOT_ENV)) {
            self.dispatch.hooks_root = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(env(GITHOOKS_REMOTE_ENV)) {
            self.publish.remote = value;
        }
        Ok(())
    }

    /// Reject values the dispatcher and publisher cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "publish.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.publish.jitter_ratio) {
            return Err(ConfigError::Invalid {
                field: "publish.jitter_ratio".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.publish.remote.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "publish.remote".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Locate the configuration file, if any.
fn find_config_file<F>(
    explicit: Option<&Path>,
    cwd: &Path,
    home: Option<&Path>,
    env: &F,
) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = non_empty(env(GITHOOKS_CONFIG_ENV)) {
        return Some(PathBuf::from(path));
    }

    let project = cwd.join(DEFAULT_HOOKS_DIR).join(CONFIG_FILE);
    if project.is_file() {
        return Some(project);
    }

    home.map(|h| h.join(DEFAULT_HOOKS_DIR).join(GLOBAL_CONFIG_FILE))
        .filter(|p| p.is_file())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
