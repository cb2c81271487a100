//! TOML-based configuration for a model repository.
//!
//! The commit identity may come from the environment: `author_name_env` and
//! `author_email_env` name variables that override the literal values when
//! [`RepoConfig::resolve_env_vars`] runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::export::ExportOptions;
use crate::recovery::RecoveryOptions;
use crate::vcs::CommitSignature;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub commit: CommitConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Location of the working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root of the git working tree holding `model/` and `images/`.
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Concurrent file writes during export (default 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Identity written on every commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Environment variable overriding `author_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name_env: Option<String>,

    /// Environment variable overriding `author_email`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email_env: Option<String>,
}

fn default_author_name() -> String {
    CommitSignature::default().name
}
fn default_author_email() -> String {
    CommitSignature::default().email
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            author_name: default_author_name(),
            author_email: default_author_email(),
            author_name_env: None,
            author_email_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Recover/re-import rounds (default 3).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Commits visited per history walk; 0 walks everything.
    #[serde(default)]
    pub max_commits: usize,
}

fn default_max_rounds() -> usize {
    3
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_commits: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl RepoConfig {
    /// Load a [`RepoConfig`] from a TOML file.
    ///
    /// A relative `repository.path` is taken relative to the file's
    /// directory. Environment overrides are not applied here.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: RepoConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config.repository.path.is_relative() {
            if let Some(base) = path.parent() {
                config.repository.path = base.join(&config.repository.path);
            }
        }

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Apply the `*_env` overrides of the `[commit]` section.
    ///
    /// A variable that is unset or empty logs a warning and keeps the
    /// literal value.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.commit.author_name_env {
            if let Some(value) = resolve_optional_env(env_name, "commit.author_name_env") {
                self.commit.author_name = value;
            }
        }
        if let Some(ref env_name) = self.commit.author_email_env {
            if let Some(value) = resolve_optional_env(env_name, "commit.author_email_env") {
                self.commit.author_email = value;
            }
        }
        Ok(())
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.workers".into(),
                detail: "worker count must be > 0".into(),
            });
        }
        if self.commit.author_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "commit.author_name".into(),
                detail: "author name must not be empty".into(),
            });
        }
        if !self.commit.author_email.contains('@') {
            return Err(ConfigError::InvalidValue {
                field: "commit.author_email".into(),
                detail: "author email must contain '@'".into(),
            });
        }
        if self.recovery.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "recovery.max_rounds".into(),
                detail: "at least one recovery round is required".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. for a freshly initialized repository.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn signature(&self) -> CommitSignature {
        CommitSignature {
            name: self.commit.author_name.clone(),
            email: self.commit.author_email.clone(),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            workers: self.export.workers,
        }
    }

    pub fn recovery_options(&self) -> RecoveryOptions {
        RecoveryOptions {
            max_rounds: self.recovery.max_rounds,
            max_commits: self.recovery.max_commits,
        }
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
