//! Ledger configuration.
//!
//! Paths are explicit values carried by [`LedgerConfig`]; nothing is resolved
//! from module-level globals. `load` layers an optional `runledger.toml` and
//! then environment overrides on top of the defaults.

use crate::core::error::LedgerError;
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DB_PATH_ENV: &str = "RUNLEDGER_DB_PATH";
pub const RUNS_ROOT_ENV: &str = "RUNLEDGER_RUNS_ROOT";
pub const STATUS_POLICY_ENV: &str = "RUNLEDGER_STATUS_POLICY";

/// How `update_status` treats a status string outside {running, success, failed}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Log a warning and store the value anyway.
    #[default]
    Lenient,
    /// Reject with `ValidationError`.
    Strict,
}

impl FromStr for StatusPolicy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(StatusPolicy::Lenient),
            "strict" => Ok(StatusPolicy::Strict),
            other => Err(LedgerError::ConfigError(format!(
                "unknown status policy '{other}' (expected 'lenient' or 'strict')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Data pointers under this directory are stored relative to it.
    pub project_root: PathBuf,
    pub db_path: PathBuf,
    pub runs_root: PathBuf,
    pub status_policy: StatusPolicy,
}

/// On-disk shape of `runledger.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    db_path: Option<PathBuf>,
    runs_root: Option<PathBuf>,
    status_policy: Option<StatusPolicy>,
}

impl LedgerConfig {
    /// Defaults: `<root>/data/ledger.db` and `<root>/runs`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            db_path: project_root.join("data").join(schemas::LEDGER_DB_NAME),
            runs_root: project_root.join(schemas::RUNS_DIR_NAME),
            project_root,
            status_policy: StatusPolicy::default(),
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_runs_root(mut self, runs_root: impl Into<PathBuf>) -> Self {
        self.runs_root = runs_root.into();
        self
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Defaults, then `<root>/runledger.toml` if present, then environment.
    pub fn load(project_root: &Path) -> Result<Self, LedgerError> {
        let mut config = Self::new(project_root);

        let config_path = project_root.join(schemas::CONFIG_FILE_NAME);
        if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(LedgerError::IoError)?;
            let file: ConfigFile = toml::from_str(&content).map_err(|e| {
                LedgerError::ConfigError(format!("{}: {e}", config_path.display()))
            })?;
            config.apply_file(file);
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(db_path) = file.db_path {
            self.db_path = self.resolve(db_path);
        }
        if let Some(runs_root) = file.runs_root {
            self.runs_root = self.resolve(runs_root);
        }
        if let Some(policy) = file.status_policy {
            self.status_policy = policy;
        }
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup(DB_PATH_ENV).filter(|v| !v.is_empty()) {
            self.db_path = self.resolve(PathBuf::from(db_path));
        }
        if let Some(runs_root) = lookup(RUNS_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.runs_root = self.resolve(PathBuf::from(runs_root));
        }
        if let Some(policy) = lookup(STATUS_POLICY_ENV).filter(|v| !v.is_empty()) {
            self.status_policy = policy.parse()?;
        }
        Ok(())
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.project_root.join(path)
        }
    }
}
