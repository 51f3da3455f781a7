//! Ledger handle shared by the artifact store, run registry, and output index.
//!
//! A [`Ledger`] owns only configuration. It holds no connection and caches no
//! rows: every operation goes through a fresh [`DbBroker`] call.

use crate::core::broker::DbBroker;
use crate::core::config::{LedgerConfig, StatusPolicy};
use crate::core::db;
use crate::core::error::LedgerError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
}

impl Ledger {
    /// Create the run root and database (idempotent) and return a handle.
    pub fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        fs::create_dir_all(&config.runs_root).map_err(LedgerError::IoError)?;
        db::initialize_ledger_db(&config.db_path)?;
        Ok(Self { config })
    }

    /// Shorthand for `open(LedgerConfig::load(project_root)?)`.
    pub fn open_at(project_root: &Path) -> Result<Self, LedgerError> {
        Self::open(LedgerConfig::load(project_root)?)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.config.project_root
    }

    pub fn runs_root(&self) -> &Path {
        &self.config.runs_root
    }

    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.config.status_policy
    }

    pub fn broker(&self) -> DbBroker {
        DbBroker::new(&self.config.db_path)
    }

    /// `runs/{run_id}` under the configured run root.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.config.runs_root.join(run_id)
    }
}
