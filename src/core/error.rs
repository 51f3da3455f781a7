use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Run {run_id} is already terminal ({status})")]
    TerminalRun { run_id: String, status: String },
}

/// Coarse classification callers branch on. Disk and database failures
/// both surface as `Persistence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Serialization,
    Persistence,
    Config,
    Validation,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Serialization(_) => ErrorKind::Serialization,
            LedgerError::RusqliteError(_) | LedgerError::IoError(_) => ErrorKind::Persistence,
            LedgerError::ConfigError(_) => ErrorKind::Config,
            LedgerError::ValidationError(_) | LedgerError::TerminalRun { .. } => {
                ErrorKind::Validation
            }
        }
    }

    pub fn is_persistence(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}
