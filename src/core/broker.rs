use crate::core::db;
use crate::core::error;
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The DB Broker is the single gateway to the ledger database.
///
/// Every call opens its own short-lived connection, performs exactly one
/// transaction, and drops the connection before returning. Nothing is cached
/// between calls, so concurrent callers only contend inside SQLite itself.
pub struct DbBroker {
    db_path: PathBuf,
}

impl DbBroker {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Execute a closure inside an IMMEDIATE transaction on a fresh connection.
    /// The transaction commits only if the closure returns `Ok`.
    pub fn with_tx<F, R>(&self, op_name: &str, f: F) -> Result<R, error::LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, error::LedgerError>,
    {
        let mut conn = db::db_connect(&self.db_path)?;
        let result = (|| -> Result<R, error::LedgerError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&*tx)?;
            tx.commit()?;
            Ok(out)
        })();
        self.log_event(op_name, result.is_ok());
        result
    }

    /// Execute a read-only closure on a fresh connection.
    pub fn with_read<F, R>(&self, op_name: &str, f: F) -> Result<R, error::LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, error::LedgerError>,
    {
        let conn = db::db_connect(&self.db_path)?;
        let result = f(&conn);
        self.log_event(op_name, result.is_ok());
        result
    }

    fn log_event(&self, op: &str, ok: bool) {
        let db_id = self
            .db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        let status = if ok { "success" } else { "error" };
        debug!(op, db = %db_id, status, "ledger db operation");
    }
}
