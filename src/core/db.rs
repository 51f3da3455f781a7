use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Seconds a connection waits on a locked database before reporting busy.
const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &Path) -> Result<Connection, error::LedgerError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
        .map_err(error::LedgerError::RusqliteError)?;
    Ok(conn)
}

/// Create the database file and apply the schema. Safe to call repeatedly and
/// from several threads at once: every statement is `IF NOT EXISTS` and the
/// batch runs inside one immediate transaction.
pub fn initialize_ledger_db(db_path: &Path) -> Result<(), error::LedgerError> {
    // Switching journal mode needs an exclusive lock; serialize in-process first use.
    static INIT_LOCK: Mutex<()> = Mutex::new(());
    let _lock = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(parent_dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(error::LedgerError::IoError)?;
    }

    // WAL is persistent in the file header, so per-call connections inherit it.
    let conn = db_connect(db_path)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::LedgerError::RusqliteError)?;
    drop(conn);

    let broker = DbBroker::new(db_path);
    broker.with_tx("ledger.init", |conn| {
        for stmt in schemas::LEDGER_DB_SCHEMA {
            conn.execute(stmt, [])?;
        }
        Ok(())
    })
}
