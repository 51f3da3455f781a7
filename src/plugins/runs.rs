//! Run registry: identity and status lifecycle of runs.
//!
//! A run starts `running` and is finished by exactly one call to
//! [`update_status`] with `success` or `failed`. The registry records what the
//! caller does; it does not sequence the pipeline.

use crate::core::config::StatusPolicy;
use crate::core::error::LedgerError;
use crate::core::store::Ledger;
use crate::core::time;
use crate::plugins::artifacts;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{info, warn};

pub const QUERY_ARTIFACT: &str = "query.json";

/// Attempts at reserving a fresh run directory before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub user_query: String,
    pub created_at: String,
    /// Stored verbatim; may hold an out-of-enum value under the lenient policy.
    pub status: String,
}

impl Run {
    pub fn status_kind(&self) -> Option<RunStatus> {
        RunStatus::parse(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status_kind().is_some_and(RunStatus::is_terminal)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Run {
            run_id: row.get(0)?,
            user_query: row.get(1)?,
            created_at: row.get(2)?,
            status: row.get(3)?,
        })
    }
}

#[derive(Serialize)]
struct QueryArtifact<'a> {
    run_id: &'a str,
    user_query: &'a str,
    created_at: &'a str,
}

/// Register a new run and return its id.
///
/// Order: reserve `runs/{run_id}/`, write `query.json`, then insert the row
/// with status `running`. A failure after the artifact write leaves an
/// orphaned run directory; nothing is rolled back.
pub fn create_run(ledger: &Ledger, user_query: &str) -> Result<String, LedgerError> {
    let now = time::now_utc();
    let created_at = time::format_timestamp(now)?;
    let run_id = reserve_run_dir(ledger, now)?;

    artifacts::write_artifact(
        ledger,
        &run_id,
        QUERY_ARTIFACT,
        &QueryArtifact {
            run_id: &run_id,
            user_query,
            created_at: &created_at,
        },
    )?;

    ledger.broker().with_tx("runs.create", |conn| {
        conn.execute(
            "INSERT INTO runs(run_id, user_query, created_at, status) VALUES(?1, ?2, ?3, ?4)",
            params![run_id, user_query, created_at, RunStatus::Running.as_str()],
        )?;
        Ok(())
    })?;

    info!(run_id = %run_id, "run created");
    Ok(run_id)
}

/// Exclusive `create_dir` makes the id unique among runs on this root even if
/// two callers draw the same suffix.
fn reserve_run_dir(ledger: &Ledger, now: ::time::OffsetDateTime) -> Result<String, LedgerError> {
    artifacts::create_dirs_durable(ledger.runs_root()).map_err(LedgerError::IoError)?;
    for _ in 0..MAX_ID_ATTEMPTS {
        let run_id = time::new_run_id(now)?;
        match fs::create_dir(ledger.run_dir(&run_id)) {
            Ok(()) => {
                artifacts::sync_dir(ledger.runs_root()).map_err(LedgerError::IoError)?;
                return Ok(run_id);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LedgerError::IoError(e)),
        }
    }
    Err(LedgerError::ValidationError(format!(
        "could not allocate a unique run id after {MAX_ID_ATTEMPTS} attempts"
    )))
}

fn check_status(ledger: &Ledger, run_id: &str, status: &str) -> Result<(), LedgerError> {
    if RunStatus::parse(status).is_some() {
        return Ok(());
    }
    match ledger.status_policy() {
        StatusPolicy::Lenient => {
            warn!(run_id, status, "unrecognized run status; storing it anyway");
            Ok(())
        }
        StatusPolicy::Strict => Err(LedgerError::ValidationError(format!(
            "invalid run status '{status}' (expected running, success or failed)"
        ))),
    }
}

/// Set the status of a run. Repeating the same value is a no-op in effect.
///
/// Out-of-enum values are stored with a warning under [`StatusPolicy::Lenient`]
/// and rejected under [`StatusPolicy::Strict`]. Terminal runs are not protected
/// here; see [`update_status_guarded`].
pub fn update_status(ledger: &Ledger, run_id: &str, status: &str) -> Result<(), LedgerError> {
    check_status(ledger, run_id, status)?;

    let changed = ledger.broker().with_tx("runs.update_status", |conn| {
        Ok(conn.execute(
            "UPDATE runs SET status = ?1 WHERE run_id = ?2",
            params![status, run_id],
        )?)
    })?;

    if changed == 0 {
        warn!(run_id, status, "status update matched no run");
    } else {
        info!(run_id, status, "run status updated");
    }
    Ok(())
}

/// Like [`update_status`], but refuses to move a run out of a terminal state.
/// Re-applying the current terminal value still succeeds.
pub fn update_status_guarded(
    ledger: &Ledger,
    run_id: &str,
    status: &str,
) -> Result<(), LedgerError> {
    check_status(ledger, run_id, status)?;

    ledger.broker().with_tx("runs.update_status_guarded", |conn| {
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            warn!(run_id, status, "status update matched no run");
            return Ok(());
        };
        if current == status {
            return Ok(());
        }
        if RunStatus::parse(&current).is_some_and(RunStatus::is_terminal) {
            return Err(LedgerError::TerminalRun {
                run_id: run_id.to_string(),
                status: current,
            });
        }
        conn.execute(
            "UPDATE runs SET status = ?1 WHERE run_id = ?2",
            params![status, run_id],
        )?;
        info!(run_id, status, "run status updated");
        Ok(())
    })
}

/// `Ok(None)` for an unknown id.
pub fn get_run(ledger: &Ledger, run_id: &str) -> Result<Option<Run>, LedgerError> {
    ledger.broker().with_read("runs.get", |conn| {
        Ok(conn
            .query_row(
                "SELECT run_id, user_query, created_at, status FROM runs WHERE run_id = ?1",
                params![run_id],
                Run::from_row,
            )
            .optional()?)
    })
}

/// Newest first, at most `limit` runs.
pub fn list_recent_runs(ledger: &Ledger, limit: usize) -> Result<Vec<Run>, LedgerError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    ledger.broker().with_read("runs.list_recent", |conn| {
        let mut stmt = conn.prepare(
            "SELECT run_id, user_query, created_at, status FROM runs
             ORDER BY created_at DESC, run_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Run::from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// `now - older_than` as a stored timestamp, or `None` when the subtraction
/// leaves the representable range.
fn stale_cutoff(older_than: Duration) -> Result<Option<String>, LedgerError> {
    let Ok(delta) = ::time::Duration::try_from(older_than) else {
        return Ok(None);
    };
    match time::now_utc().checked_sub(delta) {
        Some(cutoff) => Ok(Some(time::format_timestamp(cutoff)?)),
        None => Ok(None),
    }
}

/// Runs still `running` that were created more than `older_than` ago, oldest first.
/// A deadline reaching past the earliest representable time matches nothing.
pub fn list_stale_runs(ledger: &Ledger, older_than: Duration) -> Result<Vec<Run>, LedgerError> {
    let Some(cutoff) = stale_cutoff(older_than)? else {
        return Ok(Vec::new());
    };
    ledger.broker().with_read("runs.list_stale", |conn| {
        let mut stmt = conn.prepare(
            "SELECT run_id, user_query, created_at, status FROM runs
             WHERE status = ?1 AND created_at < ?2
             ORDER BY created_at ASC, run_id ASC",
        )?;
        let rows = stmt.query_map(
            params![RunStatus::Running.as_str(), cutoff],
            Run::from_row,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Mark every stale `running` run as `failed`; returns the affected ids.
pub fn fail_stale_runs(ledger: &Ledger, older_than: Duration) -> Result<Vec<String>, LedgerError> {
    let Some(cutoff) = stale_cutoff(older_than)? else {
        return Ok(Vec::new());
    };
    let ids = ledger.broker().with_tx("runs.fail_stale", |conn| {
        let mut stmt = conn.prepare(
            "SELECT run_id FROM runs WHERE status = ?1 AND created_at < ?2
             ORDER BY created_at ASC, run_id ASC",
        )?;
        let ids = stmt
            .query_map(params![RunStatus::Running.as_str(), cutoff], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for id in &ids {
            conn.execute(
                "UPDATE runs SET status = ?1 WHERE run_id = ?2",
                params![RunStatus::Failed.as_str(), id],
            )?;
        }
        Ok(ids)
    })?;

    for run_id in &ids {
        warn!(run_id = %run_id, "stale run marked failed");
    }
    Ok(ids)
}
