//! Append-only output index: (run, agent, step, task) -> artifact pointer.
//!
//! Rows are never updated or deleted. A correction is a new row.

use crate::core::error::LedgerError;
use crate::core::store::Ledger;
use crate::core::time;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub id: i64,
    pub run_id: String,
    pub agent: String,
    pub step: u32,
    pub task_id: Option<String>,
    pub summary: Option<String>,
    pub data_pointer: String,
    pub created_at: String,
}

impl AgentOutput {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AgentOutput {
            id: row.get(0)?,
            run_id: row.get(1)?,
            agent: row.get(2)?,
            step: row.get(3)?,
            task_id: row.get(4)?,
            summary: row.get(5)?,
            data_pointer: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Input for [`log_agent_output`].
#[derive(Debug, Clone)]
pub struct NewAgentOutput<'a> {
    pub run_id: &'a str,
    pub agent: &'a str,
    pub step: u32,
    pub data_pointer: &'a Path,
    pub task_id: Option<&'a str>,
    pub summary: Option<&'a str>,
}

impl<'a> NewAgentOutput<'a> {
    pub fn new(run_id: &'a str, agent: &'a str, step: u32, data_pointer: &'a Path) -> Self {
        Self {
            run_id,
            agent,
            step,
            data_pointer,
            task_id: None,
            summary: None,
        }
    }

    pub fn task_id(mut self, task_id: &'a str) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn summary(mut self, summary: &'a str) -> Self {
        self.summary = Some(summary);
        self
    }
}

/// Store `pointer` relative to `project_root` when it lies underneath it,
/// otherwise verbatim. `.` and `..` are resolved lexically before the check,
/// so `<root>/../x` is not mistaken for a path under the root.
pub fn normalize_pointer(project_root: &Path, pointer: &Path) -> String {
    if pointer.is_absolute() {
        let root = std::path::absolute(project_root).unwrap_or_else(|_| project_root.to_path_buf());
        let root = lexical_normalize(&root);
        if let Ok(rel) = lexical_normalize(pointer).strip_prefix(&root) {
            return rel.to_string_lossy().to_string();
        }
    }
    pointer.to_string_lossy().to_string()
}

/// Resolve `.` and `..` without touching the filesystem. `..` at the root
/// stays at the root.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute location of an indexed artifact; relative pointers resolve
/// against the project root.
pub fn resolve_pointer(ledger: &Ledger, output: &AgentOutput) -> PathBuf {
    let pointer = Path::new(&output.data_pointer);
    if pointer.is_absolute() {
        pointer.to_path_buf()
    } else {
        ledger.project_root().join(pointer)
    }
}

/// Append one row and return its id. Ids increase strictly in insertion order.
///
/// Call this only after the artifact is on disk.
pub fn log_agent_output(ledger: &Ledger, output: &NewAgentOutput<'_>) -> Result<i64, LedgerError> {
    if output.step == 0 {
        return Err(LedgerError::ValidationError(
            "step must be a positive integer".to_string(),
        ));
    }
    let data_pointer = normalize_pointer(ledger.project_root(), output.data_pointer);
    let created_at = time::now_timestamp()?;

    let id = ledger.broker().with_tx("outputs.log", |conn| {
        conn.execute(
            "INSERT INTO agent_outputs(run_id, agent, step, task_id, summary, data_pointer, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                output.run_id,
                output.agent,
                output.step,
                output.task_id,
                output.summary,
                data_pointer,
                created_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })?;

    debug!(
        run_id = output.run_id,
        agent = output.agent,
        step = output.step,
        output_id = id,
        "agent output indexed"
    );
    Ok(id)
}

const SELECT_OUTPUTS: &str = "SELECT id, run_id, agent, step, task_id, summary, data_pointer, created_at
     FROM agent_outputs";

/// Every row for a run, ordered by (step, id).
pub fn get_outputs_for_run(ledger: &Ledger, run_id: &str) -> Result<Vec<AgentOutput>, LedgerError> {
    ledger.broker().with_read("outputs.for_run", |conn| {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_OUTPUTS} WHERE run_id = ?1 ORDER BY step ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![run_id], AgentOutput::from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Rows for one agent within a run, same ordering as [`get_outputs_for_run`].
pub fn list_outputs_by_agent(
    ledger: &Ledger,
    run_id: &str,
    agent: &str,
) -> Result<Vec<AgentOutput>, LedgerError> {
    ledger.broker().with_read("outputs.by_agent", |conn| {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_OUTPUTS} WHERE run_id = ?1 AND agent = ?2 ORDER BY step ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![run_id, agent], AgentOutput::from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}
