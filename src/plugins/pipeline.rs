//! Helpers for stage agents driving the ledger.
//!
//! The ledger itself does not know how many stages exist or in which order
//! they run. A pipeline must, per request:
//!
//! 1. create the run once,
//! 2. for every stage output, write the artifact and then index it,
//! 3. finish the run exactly once with `success` or `failed`.
//!
//! [`RunSession`] packages that protocol: `record` always writes before it
//! indexes, and `finish` consumes the session so it cannot be called twice.

use crate::core::error::LedgerError;
use crate::core::store::Ledger;
use crate::plugins::artifacts;
use crate::plugins::outputs::{self, NewAgentOutput};
use crate::plugins::runs::{self, RunStatus};
use serde::Serialize;
use std::path::PathBuf;

/// Conventional artifact names used by the standard stages.
pub mod names {
    pub const PLANNER1: &str = "planner1.json";
    pub const RUNNER_OUTPUT: &str = "runner_output.json";

    pub fn planner2(task_id: &str) -> String {
        format!("planner2/{task_id}.json")
    }

    pub fn worker(agent: &str, task_id: &str) -> String {
        format!("workers/{agent}/{task_id}.json")
    }
}

/// Result of [`RunSession::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutput {
    pub output_id: i64,
    pub path: PathBuf,
}

/// One stage output to persist and index.
pub struct StageOutput<'a, T: Serialize + ?Sized> {
    pub agent: &'a str,
    pub step: u32,
    pub relative_path: &'a str,
    pub payload: &'a T,
    pub task_id: Option<&'a str>,
    pub summary: Option<&'a str>,
}

impl<'a, T: Serialize + ?Sized> StageOutput<'a, T> {
    pub fn new(agent: &'a str, step: u32, relative_path: &'a str, payload: &'a T) -> Self {
        Self {
            agent,
            step,
            relative_path,
            payload,
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

/// Write the artifact, then index it. If the write fails nothing is indexed;
/// if indexing fails the artifact stays behind as an orphan.
pub fn record_output<T: Serialize + ?Sized>(
    ledger: &Ledger,
    run_id: &str,
    output: &StageOutput<'_, T>,
) -> Result<RecordedOutput, LedgerError> {
    let path = artifacts::write_artifact(ledger, run_id, output.relative_path, output.payload)?;

    let mut entry = NewAgentOutput::new(run_id, output.agent, output.step, &path);
    entry.task_id = output.task_id;
    entry.summary = output.summary;
    let output_id = outputs::log_agent_output(ledger, &entry)?;

    Ok(RecordedOutput { output_id, path })
}

pub struct RunSession<'l> {
    ledger: &'l Ledger,
    run_id: String,
}

impl<'l> RunSession<'l> {
    /// Create a new run for `user_query`.
    pub fn start(ledger: &'l Ledger, user_query: &str) -> Result<Self, LedgerError> {
        let run_id = runs::create_run(ledger, user_query)?;
        Ok(Self { ledger, run_id })
    }

    /// Attach to a run created elsewhere. The id is not checked.
    pub fn resume(ledger: &'l Ledger, run_id: impl Into<String>) -> Self {
        Self {
            ledger,
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record<T: Serialize + ?Sized>(
        &self,
        output: &StageOutput<'_, T>,
    ) -> Result<RecordedOutput, LedgerError> {
        record_output(self.ledger, &self.run_id, output)
    }

    /// Set the terminal status and end the session.
    pub fn finish(self, success: bool) -> Result<String, LedgerError> {
        let status = if success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        runs::update_status(self.ledger, &self.run_id, status.as_str())?;
        Ok(self.run_id)
    }
}
