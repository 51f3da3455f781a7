//! Runledger: run ledger and artifact store for multi-stage agent pipelines.
//!
//! Every processed request gets a durable identity (a *run*). Each pipeline
//! stage writes its output as a JSON *artifact* under `runs/{run_id}/`, and an
//! append-only index maps (run, agent, step, task) to the artifact's location.
//!
//! # Architecture
//!
//! - **Artifact store** ([`plugins::artifacts`]): atomic write-then-rename of
//!   JSON documents scoped to a run.
//! - **Run registry** ([`plugins::runs`]): id allocation and the
//!   `running -> success | failed` lifecycle.
//! - **Output index** ([`plugins::outputs`]): immutable ledger rows ordered by
//!   `(step, id)`.
//! - **Pipeline helpers** ([`plugins::pipeline`]): the write-then-index,
//!   finish-once protocol stage agents follow.
//!
//! All database access goes through [`core::broker::DbBroker`], which opens a
//! fresh SQLite connection per call and runs one transaction.
//!
//! # Examples
//!
//! ```bash
//! runledger run create --query "find ZN futures price trend"
//! runledger artifact write --run <id> --path planner1.json --json '{"plan":["step1"]}'
//! runledger output log --run <id> --agent planner1 --step 1 --pointer runs/<id>/planner1.json
//! runledger run status --id <id> --status success
//! ```

mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{ArtifactCommand, Cli, Command, OutputCommand, RunCommand};
use crate::core::{
    config::LedgerConfig,
    error::LedgerError,
    schemas,
    store::Ledger,
    time::command_envelope,
};
use crate::plugins::{artifacts, outputs, runs};
use clap::Parser;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "RUNLEDGER_LOG";

/// Nearest ancestor of `start_dir` holding `runledger.toml`, else `start_dir`.
fn find_project_root(start_dir: &Path) -> PathBuf {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(schemas::CONFIG_FILE_NAME).exists() {
            return current_dir;
        }
        if !current_dir.pop() {
            return start_dir.to_path_buf();
        }
    }
}

/// Install the stderr subscriber. `RUNLEDGER_LOG` takes an `EnvFilter`
/// directive; the default is `warn`.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

pub fn run() -> Result<(), LedgerError> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let project_root = match cli.root {
        Some(root) => root,
        None => find_project_root(&std::env::current_dir()?),
    };
    let ledger = Ledger::open(LedgerConfig::load(&project_root)?)?;

    let envelope = match cli.command {
        Command::Run(run_cli) => run_run_cli(&ledger, run_cli.command)?,
        Command::Artifact(artifact_cli) => run_artifact_cli(&ledger, artifact_cli.command)?,
        Command::Output(output_cli) => run_output_cli(&ledger, output_cli.command)?,
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn run_run_cli(ledger: &Ledger, command: RunCommand) -> Result<serde_json::Value, LedgerError> {
    Ok(match command {
        RunCommand::Create { query } => {
            let run_id = runs::create_run(ledger, &query)?;
            command_envelope("run.create", "ok", json!({ "run_id": run_id }))
        }
        RunCommand::Status {
            id,
            status,
            guarded,
        } => {
            if guarded {
                runs::update_status_guarded(ledger, &id, &status)?;
            } else {
                runs::update_status(ledger, &id, &status)?;
            }
            command_envelope("run.status", "ok", json!({ "run_id": id, "run_status": status }))
        }
        RunCommand::Get { id } => match runs::get_run(ledger, &id)? {
            Some(run) => command_envelope("run.get", "ok", json!({ "run": run })),
            None => command_envelope("run.get", "not_found", json!({ "run_id": id })),
        },
        RunCommand::List { limit } => {
            let recent = runs::list_recent_runs(ledger, limit)?;
            command_envelope("run.list", "ok", json!({ "runs": recent }))
        }
        RunCommand::Stale {
            older_than_secs,
            fail,
        } => {
            let older_than = Duration::from_secs(older_than_secs);
            if fail {
                let failed = runs::fail_stale_runs(ledger, older_than)?;
                command_envelope("run.stale", "ok", json!({ "failed": failed }))
            } else {
                let stale = runs::list_stale_runs(ledger, older_than)?;
                command_envelope("run.stale", "ok", json!({ "runs": stale }))
            }
        }
    })
}

fn run_artifact_cli(
    ledger: &Ledger,
    command: ArtifactCommand,
) -> Result<serde_json::Value, LedgerError> {
    Ok(match command {
        ArtifactCommand::Write { run, path, json } => {
            let doc: serde_json::Value = serde_json::from_str(&json)?;
            let written = artifacts::write_artifact(ledger, &run, &path, &doc)?;
            command_envelope(
                "artifact.write",
                "ok",
                json!({ "run_id": run, "path": written.to_string_lossy() }),
            )
        }
        ArtifactCommand::Read { run, path } => {
            let doc = artifacts::read_run_artifact(ledger, &run, &path)?;
            command_envelope("artifact.read", "ok", json!({ "run_id": run, "document": doc }))
        }
        ArtifactCommand::List { run } => {
            let paths = artifacts::list_artifacts(ledger, &run)?;
            command_envelope("artifact.list", "ok", json!({ "run_id": run, "artifacts": paths }))
        }
    })
}

fn run_output_cli(
    ledger: &Ledger,
    command: OutputCommand,
) -> Result<serde_json::Value, LedgerError> {
    Ok(match command {
        OutputCommand::Log {
            run,
            agent,
            step,
            pointer,
            task,
            summary,
        } => {
            let mut entry = outputs::NewAgentOutput::new(&run, &agent, step, &pointer);
            entry.task_id = task.as_deref();
            entry.summary = summary.as_deref();
            let id = outputs::log_agent_output(ledger, &entry)?;
            command_envelope("output.log", "ok", json!({ "run_id": run, "output_id": id }))
        }
        OutputCommand::List { run, agent } => {
            let rows = match agent {
                Some(agent) => outputs::list_outputs_by_agent(ledger, &run, &agent)?,
                None => outputs::get_outputs_for_run(ledger, &run)?,
            };
            command_envelope("output.list", "ok", json!({ "run_id": run, "outputs": rows }))
        }
    })
}
