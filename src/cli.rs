//! CLI struct definitions for the `runledger` command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "runledger",
    version = env!("CARGO_PKG_VERSION"),
    about = "Run ledger and artifact store for multi-stage agent pipelines"
)]
pub(crate) struct Cli {
    /// Project root (defaults to the nearest ancestor holding runledger.toml, else the current directory).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Emit logs as JSON lines on stderr.
    #[clap(long, global = true)]
    pub log_json: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create, finish, and inspect runs
    Run(RunCli),
    /// Read and write run-scoped artifacts
    Artifact(ArtifactCli),
    /// Append to and query the output index
    Output(OutputCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct RunCli {
    #[clap(subcommand)]
    pub command: RunCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RunCommand {
    /// Register a new run for a user query.
    Create {
        #[clap(long)]
        query: String,
    },
    /// Set the status of a run (running, success, failed).
    Status {
        #[clap(long)]
        id: String,
        #[clap(long)]
        status: String,
        /// Refuse to move a run out of a terminal status.
        #[clap(long)]
        guarded: bool,
    },
    /// Show one run.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List the most recent runs, newest first.
    List {
        #[clap(long, default_value = "20")]
        limit: usize,
    },
    /// List runs still `running` after a deadline.
    Stale {
        #[clap(long)]
        older_than_secs: u64,
        /// Mark them `failed`.
        #[clap(long)]
        fail: bool,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ArtifactCli {
    #[clap(subcommand)]
    pub command: ArtifactCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ArtifactCommand {
    /// Write a JSON document under runs/{run}/{path}.
    Write {
        #[clap(long)]
        run: String,
        #[clap(long)]
        path: String,
        /// Document body as a JSON string.
        #[clap(long)]
        json: String,
    },
    /// Print a stored document.
    Read {
        #[clap(long)]
        run: String,
        #[clap(long)]
        path: String,
    },
    /// List artifact paths for a run.
    List {
        #[clap(long)]
        run: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct OutputCli {
    #[clap(subcommand)]
    pub command: OutputCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum OutputCommand {
    /// Index an artifact already on disk.
    Log {
        #[clap(long)]
        run: String,
        #[clap(long)]
        agent: String,
        #[clap(long)]
        step: u32,
        #[clap(long)]
        pointer: PathBuf,
        #[clap(long)]
        task: Option<String>,
        #[clap(long)]
        summary: Option<String>,
    },
    /// Show indexed outputs for a run, ordered by step.
    List {
        #[clap(long)]
        run: String,
        #[clap(long)]
        agent: Option<String>,
    },
}
