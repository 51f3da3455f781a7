//! Centralized schema definitions for the ledger database.
//!
//! The ledger keeps two tables in a single SQLite file:
//! 1. `runs`: one row per processed request, keyed by run id.
//! 2. `agent_outputs`: append-only index from (run, agent, step, task) to artifact pointers.

pub const LEDGER_DB_NAME: &str = "ledger.db";
pub const RUNS_DIR_NAME: &str = "runs";
pub const CONFIG_FILE_NAME: &str = "runledger.toml";

pub const LEDGER_DB_SCHEMA_RUNS: &str = "
    CREATE TABLE IF NOT EXISTS runs (
        run_id TEXT PRIMARY KEY,
        user_query TEXT NOT NULL,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL
    )
";
pub const LEDGER_DB_SCHEMA_RUNS_INDEX_CREATED: &str =
    "CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at)";
pub const LEDGER_DB_SCHEMA_RUNS_INDEX_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)";

// No foreign key on run_id: referential integrity is the caller's job.
pub const LEDGER_DB_SCHEMA_AGENT_OUTPUTS: &str = "
    CREATE TABLE IF NOT EXISTS agent_outputs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        agent TEXT NOT NULL,
        step INTEGER NOT NULL,
        task_id TEXT,
        summary TEXT,
        data_pointer TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";
pub const LEDGER_DB_SCHEMA_AGENT_OUTPUTS_INDEX_RUN: &str =
    "CREATE INDEX IF NOT EXISTS idx_agent_outputs_run_id ON agent_outputs(run_id)";
pub const LEDGER_DB_SCHEMA_AGENT_OUTPUTS_INDEX_AGENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_agent_outputs_agent ON agent_outputs(agent)";
pub const LEDGER_DB_SCHEMA_AGENT_OUTPUTS_INDEX_STEP: &str =
    "CREATE INDEX IF NOT EXISTS idx_agent_outputs_step ON agent_outputs(step)";

/// Statements applied, in order, when a ledger is opened.
pub const LEDGER_DB_SCHEMA: &[&str] = &[
    LEDGER_DB_SCHEMA_RUNS,
    LEDGER_DB_SCHEMA_RUNS_INDEX_CREATED,
    LEDGER_DB_SCHEMA_RUNS_INDEX_STATUS,
    LEDGER_DB_SCHEMA_AGENT_OUTPUTS,
    LEDGER_DB_SCHEMA_AGENT_OUTPUTS_INDEX_RUN,
    LEDGER_DB_SCHEMA_AGENT_OUTPUTS_INDEX_AGENT,
    LEDGER_DB_SCHEMA_AGENT_OUTPUTS_INDEX_STEP,
];
