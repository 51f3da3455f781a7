//! Ledger subsystems.
//!
//! - `artifacts`: run-scoped JSON documents on disk
//! - `runs`: run identity and status lifecycle
//! - `outputs`: append-only index of stage outputs
//! - `pipeline`: helpers for stage agents following the ledger protocol

pub mod artifacts;
pub mod outputs;
pub mod pipeline;
pub mod runs;
