//! Core modules shared by every ledger component.
//!
//! Configuration, error types, the connection broker, schema definitions,
//! and timestamp/id helpers live here.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod schemas;
pub mod store;
pub mod time;
