//! Shared timestamp/identifier helpers.
//!
//! Timestamps are stored as fixed-width UTC strings with microsecond precision
//! so that lexicographic order in SQLite equals chronological order.

use crate::core::error::LedgerError;
use serde_json::Value as JsonValue;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::warn;
use ulid::Ulid;

const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);
const RUN_ID_PREFIX_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");

/// Length of the random tail appended to run ids.
pub const RUN_ID_SUFFIX_LEN: usize = 8;

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, LedgerError> {
    ts.to_offset(time::UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| LedgerError::ValidationError(format!("timestamp format: {e}")))
}

pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, LedgerError> {
    PrimitiveDateTime::parse(value, TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| LedgerError::ValidationError(format!("invalid timestamp '{value}': {e}")))
}

pub fn now_timestamp() -> Result<String, LedgerError> {
    format_timestamp(now_utc())
}

/// Second-resolution prefix followed by a short random tail, e.g.
/// `20261017T093015_7k2m9qxa`. Ids sort chronologically by prefix.
pub fn new_run_id(at: OffsetDateTime) -> Result<String, LedgerError> {
    let prefix = at
        .to_offset(time::UtcOffset::UTC)
        .format(RUN_ID_PREFIX_FORMAT)
        .map_err(|e| LedgerError::ValidationError(format!("run id format: {e}")))?;
    let ulid = Ulid::new().to_string().to_lowercase();
    let suffix = &ulid[ulid.len() - RUN_ID_SUFFIX_LEN..];
    Ok(format!("{prefix}_{suffix}"))
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used by the CLI.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let now = now_utc();
    let ts = format_timestamp(now).unwrap_or_else(|e| {
        warn!(error = %e, "envelope timestamp fell back to unix seconds");
        now.unix_timestamp().to_string()
    });
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": ts,
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
