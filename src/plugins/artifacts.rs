//! Run-scoped JSON artifact store.
//!
//! Layout:
//!
//! ```text
//! <runs_root>/{run_id}/
//!   query.json                 first artifact of every run
//!   planner1.json
//!   planner2/{task_id}.json
//!   workers/{agent}/{task_id}.json
//!   runner_output.json
//! ```
//!
//! Writes go to a uniquely named sibling temp file, are fsynced, then renamed
//! over the target, and the containing directory is fsynced so the rename
//! itself survives a crash. A reader sees the previous complete document or
//! the new one, never a prefix.

use crate::core::error::LedgerError;
use crate::core::store::Ledger;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use ulid::Ulid;

const TMP_SUFFIX: &str = ".tmp";

/// Where `relative_path` lives for `run_id`. Pure path computation; the
/// relative path is not checked for `..` components.
pub fn artifact_path(ledger: &Ledger, run_id: &str, relative_path: &str) -> PathBuf {
    ledger.run_dir(run_id).join(relative_path)
}

/// Serialize `payload` and atomically persist it at `runs/{run_id}/{relative_path}`.
/// Returns the absolute path written.
///
/// Serialization happens before anything touches the disk, so a payload that
/// cannot be represented as JSON leaves no directory or file behind.
pub fn write_artifact<T>(
    ledger: &Ledger,
    run_id: &str,
    relative_path: &str,
    payload: &T,
) -> Result<PathBuf, LedgerError>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(payload)?;

    let path = std::path::absolute(artifact_path(ledger, run_id, relative_path))
        .map_err(LedgerError::IoError)?;
    let parent = path.parent().ok_or_else(|| {
        LedgerError::ValidationError(format!("artifact path has no parent: {}", path.display()))
    })?;
    create_dirs_durable(parent).map_err(LedgerError::IoError)?;

    atomic_write(&path, &bytes)?;
    debug!(run_id, artifact = relative_path, bytes = bytes.len(), "artifact written");
    Ok(path)
}

/// Read back a document previously written by [`write_artifact`].
pub fn read_artifact(path: &Path) -> Result<Value, LedgerError> {
    let content = fs::read(path).map_err(LedgerError::IoError)?;
    Ok(serde_json::from_slice(&content)?)
}

pub fn read_run_artifact(
    ledger: &Ledger,
    run_id: &str,
    relative_path: &str,
) -> Result<Value, LedgerError> {
    read_artifact(&artifact_path(ledger, run_id, relative_path))
}

/// Relative paths (`/`-separated, sorted) of every artifact under a run.
/// In-flight temp files are skipped. A run with no directory has no artifacts.
pub fn list_artifacts(ledger: &Ledger, run_id: &str) -> Result<Vec<String>, LedgerError> {
    let run_dir = ledger.run_dir(run_id);
    let mut out = Vec::new();
    if !run_dir.is_dir() {
        return Ok(out);
    }
    collect_files(&run_dir, &run_dir, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), LedgerError> {
    for entry in fs::read_dir(dir).map_err(LedgerError::IoError)? {
        let entry = entry.map_err(LedgerError::IoError)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(LedgerError::IoError)?;
        if file_type.is_dir() {
            collect_files(base, &path, out)?;
        } else if file_type.is_file() && !is_temp_file(&path) {
            let rel = path.strip_prefix(base).unwrap_or(&path);
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let n = n.to_string_lossy();
            n.starts_with('.') && n.ends_with(TMP_SUFFIX)
        })
        .unwrap_or(false)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), LedgerError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    // Unique per writer so concurrent writes to the same target never share a temp file.
    let tmp = path.with_file_name(format!(".{file_name}.{}{TMP_SUFFIX}", Ulid::new()));

    let result = (|| -> std::io::Result<()> {
        let mut f = File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(LedgerError::IoError(e));
    }
    if let Some(parent) = path.parent() {
        sync_dir(parent).map_err(LedgerError::IoError)?;
    }
    Ok(())
}

/// Flush a directory's entries to disk. No-op where directories cannot be
/// opened as files.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

/// `create_dir_all`, fsyncing the parent of every directory it creates.
pub(crate) fn create_dirs_durable(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        create_dirs_durable(parent)?;
    }
    match fs::create_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => return Ok(()),
        Err(e) => return Err(e),
    }
    match dir.parent() {
        Some(parent) => sync_dir(parent),
        None => Ok(()),
    }
}
