use runledger::core::config::{LedgerConfig, StatusPolicy};
use runledger::core::db;
use runledger::core::error::LedgerError;
use runledger::core::store::Ledger;
use runledger::plugins::artifacts::read_run_artifact;
use runledger::plugins::runs::{
    QUERY_ARTIFACT, RunStatus, create_run, fail_stale_runs, get_run, list_recent_runs,
    list_stale_runs, update_status, update_status_guarded,
};
use rusqlite::params;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tracing::Level;

fn open_ledger(root: &Path) -> Ledger {
    Ledger::open(LedgerConfig::new(root)).unwrap()
}

/// In-memory sink for a scoped tracing subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with warnings routed into the returned buffer.
fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}

/// Rewrite a run's creation time so ordering and staleness can be tested deterministically.
fn backdate(ledger: &Ledger, run_id: &str, created_at: &str) {
    let conn = db::db_connect(ledger.db_path()).unwrap();
    conn.execute(
        "UPDATE runs SET created_at = ?1 WHERE run_id = ?2",
        params![created_at, run_id],
    )
    .unwrap();
}

#[test]
fn test_run_lifecycle() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());

    // 1. Create
    let run_id = create_run(&ledger, "find ZN futures price trend").unwrap();
    let run = get_run(&ledger, &run_id).unwrap().expect("Run not found");
    assert_eq!(run.run_id, run_id);
    assert_eq!(run.user_query, "find ZN futures price trend");
    assert_eq!(run.status, "running");
    assert_eq!(run.status_kind(), Some(RunStatus::Running));
    assert!(!run.is_terminal());

    // 2. Initial artifact
    let query = read_run_artifact(&ledger, &run_id, QUERY_ARTIFACT).unwrap();
    assert_eq!(query["run_id"], run_id.as_str());
    assert_eq!(query["user_query"], "find ZN futures price trend");
    assert_eq!(query["created_at"], run.created_at.as_str());

    // 3. Finish
    update_status(&ledger, &run_id, "success").unwrap();
    let run = get_run(&ledger, &run_id).unwrap().unwrap();
    assert_eq!(run.status, "success");
    assert!(run.is_terminal());
}

#[test]
fn test_create_run_ids_are_unique() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());

    let mut seen = HashSet::new();
    for i in 0..50 {
        let run_id = create_run(&ledger, &format!("query {i}")).unwrap();
        assert!(seen.insert(run_id.clone()), "duplicate run id {run_id}");
        let run = get_run(&ledger, &run_id).unwrap().unwrap();
        assert_eq!(run.status, "running");
        assert_eq!(run.user_query, format!("query {i}"));
    }
}

#[test]
fn test_concurrent_create_run_ids_are_unique() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());

    let ids: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = &ledger;
                s.spawn(move || {
                    (0..5)
                        .map(|i| create_run(ledger, &format!("t{t}-{i}")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 40);
    assert_eq!(list_recent_runs(&ledger, 100).unwrap().len(), 40);
}

#[test]
fn test_run_ids_sort_by_creation_prefix() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());

    let run_id = create_run(&ledger, "q").unwrap();
    let (prefix, suffix) = run_id.split_once('_').unwrap();
    assert_eq!(prefix.len(), "20261017T093015".len());
    assert!(prefix.starts_with(&get_run(&ledger, &run_id).unwrap().unwrap().created_at[..4]));
    assert!(!suffix.is_empty());
}

#[test]
fn test_update_status_is_idempotent() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let run_id = create_run(&ledger, "q").unwrap();

    update_status(&ledger, &run_id, "success").unwrap();
    let first = get_run(&ledger, &run_id).unwrap().unwrap();
    update_status(&ledger, &run_id, "success").unwrap();
    let second = get_run(&ledger, &run_id).unwrap().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_lenient_policy_stores_unknown_status() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let run_id = create_run(&ledger, "q").unwrap();

    let ((), logs) = capture_warnings(|| update_status(&ledger, &run_id, "cancelled").unwrap());
    assert!(logs.contains("WARN"), "no warning logged: {logs}");
    assert!(logs.contains("unrecognized run status"), "unexpected log output: {logs}");
    assert!(logs.contains("cancelled"));
    assert!(logs.contains(&run_id));

    let run = get_run(&ledger, &run_id).unwrap().unwrap();
    assert_eq!(run.status, "cancelled");
    assert_eq!(run.status_kind(), None);
}

#[test]
fn test_known_status_logs_no_warning() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let run_id = create_run(&ledger, "q").unwrap();

    let ((), logs) = capture_warnings(|| update_status(&ledger, &run_id, "failed").unwrap());
    assert!(!logs.contains("unrecognized run status"), "unexpected warning: {logs}");
}

#[test]
fn test_strict_policy_rejects_unknown_status() {
    let tmp = tempdir().unwrap();
    let ledger = Ledger::open(LedgerConfig::new(tmp.path()).with_status_policy(StatusPolicy::Strict))
        .unwrap();
    let run_id = create_run(&ledger, "q").unwrap();

    assert!(matches!(
        update_status(&ledger, &run_id, "cancelled"),
        Err(LedgerError::ValidationError(_))
    ));
    update_status(&ledger, &run_id, "failed").unwrap();
    assert_eq!(get_run(&ledger, &run_id).unwrap().unwrap().status, "failed");
}

#[test]
fn test_unguarded_update_allows_leaving_terminal_state() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let run_id = create_run(&ledger, "q").unwrap();

    update_status(&ledger, &run_id, "success").unwrap();
    update_status(&ledger, &run_id, "failed").unwrap();
    assert_eq!(get_run(&ledger, &run_id).unwrap().unwrap().status, "failed");
}

#[test]
fn test_guarded_update_refuses_to_leave_terminal_state() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let run_id = create_run(&ledger, "q").unwrap();

    update_status_guarded(&ledger, &run_id, "failed").unwrap();
    update_status_guarded(&ledger, &run_id, "failed").unwrap();

    let err = update_status_guarded(&ledger, &run_id, "success").unwrap_err();
    match err {
        LedgerError::TerminalRun { run_id: id, status } => {
            assert_eq!(id, run_id);
            assert_eq!(status, "failed");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(get_run(&ledger, &run_id).unwrap().unwrap().status, "failed");
}

#[test]
fn test_get_unknown_run_is_none() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    assert!(get_run(&ledger, "20200101T000000_deadbeef").unwrap().is_none());
}

#[test]
fn test_list_recent_runs_orders_and_caps() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());

    let stamps = [
        "2026-01-01T00:00:03.000000Z",
        "2026-01-01T00:00:01.000000Z",
        "2026-01-01T00:00:04.000000Z",
        "2026-01-01T00:00:02.000000Z",
    ];
    for (i, ts) in stamps.iter().enumerate() {
        let run_id = create_run(&ledger, &format!("q{i}")).unwrap();
        backdate(&ledger, &run_id, ts);
    }

    for k in 0..=6 {
        let runs = list_recent_runs(&ledger, k).unwrap();
        assert_eq!(runs.len(), k.min(stamps.len()));
        for pair in runs.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    let all = list_recent_runs(&ledger, 10).unwrap();
    let queries: Vec<_> = all.iter().map(|r| r.user_query.as_str()).collect();
    assert_eq!(queries, vec!["q2", "q0", "q3", "q1"]);
}

#[test]
fn test_stale_runs_are_listed_and_failed() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());

    let stale = create_run(&ledger, "abandoned").unwrap();
    backdate(&ledger, &stale, "2020-01-01T00:00:00.000000Z");
    let finished = create_run(&ledger, "done").unwrap();
    backdate(&ledger, &finished, "2020-01-01T00:00:00.000000Z");
    update_status(&ledger, &finished, "success").unwrap();
    let fresh = create_run(&ledger, "fresh").unwrap();

    let listed = list_stale_runs(&ledger, Duration::from_secs(3600)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].run_id, stale);

    let failed = fail_stale_runs(&ledger, Duration::from_secs(3600)).unwrap();
    assert_eq!(failed, vec![stale.clone()]);
    assert_eq!(get_run(&ledger, &stale).unwrap().unwrap().status, "failed");
    assert_eq!(get_run(&ledger, &fresh).unwrap().unwrap().status, "running");
    assert!(list_stale_runs(&ledger, Duration::from_secs(3600)).unwrap().is_empty());
}

#[test]
fn test_stale_deadline_beyond_representable_time_matches_nothing() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let old = create_run(&ledger, "abandoned").unwrap();
    backdate(&ledger, &old, "2020-01-01T00:00:00.000000Z");

    for older_than in [
        Duration::from_secs(u64::MAX),
        Duration::from_secs(i64::MAX as u64),
        Duration::MAX,
    ] {
        assert!(list_stale_runs(&ledger, older_than).unwrap().is_empty());
        assert!(fail_stale_runs(&ledger, older_than).unwrap().is_empty());
    }
    assert_eq!(get_run(&ledger, &old).unwrap().unwrap().status, "running");

    let listed = list_stale_runs(&ledger, Duration::from_secs(3600)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].run_id, old);
}

#[test]
fn test_create_run_fails_when_database_is_gone() {
    let tmp = tempdir().unwrap();
    let ledger = open_ledger(tmp.path());
    let conn = db::db_connect(ledger.db_path()).unwrap();
    conn.execute("DROP TABLE runs", []).unwrap();
    drop(conn);

    let err = create_run(&ledger, "q").unwrap_err();
    assert!(err.is_persistence());
    // The artifact was written first and is left behind as an orphan.
    let orphans: Vec<_> = std::fs::read_dir(ledger.runs_root()).unwrap().collect();
    assert_eq!(orphans.len(), 1);
}
