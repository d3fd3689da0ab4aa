//! Failure and recovery behaviour of the reconciliation engine.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tubegate_core::{
    read_artifact, ApprovalRequest, ArtifactWriteError, ArtifactWriter, CyclePhase, EntryStore,
    FileArtifact, MutationError, NewApproval, NoReload, Reconciler, ReloadError, ReloadTrigger,
    SqliteStore,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn request(id: &str, ttl: Option<Duration>) -> ApprovalRequest {
    ApprovalRequest {
        identifier: id.to_string(),
        label: Some("Untitled".to_string()),
        requester: Some("guest".to_string()),
        ttl,
    }
}

fn ids(path: &std::path::Path) -> Vec<String> {
    read_artifact(path).unwrap().into_iter().collect()
}

/// Fails while `broken` is set.
struct FlakyReload {
    broken: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl ReloadTrigger for FlakyReload {
    fn reload(&self) -> Result<(), ReloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(ReloadError::Failed {
                program: "systemctl".to_string(),
                status: "exit status: 1".to_string(),
                diagnostic: "Job for squid.service failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Refuses writes while `broken` is set.
struct FlakyArtifact {
    inner: FileArtifact,
    broken: Arc<AtomicBool>,
}

impl ArtifactWriter for FlakyArtifact {
    fn write(&self, active: &BTreeSet<String>) -> Result<(), ArtifactWriteError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ArtifactWriteError {
                op: "replace artifact",
                path: PathBuf::from("whitelist.txt"),
                message: "No space left on device".to_string(),
            });
        }
        self.inner.write(active)
    }
}

// ==================== A) Day-pass lifecycle ====================

#[test]
fn test_day_pass_published_then_dropped_after_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whitelist.txt");
    let engine = Reconciler::new(
        Arc::new(SqliteStore::memory().unwrap()),
        FileArtifact::new(&path),
        NoReload,
    );

    engine.approve_at(&request("abc123", Some(DAY)), t0()).unwrap();
    assert_eq!(ids(&path), vec!["abc123"]);

    engine.reconcile_at(t0() + ChronoDuration::hours(23)).unwrap();
    assert_eq!(ids(&path), vec!["abc123"]);

    engine.reconcile_at(t0() + ChronoDuration::hours(25)).unwrap();
    assert!(ids(&path).is_empty());

    // Expired records stay in the store until swept.
    assert_eq!(engine.list().unwrap().len(), 1);
}

#[test]
fn test_reapproval_extends_day_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whitelist.txt");
    let engine = Reconciler::new(
        Arc::new(SqliteStore::memory().unwrap()),
        FileArtifact::new(&path),
        NoReload,
    );

    engine.approve_at(&request("abc123", Some(DAY)), t0()).unwrap();
    let later = t0() + ChronoDuration::hours(20);
    let rec = engine.approve_at(&request("abc123", Some(DAY)), later).unwrap();

    assert_eq!(rec.expires_at, Some(later + ChronoDuration::hours(24)));
    assert_eq!(rec.created_at, t0());

    engine.reconcile_at(t0() + ChronoDuration::hours(30)).unwrap();
    assert_eq!(ids(&path), vec!["abc123"]);
    assert_eq!(engine.list().unwrap().len(), 1);
}

// ==================== B) Startup convergence ====================

#[test]
fn test_startup_rebuilds_artifact_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tubegate.db");
    let path = dir.path().join("whitelist.txt");

    // Simulates a crash after the store write but before publishing.
    {
        let store = SqliteStore::open(&db).unwrap();
        store
            .upsert(
                &NewApproval {
                    identifier: "orphan".to_string(),
                    label: None,
                    requester: None,
                    expires_at: None,
                },
                t0(),
            )
            .unwrap();
    }
    std::fs::write(&path, "stale\n").unwrap();

    let engine = Reconciler::new(
        Arc::new(SqliteStore::open(&db).unwrap()),
        FileArtifact::new(&path),
        NoReload,
    );
    let report = engine.startup().unwrap();

    assert_eq!(report.cycle, 1);
    assert_eq!(ids(&path), vec!["orphan"]);
}

// ==================== C) Self-healing ====================

#[test]
fn test_reload_failure_heals_on_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whitelist.txt");
    let broken = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = Reconciler::new(
        Arc::new(SqliteStore::memory().unwrap()),
        FileArtifact::new(&path),
        FlakyReload {
            broken: broken.clone(),
            calls: calls.clone(),
        },
    );

    let err = engine.approve_at(&request("abc123", Some(DAY)), t0()).unwrap_err();
    assert!(err.is_partial());
    let last = engine.last_cycle().unwrap();
    assert_eq!(last.phase, CyclePhase::Failed);
    assert_eq!(last.error.unwrap().phase(), CyclePhase::Reloading);

    broken.store(false, Ordering::SeqCst);
    engine.reconcile_at(t0()).unwrap();

    assert_eq!(ids(&path), vec!["abc123"]);
    assert_eq!(engine.last_cycle().unwrap().phase, CyclePhase::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_artifact_failure_keeps_previous_file_then_heals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whitelist.txt");
    let broken = Arc::new(AtomicBool::new(false));
    let engine = Reconciler::new(
        Arc::new(SqliteStore::memory().unwrap()),
        FlakyArtifact {
            inner: FileArtifact::new(&path),
            broken: broken.clone(),
        },
        NoReload,
    );

    engine.approve_at(&request("first", None), t0()).unwrap();

    broken.store(true, Ordering::SeqCst);
    let err = engine.approve_at(&request("second", None), t0()).unwrap_err();
    match &err {
        MutationError::Reconcile { identifier, error } => {
            assert_eq!(identifier, "second");
            assert_eq!(error.phase(), CyclePhase::Writing);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ids(&path), vec!["first"]);

    broken.store(false, Ordering::SeqCst);
    engine.reconcile_at(t0()).unwrap();
    assert_eq!(ids(&path), vec!["first", "second"]);
}

// ==================== D) Artifact fidelity ====================

#[test]
fn test_artifact_matches_active_set_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whitelist.txt");
    let engine = Reconciler::new(
        Arc::new(SqliteStore::memory().unwrap()),
        FileArtifact::new(&path),
        NoReload,
    );

    engine.approve_at(&request("b2", None), t0()).unwrap();
    engine.approve_at(&request("a1", Some(DAY)), t0()).unwrap();
    engine.approve_at(&request("b2", Some(DAY)), t0()).unwrap();
    engine
        .approve_at(&request("gone", Some(Duration::from_secs(1))), t0())
        .unwrap();

    engine.reconcile_at(t0() + ChronoDuration::minutes(1)).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "a1\nb2\n");
}
