//! Reconciliation engine.
//!
//! Owns the allow-list artifact and the enforcement point's reload. Every
//! mutation goes through [`Reconciler::approve`] / [`Reconciler::revoke`],
//! which write the store and then run a full cycle:
//!
//! ```text
//! Idle ─▶ Resolving ─▶ Writing ─▶ Reloading ─▶ Done
//!             │            │           │
//!             └────────────┴───────────┴──────▶ Failed
//! ```
//!
//! Cycles never overlap. Requests that arrive while a cycle is running wait
//! for it and are then served together by a single fresh cycle, so at most
//! one cycle is ever pending. Engines in other processes are kept out by an
//! optional [`CycleLock`] held from snapshot to reload.

use crate::artifact::ArtifactWriter;
use crate::error::{CyclePhase, MutationError, ReconcileError, StorageError, SweepError};
use crate::lock::CycleLock;
use crate::reload::ReloadTrigger;
use crate::resolver::resolve;
use crate::store::{ApprovalRecord, EntryStore, NewApproval};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Monotonic cycle number within this engine.
    pub cycle: u64,
    /// Evaluation time used to resolve the active set.
    pub started_at: DateTime<Utc>,
    /// Identifiers written to the artifact.
    pub active: usize,
    /// Records in the snapshot, expired ones included.
    pub records: usize,
}

/// Summary of the most recently finished cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCycle {
    pub cycle: u64,
    /// `Done` or `Failed`; on failure `error` names the phase it failed in.
    pub phase: CyclePhase,
    pub finished_at: DateTime<Utc>,
    pub error: Option<ReconcileError>,
}

/// Input to [`Reconciler::approve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub identifier: String,
    pub label: Option<String>,
    pub requester: Option<String>,
    /// `None` approves without expiry.
    pub ttl: Option<Duration>,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub purged: usize,
    pub cycle: CycleReport,
}

type Outcome = Result<CycleReport, ReconcileError>;

#[derive(Default)]
struct GateState {
    /// Reconcile requests issued so far; a request's ticket is its index.
    issued: u64,
    running: bool,
    phase: CyclePhase,
    cycles: u64,
    last: Option<Finished>,
}

struct Finished {
    cycle: u64,
    /// Highest ticket this cycle satisfies (all issued before it started).
    covers: u64,
    outcome: Outcome,
    finished_at: DateTime<Utc>,
}

#[derive(Default)]
struct CycleGate {
    state: Mutex<GateState>,
    done: Condvar,
}

impl CycleGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the thread running a cycle. Dropping it releases the gate even
/// if the cycle panicked.
struct RunningCycle<'a> {
    gate: &'a CycleGate,
    cycle: u64,
    covers: u64,
}

impl RunningCycle<'_> {
    fn finish(self, outcome: &Outcome) {
        let mut state = self.gate.lock();
        state.last = Some(Finished {
            cycle: self.cycle,
            covers: self.covers,
            outcome: outcome.clone(),
            finished_at: Utc::now(),
        });
    }
}

impl Drop for RunningCycle<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.running = false;
        state.phase = CyclePhase::Idle;
        drop(state);
        self.gate.done.notify_all();
    }
}

/// Single owner of the allow-list artifact.
pub struct Reconciler {
    store: Arc<dyn EntryStore>,
    artifact: Box<dyn ArtifactWriter>,
    reload: Box<dyn ReloadTrigger>,
    lock: Option<CycleLock>,
    gate: CycleGate,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn EntryStore>,
        artifact: impl ArtifactWriter + 'static,
        reload: impl ReloadTrigger + 'static,
    ) -> Self {
        Self {
            store,
            artifact: Box::new(artifact),
            reload: Box::new(reload),
            lock: None,
            gate: CycleGate::default(),
        }
    }

    /// Also exclude cycles of other engines, in any process, that use the
    /// same lock file.
    pub fn with_cycle_lock(mut self, lock: CycleLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &dyn EntryStore {
        self.store.as_ref()
    }

    /// Run the startup cycle. Call before accepting mutations so the
    /// artifact reflects the store even if the last process died mid-way.
    pub fn startup(&self) -> Result<CycleReport, ReconcileError> {
        let report = self.reconcile()?;
        tracing::info!(
            cycle = report.cycle,
            active = report.active,
            "startup reconcile complete"
        );
        Ok(report)
    }

    pub fn reconcile(&self) -> Result<CycleReport, ReconcileError> {
        self.reconcile_at(Utc::now())
    }

    /// Like [`Reconciler::reconcile`] but with an explicit evaluation time.
    ///
    /// If another cycle is running, waits for it and then for a cycle that
    /// started after this call, whose result is returned. When several
    /// callers wait together, only one of them runs that cycle; the others
    /// receive its result.
    pub fn reconcile_at(&self, now: DateTime<Utc>) -> Result<CycleReport, ReconcileError> {
        let mut state = self.gate.lock();
        state.issued += 1;
        let ticket = state.issued;

        loop {
            if let Some(done) = &state.last {
                if done.covers >= ticket {
                    return done.outcome.clone();
                }
            }

            if !state.running {
                state.running = true;
                state.cycles += 1;
                let running = RunningCycle {
                    gate: &self.gate,
                    cycle: state.cycles,
                    covers: state.issued,
                };
                drop(state);

                let outcome = self.run_cycle(running.cycle, now);
                running.finish(&outcome);
                return outcome;
            }

            state = self
                .gate
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Most recently finished cycle, if any.
    pub fn last_cycle(&self) -> Option<LastCycle> {
        let state = self.gate.lock();
        let done = state.last.as_ref()?;
        let (phase, error) = match &done.outcome {
            Ok(_) => (CyclePhase::Done, None),
            Err(e) => (CyclePhase::Failed, Some(e.clone())),
        };
        Some(LastCycle {
            cycle: done.cycle,
            phase,
            finished_at: done.finished_at,
            error,
        })
    }

    /// Phase of the cycle currently running, or `Idle`.
    pub fn phase(&self) -> CyclePhase {
        self.gate.lock().phase
    }

    fn enter(&self, phase: CyclePhase) {
        self.gate.lock().phase = phase;
    }

    fn run_cycle(&self, cycle: u64, now: DateTime<Utc>) -> Outcome {
        let span = tracing::info_span!("reconcile", cycle);
        let _enter = span.enter();

        let result = self.run_phases(cycle, now);
        match &result {
            Ok(report) => tracing::info!(
                active = report.active,
                records = report.records,
                "allow-list reconciled"
            ),
            Err(e) => tracing::error!(phase = %e.phase(), error = %e, "reconcile cycle failed"),
        }
        result
    }

    fn run_phases(&self, cycle: u64, now: DateTime<Utc>) -> Outcome {
        // Held until the reload returns.
        let _held = self
            .lock
            .as_ref()
            .map(CycleLock::acquire)
            .transpose()
            .map_err(ReconcileError::Lock)?;

        self.enter(CyclePhase::Resolving);
        tracing::debug!(phase = %CyclePhase::Resolving, "taking snapshot");
        let records = self.store.snapshot().map_err(ReconcileError::Storage)?;
        let active = resolve(&records, now);

        self.enter(CyclePhase::Writing);
        tracing::debug!(phase = %CyclePhase::Writing, active = active.len(), "writing artifact");
        self.artifact
            .write(&active)
            .map_err(ReconcileError::Artifact)?;

        self.enter(CyclePhase::Reloading);
        tracing::debug!(phase = %CyclePhase::Reloading, "signalling enforcement point");
        self.reload.reload().map_err(ReconcileError::Reload)?;

        Ok(CycleReport {
            cycle,
            started_at: now,
            active: active.len(),
            records: records.len(),
        })
    }

    pub fn approve(&self, req: &ApprovalRequest) -> Result<ApprovalRecord, MutationError> {
        self.approve_at(req, Utc::now())
    }

    /// Store (or replace) an approval, then reconcile.
    ///
    /// A reconcile failure is returned as [`MutationError::Reconcile`]; the
    /// stored record is kept and the next successful cycle publishes it.
    pub fn approve_at(
        &self,
        req: &ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRecord, MutationError> {
        validate_identifier(&req.identifier)?;
        let expires_at = req.ttl.map(|ttl| expiry(now, ttl)).transpose()?;

        let record = self.store.upsert(
            &NewApproval {
                identifier: req.identifier.clone(),
                label: req.label.clone(),
                requester: req.requester.clone(),
                expires_at,
            },
            now,
        )?;
        tracing::info!(
            identifier = %record.identifier,
            expires_at = ?record.expires_at,
            requester = ?record.requester,
            "approval stored"
        );

        self.reconcile_at(now)
            .map_err(|error| MutationError::Reconcile {
                identifier: record.identifier.clone(),
                error,
            })?;
        Ok(record)
    }

    pub fn revoke(&self, identifier: &str) -> Result<bool, MutationError> {
        self.revoke_at(identifier, Utc::now())
    }

    /// Remove an approval, then reconcile. Returns whether a record existed.
    /// Reconciles even when nothing was removed.
    pub fn revoke_at(&self, identifier: &str, now: DateTime<Utc>) -> Result<bool, MutationError> {
        let removed = self.store.remove(identifier)?;
        tracing::info!(identifier, removed, "approval revoked");

        self.reconcile_at(now)
            .map_err(|error| MutationError::Reconcile {
                identifier: identifier.to_string(),
                error,
            })?;
        Ok(removed)
    }

    pub fn sweep(&self) -> Result<SweepReport, SweepError> {
        self.sweep_at(Utc::now())
    }

    /// Purge expired records, then reconcile.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let purged = self.store.purge_expired(now)?;
        if purged > 0 {
            tracing::info!(purged, "expired approvals purged");
        }

        let cycle = self
            .reconcile_at(now)
            .map_err(|error| SweepError::Reconcile { purged, error })?;
        Ok(SweepReport { purged, cycle })
    }

    /// Store records, most recently created first.
    pub fn list(&self) -> Result<Vec<ApprovalRecord>, StorageError> {
        self.store.snapshot()
    }
}

/// Identifiers end up one per line in the artifact, so anything that could
/// split or hide a line is rejected.
pub fn validate_identifier(identifier: &str) -> Result<(), MutationError> {
    let reason = if identifier.is_empty() {
        Some("must not be empty")
    } else if identifier.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else if identifier.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(MutationError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Latest storable year. Stored timestamps are fixed-width RFC 3339 and
/// compared as text, which only holds for four-digit years.
const MAX_EXPIRY_YEAR: i32 = 9999;

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, MutationError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .filter(|t| t.year() <= MAX_EXPIRY_YEAR)
        .ok_or(MutationError::InvalidTtl { ttl })
}
