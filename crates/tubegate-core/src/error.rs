//! Error types for the reconciliation engine.
//!
//! Every error is `Clone + PartialEq`: a coalesced cycle hands the same
//! result to every caller that waited on it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Persistence layer unavailable or corrupt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("corrupt record {identifier}: {message}")]
    Corrupt { identifier: String, message: String },

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Filesystem-level failure to stage or replace the artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to {op} {}: {message}", path.display())]
pub struct ArtifactWriteError {
    pub op: &'static str,
    pub path: PathBuf,
    pub message: String,
}

impl ArtifactWriteError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// The enforcement point rejected or failed to process the reload signal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to start reload command `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("reload command `{program}` exited with {status}: {diagnostic}")]
    Failed {
        program: String,
        status: String,
        diagnostic: String,
    },

    #[error("reload command `{program}` did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },
}

/// Phase of a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Resolving,
    Writing,
    Reloading,
    Done,
    Failed,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Resolving => "resolving",
            CyclePhase::Writing => "writing",
            CyclePhase::Reloading => "reloading",
            CyclePhase::Done => "done",
            CyclePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A reconciliation cycle failed. Wraps the underlying error; the variant
/// determines the phase the cycle had reached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Another process's cycle could not be waited out.
    #[error("reconcile could not start: {0}")]
    Lock(ArtifactWriteError),

    #[error("reconcile failed while resolving: {0}")]
    Storage(StorageError),

    #[error("reconcile failed while writing: {0}")]
    Artifact(ArtifactWriteError),

    #[error("reconcile failed while reloading: {0}")]
    Reload(ReloadError),
}

impl ReconcileError {
    /// Phase the cycle was in when it failed.
    pub fn phase(&self) -> CyclePhase {
        match self {
            ReconcileError::Lock(_) | ReconcileError::Storage(_) => CyclePhase::Resolving,
            ReconcileError::Artifact(_) => CyclePhase::Writing,
            ReconcileError::Reload(_) => CyclePhase::Reloading,
        }
    }
}

/// Failure of an `approve` / `revoke` call.
///
/// `Reconcile` means the store write is durable but the artifact may not
/// reflect it yet; re-running reconciliation fixes it without resubmitting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("ttl {ttl:?} is out of range")]
    InvalidTtl { ttl: Duration },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("store updated for {identifier} but the allow-list was not: {error}")]
    Reconcile {
        identifier: String,
        error: ReconcileError,
    },
}

impl MutationError {
    /// True when the store changed but the artifact may be stale.
    pub fn is_partial(&self) -> bool {
        matches!(self, MutationError::Reconcile { .. })
    }
}

/// Failure of a sweep (purge expired records, then reconcile).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("purged {purged} expired record(s) but the allow-list was not updated: {error}")]
    Reconcile { purged: usize, error: ReconcileError },
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {error}", path.display())]
    Read { path: PathBuf, error: std::io::Error },

    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}
