use crate::cli::args::GlobalArgs;
use crate::exit_codes;
use anyhow::Context;
use std::path::Path;
use tubegate_core::{
    Config, CyclePhase, MutationError, ReconcileError, Reconciler, SqliteStore, StorageError,
    SweepError,
};

/// File, then environment, then command-line flags.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<Config> {
    let mut cfg = Config::load(&global.config)?;
    cfg.apply_env()?;

    if let Some(db) = &global.database {
        cfg.database = db.clone();
    }
    if let Some(artifact) = &global.artifact {
        cfg.artifact = artifact.clone();
    }
    tracing::debug!(
        database = %cfg.database.display(),
        artifact = %cfg.artifact.display(),
        "configuration loaded"
    );
    Ok(cfg)
}

pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

pub fn open_engine(cfg: &Config) -> anyhow::Result<Reconciler> {
    ensure_parent_dir(&cfg.database)?;
    let engine = cfg
        .build_engine()
        .with_context(|| format!("failed to open store {}", cfg.database.display()))?;
    Ok(engine)
}

/// Read-only store for inspection commands. A missing database is reported
/// instead of created.
pub fn open_store(cfg: &Config) -> anyhow::Result<SqliteStore> {
    if !cfg.database.exists() {
        anyhow::bail!(
            "database {} does not exist (nothing approved yet, or wrong `database` setting)",
            cfg.database.display()
        );
    }
    let store = SqliteStore::open_read_only(&cfg.database)
        .with_context(|| format!("failed to open store {}", cfg.database.display()))?;
    Ok(store)
}

/// Map an error escaping a command to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<MutationError>() {
        return if e.is_partial() {
            exit_codes::PARTIAL
        } else {
            exit_codes::FAILED
        };
    }
    if let Some(e) = err.downcast_ref::<SweepError>() {
        return match e {
            SweepError::Reconcile { purged, .. } if *purged > 0 => exit_codes::PARTIAL,
            SweepError::Reconcile { error, .. } => reconcile_exit_code(error),
            SweepError::Storage(_) => exit_codes::FAILED,
        };
    }
    if let Some(e) = err.downcast_ref::<ReconcileError>() {
        return reconcile_exit_code(e);
    }
    if err.downcast_ref::<StorageError>().is_some() {
        return exit_codes::FAILED;
    }
    exit_codes::INTERNAL_ERROR
}

fn reconcile_exit_code(err: &ReconcileError) -> i32 {
    match err.phase() {
        CyclePhase::Resolving => exit_codes::FAILED,
        _ => exit_codes::INTERNAL_ERROR,
    }
}
