use crate::cli::args::ServeArgs;
use crate::cli::helpers;
use crate::exit_codes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tubegate_core::{Config, Reconciler};

pub async fn run(args: ServeArgs, cfg: Config) -> anyhow::Result<i32> {
    let interval = args.interval.unwrap_or(cfg.sweep_interval);
    if interval.is_zero() {
        anyhow::bail!("--interval must be greater than zero");
    }
    let engine = Arc::new(helpers::open_engine(&cfg)?);

    tracing::info!(
        artifact = %cfg.artifact.display(),
        interval = %humantime::format_duration(interval),
        "serving; press Ctrl+C to stop"
    );

    let sweeps = sweep_loop(engine, interval, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    tracing::info!(sweeps, "stopped");
    Ok(exit_codes::SUCCESS)
}

/// Startup cycle, then a sweep every `interval` until `shutdown` resolves.
/// Failures are logged and retried on the next tick. Returns the number of
/// sweeps that ran.
pub async fn sweep_loop<F>(
    engine: Arc<Reconciler>,
    interval: Duration,
    shutdown: F,
) -> anyhow::Result<u64>
where
    F: Future<Output = ()>,
{
    let startup = {
        let engine = engine.clone();
        tokio::task::spawn_blocking(move || engine.startup()).await?
    };
    if let Err(e) = startup {
        tracing::warn!(error = %e, "startup reconcile failed; retrying on next sweep");
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; startup already covered it.
    ticker.tick().await;

    tokio::pin!(shutdown);
    let mut sweeps = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let engine = engine.clone();
        match tokio::task::spawn_blocking(move || engine.sweep()).await? {
            Ok(report) if report.purged > 0 => {
                tracing::info!(
                    purged = report.purged,
                    active = report.cycle.active,
                    "sweep complete"
                );
            }
            Ok(report) => tracing::debug!(active = report.cycle.active, "sweep complete"),
            Err(e) => tracing::warn!(error = %e, "sweep failed; retrying on next tick"),
        }
        sweeps += 1;
    }
    Ok(sweeps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tubegate_core::{read_artifact, ApprovalRequest, FileArtifact, NoReload, SqliteStore};

    #[tokio::test]
    async fn test_sweep_loop_drops_expired_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        let store = Arc::new(SqliteStore::memory().unwrap());
        let engine = Arc::new(Reconciler::new(store, FileArtifact::new(&path), NoReload));

        let approve = |id: &str, ttl: Duration| ApprovalRequest {
            identifier: id.to_string(),
            label: None,
            requester: None,
            ttl: Some(ttl),
        };
        // Approved two seconds ago for one second: already expired.
        engine
            .approve_at(
                &approve("stale", Duration::from_secs(1)),
                Utc::now() - chrono::Duration::seconds(2),
            )
            .unwrap();
        engine
            .approve(&approve("fresh", Duration::from_secs(3600)))
            .unwrap();

        let sweeps = sweep_loop(
            engine.clone(),
            Duration::from_millis(20),
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await
        .unwrap();

        assert!(sweeps >= 1);
        let published: Vec<String> = read_artifact(&path).unwrap().into_iter().collect();
        assert_eq!(published, vec!["fresh"]);
        assert_eq!(engine.list().unwrap().len(), 1);
    }
}
