use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::helpers;
use crate::exit_codes;
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use tubegate_core::{read_artifact, resolve, Config, EntryStore};

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Drift {
    artifact: String,
    active: usize,
    published: usize,
    /// Active but not in the artifact.
    missing: Vec<String>,
    /// In the artifact but not active (expired or revoked).
    extra: Vec<String>,
}

impl Drift {
    fn compare(artifact: String, active: &BTreeSet<String>, published: &BTreeSet<String>) -> Self {
        Self {
            artifact,
            active: active.len(),
            published: published.len(),
            missing: active.difference(published).cloned().collect(),
            extra: published.difference(active).cloned().collect(),
        }
    }

    fn in_sync(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

pub fn run(args: StatusArgs, cfg: &Config) -> anyhow::Result<i32> {
    let store = helpers::open_store(cfg)?;
    let active = resolve(&store.snapshot()?, Utc::now());
    let published = read_artifact(&cfg.artifact)
        .with_context(|| format!("failed to read {}", cfg.artifact.display()))?;

    let drift = Drift::compare(cfg.artifact.display().to_string(), &active, &published);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&drift)?),
        OutputFormat::Text => {
            println!("artifact:  {}", drift.artifact);
            println!("active:    {}", drift.active);
            println!("published: {}", drift.published);
            for id in &drift.missing {
                println!("  missing {id}");
            }
            for id in &drift.extra {
                println!("  extra   {id}");
            }
            if drift.in_sync() {
                println!("in sync");
            } else {
                println!("drift detected; run `tubegate reconcile`");
            }
        }
    }

    Ok(if drift.in_sync() {
        exit_codes::SUCCESS
    } else {
        exit_codes::DRIFT
    })
}
