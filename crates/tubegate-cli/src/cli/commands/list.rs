use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::helpers;
use crate::exit_codes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tubegate_core::{ApprovalRecord, Config, EntryStore};

#[derive(Serialize)]
struct ListEntry<'a> {
    #[serde(flatten)]
    record: &'a ApprovalRecord,
    active: bool,
}

pub fn run(args: ListArgs, cfg: &Config) -> anyhow::Result<i32> {
    let store = helpers::open_store(cfg)?;
    let now = Utc::now();

    let records = store.snapshot()?;
    let entries: Vec<ListEntry<'_>> = records
        .iter()
        .map(|record| ListEntry {
            record,
            active: record.is_active(now),
        })
        .filter(|e| e.active || !args.active_only)
        .collect();

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => print_table(&entries),
    }
    Ok(exit_codes::SUCCESS)
}

fn print_table(entries: &[ListEntry<'_>]) {
    if entries.is_empty() {
        println!("no approvals");
        return;
    }
    println!(
        "{:<16} {:<8} {:<21} {:<12} LABEL",
        "IDENTIFIER", "STATUS", "EXPIRES", "REQUESTER"
    );
    for e in entries {
        println!(
            "{:<16} {:<8} {:<21} {:<12} {}",
            e.record.identifier,
            if e.active { "active" } else { "expired" },
            format_expiry(e.record.expires_at),
            e.record.requester.as_deref().unwrap_or("-"),
            e.record.label.as_deref().unwrap_or("-"),
        );
    }
}

fn format_expiry(expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => "never".to_string(),
    }
}
