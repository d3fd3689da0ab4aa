use crate::cli::args::ApproveArgs;
use crate::cli::helpers;
use crate::exit_codes;
use chrono::SecondsFormat;
use tubegate_core::{ApprovalRequest, Config};

pub fn run(args: ApproveArgs, cfg: &Config) -> anyhow::Result<i32> {
    let identifier = match (args.identifier, &args.url) {
        (Some(id), _) => id,
        (None, Some(url)) => match super::extract::video_id(url) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("error: {e:#}");
                return Ok(exit_codes::FAILED);
            }
        },
        (None, None) => anyhow::bail!("either a video ID or --url is required"),
    };

    let ttl = if args.never_expires {
        None
    } else {
        Some(args.ttl.unwrap_or(cfg.default_ttl))
    };

    let engine = helpers::open_engine(cfg)?;
    let record = engine.approve(&ApprovalRequest {
        identifier,
        label: Some(args.label.unwrap_or_else(|| cfg.default_label.clone())),
        requester: Some(args.requester.unwrap_or_else(|| cfg.default_requester.clone())),
        ttl,
    })?;

    match record.expires_at {
        Some(t) => println!(
            "approved {} until {}",
            record.identifier,
            t.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        None => println!("approved {} (never expires)", record.identifier),
    }
    Ok(exit_codes::SUCCESS)
}
