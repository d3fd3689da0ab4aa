use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "tubegate",
    version,
    about = "Time-limited video approvals published as a proxy allow-list"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, default_value = "tubegate.yaml")]
    pub config: PathBuf,

    /// Override the approval database path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Override the allow-list artifact path
    #[arg(long, global = true)]
    pub artifact: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Approve a video (by ID or share URL) and publish the allow-list
    Approve(ApproveArgs),
    /// Remove an approval and publish the allow-list
    Revoke(RevokeArgs),
    /// List stored approvals, most recent first
    List(ListArgs),
    /// Rebuild the allow-list from the store and reload the proxy
    Reconcile,
    /// Purge expired approvals, then reconcile
    Sweep,
    /// Compare the published allow-list with the active set
    Status(StatusArgs),
    /// Reconcile at startup, then sweep periodically until Ctrl-C
    Serve(ServeArgs),
    /// Print the video ID contained in a share URL
    Extract(ExtractArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ApproveArgs {
    /// Video ID
    #[arg(required_unless_present = "url", conflicts_with = "url")]
    pub identifier: Option<String>,

    /// Share URL to take the video ID from
    #[arg(long)]
    pub url: Option<String>,

    /// Display label (default from config)
    #[arg(long)]
    pub label: Option<String>,

    /// Who asked for it (default from config)
    #[arg(long)]
    pub requester: Option<String>,

    /// Approval lifetime, e.g. `24h`, `90m` (default from config)
    #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "never_expires")]
    pub ttl: Option<Duration>,

    /// Approve without expiry
    #[arg(long)]
    pub never_expires: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RevokeArgs {
    pub identifier: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Only show approvals that are currently active
    #[arg(long)]
    pub active_only: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Override `sweep_interval` from config
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExtractArgs {
    pub url: String,
}
