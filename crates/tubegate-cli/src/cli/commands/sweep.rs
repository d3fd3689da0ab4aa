use crate::cli::helpers;
use crate::exit_codes;
use tubegate_core::Config;

pub fn run(cfg: &Config) -> anyhow::Result<i32> {
    let engine = helpers::open_engine(cfg)?;
    let report = engine.sweep()?;
    println!(
        "purged {} expired approval(s); {} active",
        report.purged, report.cycle.active
    );
    Ok(exit_codes::SUCCESS)
}
