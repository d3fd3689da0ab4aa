use crate::cli::helpers;
use crate::exit_codes;
use tubegate_core::Config;

pub fn run(cfg: &Config) -> anyhow::Result<i32> {
    let engine = helpers::open_engine(cfg)?;
    let report = engine.reconcile()?;
    println!(
        "reconciled: {} active of {} stored approval(s) written to {}",
        report.active,
        report.records,
        cfg.artifact.display()
    );
    Ok(exit_codes::SUCCESS)
}
