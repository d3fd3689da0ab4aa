use crate::cli::args::RevokeArgs;
use crate::cli::helpers;
use crate::exit_codes;
use tubegate_core::Config;

pub fn run(args: RevokeArgs, cfg: &Config) -> anyhow::Result<i32> {
    let engine = helpers::open_engine(cfg)?;
    if engine.revoke(&args.identifier)? {
        println!("revoked {}", args.identifier);
    } else {
        println!("{} was not approved", args.identifier);
    }
    Ok(exit_codes::SUCCESS)
}
