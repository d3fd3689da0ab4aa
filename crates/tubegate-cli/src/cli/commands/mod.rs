use super::args::{Cli, Command};
use super::helpers;

pub mod approve;
pub mod extract;
pub mod list;
pub mod reconcile;
pub mod revoke;
pub mod serve;
pub mod status;
pub mod sweep;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let global = cli.global;
    let config = || helpers::load_config(&global);

    match cli.cmd {
        Command::Approve(args) => approve::run(args, &config()?),
        Command::Revoke(args) => revoke::run(args, &config()?),
        Command::List(args) => list::run(args, &config()?),
        Command::Reconcile => reconcile::run(&config()?),
        Command::Sweep => sweep::run(&config()?),
        Command::Status(args) => status::run(args, &config()?),
        Command::Serve(args) => serve::run(args, config()?).await,
        Command::Extract(args) => Ok(extract::run(&args)),
    }
}
