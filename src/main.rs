use anyhow::Result;
use clap::Parser;
use moss_batch::cli;
use tracing::error;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        // Flag and config errors surface before logging is wired up; those
        // still have to reach the terminal.
        if tracing::dispatcher::has_been_set() {
            error!("{:#}", err);
        } else {
            eprintln!("moss-batch: {err:#}");
        }
        std::process::exit(1);
    }
    Ok(())
}
