//! Entrypoint for the `spheronet` CLI

use clap::Parser;
mod cli;
mod commands;
mod error;
mod logging;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()?;
    Ok(())
}
