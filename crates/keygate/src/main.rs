//! keygate - ssh key access gateway

use clap::Parser;
use color_eyre::eyre::Result;
use keygate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(cmd) => cmd.run().await,
    }
}
