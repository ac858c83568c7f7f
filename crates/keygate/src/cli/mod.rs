//! cli subcommands for keygate.

pub mod serve;

pub use serve::ServeCommand;

use clap::{Parser, Subcommand};

/// keygate - ssh key access gateway
#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(about = "Grant and revoke SSH key access across a server fleet", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// top-level commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// run the http api
    Serve(ServeCommand),
}
