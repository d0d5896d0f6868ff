//! CLI for replaying worker events locally

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

pub mod error;
pub mod run;
pub mod state;

pub use error::CliError;
pub use run::RunArgs;
pub use state::StateArgs;

/// Sync extractor CLI
#[derive(Parser, Debug)]
#[command(name = "sync-extractor")]
#[command(about = "Extract project management data into local repositories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one worker invocation
    Run(RunArgs),

    /// Inspect or reset a checkpoint file
    State(StateArgs),
}
