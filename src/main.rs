#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            // RUST_LOG wins; otherwise our own info lines, which carry the objective.
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mnist_tuner=info")),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
