//! Kiln CLI: on-demand and ahead-of-time front-end asset builds.
//!
//! Serves content roots over HTTP, compiling sources through external
//! toolchains per request, or exports whole trees as static output.

mod commands;
mod server;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
