//! cmsmigrate CLI: migrate a markdown content tree into an NDJSON import
//! file for a headless CMS.
//!
//! Runs the whole pipeline or any single stage of it.

mod commands;

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
