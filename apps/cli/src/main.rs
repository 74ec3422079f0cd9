//! nsxconv CLI: convert note-station `.nsx` exports into Org or Markdown files.
//!
//! Each notebook becomes a directory, each note a document, and attachments
//! are copied next to the notes that reference them.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
