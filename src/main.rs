//! Main entry point for the dunzip CLI application.
//!
//! Extracts a local ZIP archive (single file or split volumes) next to
//! itself while consuming the archive, so the disk never has to hold the
//! archive and its contents in full at the same time.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use dunzip::{Cli, Extraction, LogProgress};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(cli.log_level())
        .init();

    let extraction = Extraction::prepare(&cli.file, cli.options())
        .with_context(|| format!("cannot extract '{}'", cli.file.display()))?;
    // Sized before anything is consumed.
    let total = extraction.archive().total_size();
    let mut extraction = extraction.with_progress(Arc::new(LogProgress::new(total)));
    extraction
        .run()
        .with_context(|| format!("extraction of '{}' failed", cli.file.display()))?;

    Ok(())
}
