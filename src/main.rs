//! Main entry point for the unstfs CLI application.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use unstfs::stfs::metadata::IconOutcome;
use unstfs::{Cli, Extracted, LocalFileReader, Output, dispatch};

/// Application entry point.
///
/// Parses command-line arguments, opens the input read-only and hands it
/// to the extractor matching its signature.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let reader = Arc::new(LocalFileReader::new(&cli.file)?);
    let output = Output::new(cli.output_dir(), cli.basename(), Arc::new(cli.overwrite_policy()));

    match dispatch::extract(reader, &output).await? {
        Extracted::Container(extraction) => {
            let icons = extraction
                .icons
                .iter()
                .filter(|icon| matches!(icon, IconOutcome::Written { .. }))
                .count();
            match &extraction.tree {
                Some(tree) => info!(
                    "Done: {} files, {} directories, {} icons; {} records skipped, {} failed",
                    tree.files_written,
                    tree.directories_created,
                    icons,
                    tree.skipped().count(),
                    tree.failed().count()
                ),
                None => info!("Done: {} icons, content directory not written", icons),
            }
        }
        Extracted::Audio(audio) => {
            info!("Done: {} bytes of audio", audio.header.size);
        }
        Extracted::Package(package) => {
            info!(
                "Done: {} of {} entries",
                package.written.map_or(0, |w| w.len()),
                package.entries.len()
            );
        }
    }

    Ok(())
}

/// Log to stderr at the level chosen by `-q`/`-v`, unless `RUST_LOG` says otherwise.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.log_level().into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
