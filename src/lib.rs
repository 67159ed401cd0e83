//! # unstfs
//!
//! Extracts Xbox 360 LIVE, PIRS and CON containers, plus the FMIM audio
//! wrapper and XUIZ resource packages.
//!
//! A container holds a small cluster-addressed filesystem along with
//! localized titles and descriptions, a publisher, two PNG icons and a
//! table of SHA-1 hashes. Extraction produces, next to each input:
//!
//! - `<basename>.txt`: metadata, hash verification and a directory listing
//! - `<basename>_1.png`, `<basename>_2.png`: the embedded icons
//! - `<basename>.dir/`: the reconstructed file tree
//!
//! Each artifact is gated separately by an [`OverwritePolicy`] when it
//! already exists. All reads go through [`ReadAt`] at absolute offsets, so
//! the extraction phases run concurrently on one shared reader.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use unstfs::{LocalFileReader, Output, Overwrite, dispatch};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new(Path::new("TU_12345.bin"))?);
//!     let output = Output::new("out", "TU_12345.bin", Arc::new(Overwrite::Never));
//!
//!     let extracted = dispatch::extract(reader, &output).await?;
//!     println!("{:?}", extracted);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod dispatch;
pub mod error;
pub mod fmim;
pub mod io;
pub mod output;
pub mod stfs;
pub mod xuiz;

pub use cli::Cli;
pub use dispatch::{Extracted, Format};
pub use error::ExtractError;
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use output::{ArtifactKind, Output, Overwrite, OverwritePolicy};
pub use stfs::{ContainerExtractor, Extraction};
