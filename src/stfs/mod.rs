//! LIVE, PIRS and CON containers.
//!
//! These containers wrap a small cluster-addressed filesystem together with
//! signed metadata: localized titles and descriptions, a publisher, two PNG
//! icons and a table of SHA-1 hashes over the payload.
//!
//! ## Architecture
//!
//! - [`structures`]: on-disk records and the per-variant offset table
//! - [`cluster`]: cluster address correction and chunked file reads
//! - [`directory`]: rebuilding the file tree from the flat record table
//! - [`hash`]: SHA-1 verification and the trailing hash table
//! - [`metadata`]: text slots and embedded icons
//! - [`extractor`]: the high-level extraction API
//!
//! ## Layout Overview
//!
//! | Region | Offset |
//! |---|---|
//! | Master hash, entry id, content type | 0x32C, 0x354 |
//! | Titles, descriptions, publisher, filename | 0x410 |
//! | Icon header, icon 1, icon 2 | 0x1710, 0x171A, 0x571A |
//! | Hash table | hash stop (0xA000 / 0xB000) up to the directory |
//! | Directory table | 0xC000 or 0xD000 |
//!
//! File payload is addressed in 4 KiB clusters counted from the start of
//! the directory table, with a hash block interleaved every 170 clusters.
//!
//! ## Limitations
//!
//! - Extraction only; nothing is ever written back
//! - Corrupt payload with consistent lengths is extracted as is

pub mod cluster;
pub mod directory;
pub mod extractor;
pub mod hash;
pub mod metadata;
mod report;
pub mod structures;
pub mod timestamp;

pub use directory::{DirectoryTreeBuilder, Outcome, PathTable, SkipReason, ValidationReport};
pub use extractor::{ContainerExtractor, Extraction, Header};
pub use structures::{ContentKind, DirectoryEntry, Layout, Variant};
