//! The `<basename>.txt` information file.

use std::fmt::Write;

use super::cluster::CLUSTER_SIZE;
use super::directory::{Outcome, ValidationReport};
use super::extractor::Header;
use super::hash::{HashTableItem, Verification, scan_table};
use super::metadata::Metadata;
use super::structures::{ContentKind, Layout};

const HEX_LINE: usize = 32;

/// Everything the information file says about a container, except the
/// directory listing, which is only known once the tree has been built.
#[derive(Debug, Clone)]
pub struct ContainerReport {
    pub layout: Layout,
    pub header: Header,
    pub sections: Vec<(&'static str, Vec<u8>)>,
    pub master: Verification,
    pub metadata: Metadata,
    pub hash_table: Vec<u8>,
}

fn hex_block(out: &mut String, bytes: &[u8]) {
    for line in bytes.chunks(HEX_LINE) {
        let _ = writeln!(out, "  {}", hex::encode(line));
    }
}

impl ContainerReport {
    pub fn render(&self, tree: Option<&ValidationReport>) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_to(&mut out, tree);
        out
    }

    fn write_to(&self, out: &mut String, tree: Option<&ValidationReport>) -> std::fmt::Result {
        let layout = &self.layout;
        let header = &self.header;

        writeln!(out, "Signature: {}", layout.variant.magic().trim_end())?;
        for (label, bytes) in &self.sections {
            writeln!(out, "\n{} (hex):", label)?;
            hex_block(out, bytes);
        }

        writeln!(out, "\nMaster SHA1 hash: {}", self.master)?;
        writeln!(
            out,
            "Content type 0x{:08x}: {}",
            header.content_type,
            ContentKind::classify(header.content_type)
        )?;
        writeln!(out, "Directory data at (hex) 0x{:x}", layout.directory_start)?;

        for (what, entries) in [
            ("Titles", &self.metadata.titles),
            ("Descriptions", &self.metadata.descriptions),
        ] {
            writeln!(out, "\n{}:", what)?;
            for (lang, text) in entries {
                writeln!(out, "  {}: {}", lang, text)?;
            }
        }
        writeln!(out, "\nPublisher: {}", self.metadata.publisher)?;
        writeln!(out, "Filename: {}", self.metadata.filename)?;
        writeln!(out, "Value: {}", header.icons.value)?;

        if let Some(tree) = tree {
            writeln!(out, "\nDirectory entries:")?;
            for record in &tree.records {
                let entry = &record.entry;
                let kind = if entry.is_directory() { "Directory" } else { "File" };
                let name = entry.name().unwrap_or_default();
                write!(out, "  #{} {} name: {}", record.index, kind, name)?;
                if entry.is_flagged() {
                    write!(out, " (bit 6 of namelen is set)")?;
                }
                match &record.outcome {
                    Outcome::Directory { .. } => writeln!(out)?,
                    Outcome::File {
                        advertised_start, ..
                    } => writeln!(out, ", starting: advertised 0x{:x}", advertised_start)?,
                    Outcome::Skipped(reason) => writeln!(out, ", skipped: {}", reason)?,
                    Outcome::Failed { message } => writeln!(
                        out,
                        ", starting: advertised 0x{:x}, failed: {}",
                        entry.start_cluster as u64 * CLUSTER_SIZE + layout.directory_start,
                        message
                    )?,
                }
            }
            writeln!(
                out,
                "  {} files, {} directories written",
                tree.files_written, tree.directories_created
            )?;
        }

        writeln!(out, "\nHash table:")?;
        for item in scan_table(&self.hash_table) {
            match item {
                HashTableItem::Empty(n) => writeln!(out, "  Empty entries: {}", n)?,
                HashTableItem::Record(record) => writeln!(
                    out,
                    "  Hash (hex): {} entry id: 0x{:x}",
                    hex::encode(record.digest),
                    record.entry_id
                )?,
                HashTableItem::Trailing(rest) => {
                    writeln!(out, "  Trailing data (hex):")?;
                    hex_block(out, &rest);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stfs::directory::{RecordReport, SkipReason};
    use crate::stfs::metadata::IconHeader;
    use crate::stfs::structures::DirectoryEntry;
    use crate::stfs::structures::tests::record;

    fn report(hash_table: Vec<u8>) -> ContainerReport {
        ContainerReport {
            layout: Layout::con(),
            header: Header {
                master_hash: [0; 20],
                entry_id: 9,
                content_type: 0x000B_0000,
                icons: IconHeader {
                    value: 3,
                    lengths: [0, 0],
                },
                directory_clusters: 1,
            },
            sections: vec![("Header", vec![0xAB; 40])],
            master: Verification {
                entry_id: 9,
                expected: [1; 20],
                computed: [1; 20],
            },
            metadata: Metadata {
                titles: vec![("English", "A Game".into())],
                descriptions: vec![],
                publisher: "Someone".into(),
                filename: "game".into(),
            },
            hash_table,
        }
    }

    #[test]
    fn renders_header_and_metadata() {
        let text = report(vec![0; 48]).render(None);
        assert!(text.starts_with("Signature: CON\n"));
        assert!(text.contains(&format!("\n  {}\n  {}\n", "ab".repeat(32), "ab".repeat(8))));
        assert!(text.contains("Master SHA1 hash: SHA1 0x9 ok"));
        assert!(text.contains("Content type 0x000b0000: Theme"));
        assert!(text.contains("Directory data at (hex) 0xc000"));
        assert!(text.contains("Titles:\n  English: A Game\n"));
        assert!(text.contains("Publisher: Someone"));
        assert!(text.contains("Empty entries: 2"));
        assert!(!text.contains("Directory entries:"));
    }

    #[test]
    fn renders_directory_listing() {
        let raw = record("A.TXT", 0x40, 1, 1, 0xFFFF, 10, 0, 0);
        let entry = DirectoryEntry::from_bytes(&raw).unwrap();
        let tree = ValidationReport {
            records: vec![
                RecordReport {
                    index: 0,
                    entry: entry.clone(),
                    outcome: Outcome::File {
                        path: "x/A.TXT".into(),
                        advertised_start: 0xD000,
                    },
                },
                RecordReport {
                    index: 1,
                    entry,
                    outcome: Outcome::Skipped(SkipReason::ZeroStartCluster),
                },
            ],
            files_written: 1,
            directories_created: 0,
        };

        let text = report(vec![]).render(Some(&tree));
        let flagged = "File name: A.TXT (bit 6 of namelen is set)";
        assert!(text.contains(&format!("#0 {}, starting: advertised 0xd000\n", flagged)));
        assert!(text.contains(&format!("#1 {}, skipped: starting cluster", flagged)));
        assert!(text.contains("1 files, 0 directories written"));
    }
}
