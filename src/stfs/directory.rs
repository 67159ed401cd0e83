//! Rebuilding the directory tree from the flat record table.
//!
//! Records appear in table order and point at their parent by path index,
//! which is the table position of the parent's own directory record
//! (0xFFFF for the root). A parent therefore always has to be seen before
//! its children; an unknown index skips the record instead of guessing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::cluster::{BlockReader, CLUSTER_SIZE};
use super::structures::DirectoryEntry;
use super::timestamp::PackedTime;
use crate::io::ReadAt;
use crate::output::Output;

/// Path index of the root directory.
pub const ROOT_INDEX: u16 = 0xFFFF;

/// Why a directory record was not materialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("filename length ({0}) out of range")]
    NameLength(usize),

    #[error("unsafe filename {0:?}")]
    UnsafeName(String),

    #[error("cluster sizes don't match ({first} != {second})")]
    ClusterCountMismatch { first: u32, second: u32 },

    #[error("starting cluster must be 1 or greater")]
    ZeroStartCluster,

    #[error("file length ({length}) is greater than the size in clusters ({clusters})")]
    LengthExceedsClusters { length: u32, clusters: u32 },

    #[error("path index 0x{0:04x} does not name a known directory")]
    UnknownPathIndex(u16),
}

/// Append-only mapping from path index to the accumulated `a/b/` path.
#[derive(Debug, Clone)]
pub struct PathTable {
    paths: HashMap<u32, String>,
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTable {
    pub fn new() -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT_INDEX as u32, String::new());
        Self { paths }
    }

    pub fn resolve(&self, index: u16) -> Result<&str, SkipReason> {
        self.paths
            .get(&(index as u32))
            .map(String::as_str)
            .ok_or(SkipReason::UnknownPathIndex(index))
    }

    /// Register directory `name` found at table position `index` under
    /// `parent`. Existing entries are never replaced.
    pub fn register(&mut self, index: usize, parent: &str, name: &str) -> &str {
        self.paths
            .entry(index as u32)
            .or_insert_with(|| format!("{}{}/", parent, name))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Join a `a/b/` relative path onto `root` component by component.
fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|c| !c.is_empty())
        .fold(root.to_path_buf(), |path, c| path.join(c))
}

/// What became of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Directory { path: PathBuf },
    File { path: PathBuf, advertised_start: u64 },
    Skipped(SkipReason),
    /// The record was valid but its contents could not be read or written.
    Failed { message: String },
}

/// One scanned record and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub index: usize,
    pub entry: DirectoryEntry,
    pub outcome: Outcome,
}

/// Result of one directory scan, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub records: Vec<RecordReport>,
    pub files_written: usize,
    pub directories_created: usize,
}

impl ValidationReport {
    pub fn skipped(&self) -> impl Iterator<Item = (&RecordReport, &SkipReason)> {
        self.records.iter().filter_map(|r| match &r.outcome {
            Outcome::Skipped(reason) => Some((r, reason)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordReport> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
    }
}

/// Materializes a directory table beneath a root directory.
pub struct DirectoryTreeBuilder<'a, R: ReadAt> {
    blocks: BlockReader<R>,
    directory_start: u64,
    output: &'a Output,
    root: PathBuf,
}

impl<'a, R: ReadAt> DirectoryTreeBuilder<'a, R> {
    pub fn new(
        reader: Arc<R>,
        block_step: u64,
        directory_start: u64,
        output: &'a Output,
        root: PathBuf,
    ) -> Self {
        Self {
            blocks: BlockReader::new(reader, block_step),
            directory_start,
            output,
            root,
        }
    }

    /// Scan `blob` record by record, stopping at the end sentinel or after
    /// `record_limit` records, and write what the records describe.
    pub async fn build(&self, blob: &[u8], record_limit: usize) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut paths = PathTable::new();
        let mut current: (u16, PathBuf) = (ROOT_INDEX, self.root.clone());
        let mut dir_times = Vec::new();

        if let Err(e) = self.output.create_dir(&self.root).await {
            warn!("Cannot create {}: {}", self.root.display(), e);
            return report;
        }

        for (index, raw) in blob.chunks_exact(DirectoryEntry::SIZE).take(record_limit).enumerate() {
            let Ok(entry) = DirectoryEntry::from_bytes(raw) else {
                break;
            };
            if entry.is_end() {
                break;
            }

            let outcome = match entry.validate() {
                Err(reason) => Outcome::Skipped(reason),
                Ok(name) => match paths.resolve(entry.path_index) {
                    Err(reason) => Outcome::Skipped(reason),
                    Ok(parent) => {
                        if entry.path_index != current.0 {
                            current = (entry.path_index, join_relative(&self.root, parent));
                        }
                        let target = current.1.join(&name);

                        if entry.is_directory() {
                            let parent = parent.to_string();
                            paths.register(index, &parent, &name);
                            self.make_directory(&entry, target, &mut report, &mut dir_times)
                                .await
                        } else {
                            self.write_file(&entry, target, &mut report).await
                        }
                    }
                },
            };

            if let Outcome::Skipped(reason) = &outcome {
                warn!("Record {}: {}, skipping.", index, reason);
            }
            report.records.push(RecordReport {
                index,
                entry,
                outcome,
            });
        }

        // children have been written, so these stick
        for (path, entry) in dir_times.iter().rev() {
            apply_times(path, entry);
        }

        report
    }

    async fn make_directory(
        &self,
        entry: &DirectoryEntry,
        path: PathBuf,
        report: &mut ValidationReport,
        dir_times: &mut Vec<(PathBuf, DirectoryEntry)>,
    ) -> Outcome {
        match self.output.create_dir(&path).await {
            Ok(()) => {
                report.directories_created += 1;
                dir_times.push((path.clone(), entry.clone()));
                Outcome::Directory { path }
            }
            Err(e) => {
                warn!("Cannot create directory {}: {}", path.display(), e);
                Outcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn write_file(
        &self,
        entry: &DirectoryEntry,
        path: PathBuf,
        report: &mut ValidationReport,
    ) -> Outcome {
        let advertised_start = entry.start_cluster as u64 * CLUSTER_SIZE + self.directory_start;

        let written = async {
            let data = self
                .blocks
                .read_file(advertised_start, entry.start_cluster, entry.file_length)
                .await?;
            self.output.write_file(&path, &data).await
        }
        .await;

        match written {
            Ok(()) => {
                info!("  extracting: {}", path.display());
                apply_times(&path, entry);
                report.files_written += 1;
                Outcome::File {
                    path,
                    advertised_start,
                }
            }
            Err(e) => {
                warn!("Cannot extract {}: {:#}", path.display(), e);
                Outcome::Failed {
                    message: format!("{:#}", e),
                }
            }
        }
    }
}

/// Set access and modification times from the record, when both decode.
fn apply_times(path: &Path, entry: &DirectoryEntry) {
    let access = PackedTime::decode(entry.access_time).to_file_time();
    let modify = PackedTime::decode(entry.modify_time).to_file_time();
    let (Some(access), Some(modify)) = (access, modify) else {
        return;
    };
    if let Err(e) = filetime::set_file_times(path, access, modify) {
        debug!("Cannot set times on {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::output::{ArtifactKind, OverwritePolicy};
    use crate::stfs::structures::tests::record;
    use filetime::FileTime;
    use tempfile::TempDir;

    const DIR_START: u64 = 0xC000;
    // 2012-06-15 10:20:30
    const STAMP: u32 = ((32 << 9 | 6 << 5 | 15) << 16) | (10 << 11 | 20 << 5 | 15);

    fn output(dir: &TempDir) -> Output {
        let policy: Arc<dyn OverwritePolicy> = Arc::new(|_: &Path, _: ArtifactKind| true);
        Output::new(dir.path(), "test", policy)
    }

    /// A container image with `payload` placed at each given cluster.
    fn image(clusters: &[(u32, &[u8])]) -> Vec<u8> {
        let mut data = vec![0u8; (DIR_START + 8 * CLUSTER_SIZE) as usize];
        for &(cluster, payload) in clusters {
            let at = (DIR_START + cluster as u64 * CLUSTER_SIZE) as usize;
            data[at..at + payload.len()].copy_from_slice(payload);
        }
        data
    }

    fn blob(records: &[[u8; 64]]) -> Vec<u8> {
        let mut blob: Vec<u8> = records.iter().flatten().copied().collect();
        blob.resize(CLUSTER_SIZE as usize, 0);
        blob
    }

    #[test]
    fn path_table_is_append_only() {
        let mut table = PathTable::new();
        assert_eq!(table.resolve(ROOT_INDEX), Ok(""));
        assert_eq!(table.resolve(0), Err(SkipReason::UnknownPathIndex(0)));

        assert_eq!(table.register(0, "", "a"), "a/");
        assert_eq!(table.register(3, "a/", "b"), "a/b/");
        assert_eq!(table.register(3, "", "other"), "a/b/");
        assert_eq!(table.register(ROOT_INDEX as usize, "", "x"), "");
        assert_eq!(table.len(), 3);
    }

    #[tokio::test]
    async fn nested_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let content = b"nested file content";
        let reader = Arc::new(MemoryReader::new(image(&[(2, content)])));

        let records = blob(&[
            record("GAME", 0x80, 0, 0, ROOT_INDEX, 0, STAMP, STAMP),
            record("SAVES", 0x80, 0, 0, 0, 0, STAMP, STAMP),
            record("SLOT1.BIN", 0, 1, 2, 1, content.len() as u32, STAMP, STAMP),
        ]);
        let root = out.tree_root();
        let builder = DirectoryTreeBuilder::new(reader, 0x2000, DIR_START, &out, root.clone());
        let report = builder.build(&records, 64).await;

        let file = root.join("GAME").join("SAVES").join("SLOT1.BIN");
        assert_eq!(std::fs::read(&file).unwrap(), content);
        assert_eq!(report.directories_created, 2);
        assert_eq!(report.files_written, 1);
        assert_eq!(report.records.len(), 3);
        assert_eq!(
            report.records[2].outcome,
            Outcome::File {
                path: file.clone(),
                advertised_start: DIR_START + 2 * CLUSTER_SIZE,
            }
        );

        let expected = PackedTime::decode(STAMP).to_file_time().unwrap();
        let meta = std::fs::metadata(&file).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), expected);
        let meta = std::fs::metadata(root.join("GAME")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), expected);
    }

    #[tokio::test]
    async fn invalid_records_are_skipped() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let reader = Arc::new(MemoryReader::new(image(&[(1, b"good")])));

        let mut mismatch = record("BAD1", 0, 1, 1, ROOT_INDEX, 4, 0, 0);
        mismatch[44] = 2;
        let records = blob(&[
            mismatch,
            record("BAD2", 0, 1, 0, ROOT_INDEX, 4, 0, 0),
            record("BAD3", 0, 1, 1, 7, 4, 0, 0),
            record("GOOD", 0, 1, 1, ROOT_INDEX, 4, 0, 0),
        ]);
        let root = out.tree_root();
        let builder = DirectoryTreeBuilder::new(reader, 0x2000, DIR_START, &out, root.clone());
        let report = builder.build(&records, 64).await;

        let reasons: Vec<_> = report
            .skipped()
            .map(|(r, reason)| (r.index, reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (0, SkipReason::ClusterCountMismatch { first: 1, second: 2 }),
                (1, SkipReason::ZeroStartCluster),
                (2, SkipReason::UnknownPathIndex(7)),
            ]
        );
        assert_eq!(report.files_written, 1);
        assert_eq!(std::fs::read(root.join("GOOD")).unwrap(), b"good");
        assert!(!root.join("BAD1").exists());
    }

    #[tokio::test]
    async fn scan_stops_at_sentinel_and_limit() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let reader = Arc::new(MemoryReader::new(image(&[(1, b"x")])));

        let mut records = vec![
            record("A", 0, 1, 1, ROOT_INDEX, 1, 0, 0),
            record("B", 0, 1, 1, ROOT_INDEX, 1, 0, 0),
        ];
        records.push([0u8; 64]);
        records.push(record("C", 0, 1, 1, ROOT_INDEX, 1, 0, 0));
        let records = blob(&records);

        let root = out.tree_root();
        let builder =
            DirectoryTreeBuilder::new(reader.clone(), 0x2000, DIR_START, &out, root.clone());
        let report = builder.build(&records, 64).await;
        assert_eq!(report.records.len(), 2);
        assert!(!root.join("C").exists());

        let limited = builder.build(&records, 1).await;
        assert_eq!(limited.records.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_file_does_not_stop_the_scan() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let reader = Arc::new(MemoryReader::new(image(&[(1, b"ok")])));

        let records = blob(&[
            record("HUGE", 0, 0x100, 0x80, ROOT_INDEX, 0x10_0000, 0, 0),
            record("SMALL", 0, 1, 1, ROOT_INDEX, 2, 0, 0),
        ]);
        let root = out.tree_root();
        let builder = DirectoryTreeBuilder::new(reader, 0x2000, DIR_START, &out, root.clone());
        let report = builder.build(&records, 64).await;

        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.files_written, 1);
        assert!(!root.join("HUGE").exists());
        assert_eq!(std::fs::read(root.join("SMALL")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn maximal_declared_length_fails_only_that_file() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let reader = Arc::new(MemoryReader::new(image(&[(1, b"ok")])));

        let records = blob(&[
            record("HUGE", 0, 0xFF_FFFF, 1, ROOT_INDEX, u32::MAX, 0, 0),
            record("SMALL", 0, 1, 1, ROOT_INDEX, 2, 0, 0),
        ]);
        let root = out.tree_root();
        let builder = DirectoryTreeBuilder::new(reader, 0x2000, DIR_START, &out, root.clone());
        let report = builder.build(&records, 64).await;

        assert!(matches!(report.records[0].outcome, Outcome::Failed { .. }));
        assert_eq!(report.files_written, 1);
        assert!(!root.join("HUGE").exists());
        assert_eq!(std::fs::read(root.join("SMALL")).unwrap(), b"ok");
    }
}
