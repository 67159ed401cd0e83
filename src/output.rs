//! Where extracted artifacts go.
//!
//! Every artifact is written through [`Output`], which carries the fully
//! resolved output root, asks the [`OverwritePolicy`] before replacing
//! anything that already exists, and serializes concurrent writes that
//! resolve to the same path.

use std::collections::HashMap;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// The kind of artifact an overwrite decision is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A single file (metadata text, icon, audio payload).
    File,
    /// An output directory; one decision covers every file inside it.
    Directory,
}

/// Decides whether an existing artifact may be overwritten.
///
/// Only consulted when the target already exists.
pub trait OverwritePolicy: Send + Sync {
    fn allow_overwrite(&self, path: &Path, kind: ArtifactKind) -> bool;
}

impl<F> OverwritePolicy for F
where
    F: Fn(&Path, ArtifactKind) -> bool + Send + Sync,
{
    fn allow_overwrite(&self, path: &Path, kind: ArtifactKind) -> bool {
        self(path, kind)
    }
}

/// Overwrite behaviour selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Always,
    Never,
    /// Ask on stdin; declined when stdin is not a terminal.
    Prompt,
}

static PROMPT: Mutex<()> = Mutex::new(());

impl OverwritePolicy for Overwrite {
    fn allow_overwrite(&self, path: &Path, kind: ArtifactKind) -> bool {
        match self {
            Overwrite::Always => true,
            Overwrite::Never => false,
            Overwrite::Prompt => {
                let stdin = std::io::stdin();
                if !stdin.is_terminal() {
                    return false;
                }
                let _guard = PROMPT.lock().unwrap_or_else(|e| e.into_inner());
                let question = match kind {
                    ArtifactKind::File => "already exists, overwrite? (y/n)",
                    ArtifactKind::Directory => "already exists, ok to overwrite files in it? (y/n)",
                };
                eprint!("{} {} ", path.display(), question);
                let _ = std::io::stderr().flush();

                let mut answer = String::new();
                if stdin.lock().read_line(&mut answer).is_err() {
                    return false;
                }
                matches!(answer.trim_start().chars().next(), Some('y' | 'Y'))
            }
        }
    }
}

/// Per-path async locks.
///
/// Two phases that resolve to the same path take turns instead of racing
/// on create/write.
#[derive(Default)]
struct PathLocks {
    locks: AsyncMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Destination of all artifacts produced from one input file.
pub struct Output {
    root: PathBuf,
    basename: String,
    policy: Arc<dyn OverwritePolicy>,
    locks: PathLocks,
}

impl Output {
    /// Create an output rooted at `root`; artifact names derive from `basename`.
    pub fn new(
        root: impl Into<PathBuf>,
        basename: impl Into<String>,
        policy: Arc<dyn OverwritePolicy>,
    ) -> Self {
        Self {
            root: root.into(),
            basename: basename.into(),
            policy,
            locks: PathLocks::default(),
        }
    }

    /// `<basename><suffix>` beneath the output root.
    pub fn artifact(&self, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{}", self.basename, suffix))
    }

    /// `<basename>.txt`
    pub fn text_path(&self) -> PathBuf {
        self.artifact(".txt")
    }

    /// `<basename>_<n>.png`
    pub fn icon_path(&self, n: usize) -> PathBuf {
        self.artifact(&format!("_{}.png", n))
    }

    /// `<basename>.dir`
    pub fn tree_root(&self) -> PathBuf {
        self.artifact(".dir")
    }

    /// Whether `path` may be produced: always when it does not exist yet,
    /// otherwise whatever the policy says.
    pub fn allow(&self, path: &Path, kind: ArtifactKind) -> bool {
        let exists = match kind {
            ArtifactKind::File => path.is_file(),
            ArtifactKind::Directory => path.is_dir(),
        };
        !exists || self.policy.allow_overwrite(path, kind)
    }

    /// Create `path` and any missing parents. Succeeds if it already exists.
    pub async fn create_dir(&self, path: &Path) -> Result<()> {
        let _guard = self.locks.lock(path).await;
        fs::create_dir_all(path).await?;
        Ok(())
    }

    /// Write `data` to `path`, replacing any previous contents.
    pub async fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let _guard = self.locks.lock(path).await;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(())
    }
}
