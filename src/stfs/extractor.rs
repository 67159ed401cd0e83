use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::cluster::CLUSTER_SIZE;
use super::directory::{DirectoryTreeBuilder, ValidationReport};
use super::hash::{Verification, verify_range};
use super::metadata::{IconHeader, IconOutcome, Metadata, extract_icon, report_skipped_icon};
use super::report::ContainerReport;
use super::structures::*;
use crate::error::ExtractError;
use crate::io::{ReadAt, read_clamped_at, read_vec_at};
use crate::output::{ArtifactKind, Output};

/// Fixed header fields shared by all variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub master_hash: [u8; 20],
    pub entry_id: u32,
    pub content_type: u32,
    pub icons: IconHeader,
    /// Start cluster of the first directory record; the directory table
    /// occupies this many clusters.
    pub directory_clusters: u16,
}

/// What one extraction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub layout: Layout,
    /// The metadata report, if it was written.
    pub text: Option<PathBuf>,
    pub icons: [IconOutcome; 2],
    /// The directory scan, if the tree was materialized.
    pub tree: Option<ValidationReport>,
    pub master_hash: Option<Verification>,
}

/// Extractor for LIVE, PIRS and CON containers.
pub struct ContainerExtractor<R: ReadAt> {
    reader: Arc<R>,
    layout: Layout,
}

impl<R: ReadAt> ContainerExtractor<R> {
    /// Check the input size and work out the variant's layout.
    pub async fn open(reader: Arc<R>, variant: Variant) -> Result<Self> {
        let size = reader.size();
        if size < MIN_CONTAINER_SIZE {
            return Err(ExtractError::InputTooSmall {
                size,
                minimum: MIN_CONTAINER_SIZE,
            }
            .into());
        }

        let layout = match variant {
            Variant::Con => Layout::con(),
            Variant::Live | Variant::Pirs => {
                let raw = read_vec_at(reader.as_ref(), LIVE_PATH_FLAG_OFFSET, 2).await?;
                Layout::live(variant, u16::from_be_bytes([raw[0], raw[1]]))
            }
        };

        Ok(Self { reader, layout })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub async fn read_header(&self) -> Result<Header> {
        let reader = self.reader.as_ref();

        let master_hash = read_vec_at(reader, MASTER_HASH_OFFSET, 20).await?;
        let ids = read_vec_at(reader, ENTRY_ID_OFFSET, 8).await?;
        let mut cursor = Cursor::new(&ids);
        let entry_id = cursor.read_u32::<BigEndian>()?;
        let content_type = cursor.read_u32::<BigEndian>()?;

        let icons = IconHeader::read(reader).await?;

        let raw = read_vec_at(reader, self.layout.directory_start + FIRST_CLUSTER_OFFSET, 2).await?;
        let directory_clusters = Cursor::new(&raw).read_u16::<LittleEndian>()?;

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&master_hash);
        Ok(Header {
            master_hash: hash,
            entry_id,
            content_type,
            icons,
            directory_clusters,
        })
    }

    /// Extract every artifact the output's policy allows.
    ///
    /// Overwrite decisions are taken one after another before any work
    /// starts; the phases then run concurrently, each reading at absolute
    /// offsets.
    pub async fn extract(&self, output: &Output) -> Result<Extraction> {
        let header = self.read_header().await?;

        let text_path = output.text_path();
        let write_text = output.allow(&text_path, ArtifactKind::File);
        let icon1 = self.plan_icon(&header, 1, output);
        let icon2 = self.plan_icon(&header, 2, output);
        let tree_root = output.tree_root();
        let build_tree = output.allow(&tree_root, ArtifactKind::Directory);

        let (collected, icon1, icon2, tree) = tokio::join!(
            async {
                if write_text {
                    self.collect_report(&header).await.map(Some)
                } else {
                    Ok(None)
                }
            },
            self.run_icon(icon1, 1, output),
            self.run_icon(icon2, 2, output),
            async {
                if build_tree {
                    self.build_tree(&header, output, tree_root).await.map(Some)
                } else {
                    Ok(None)
                }
            },
        );
        let collected = collected?;
        let icons = [icon1?, icon2?];
        let tree = tree?;

        let mut text = None;
        let mut master_hash = None;
        if let Some(report) = collected {
            info!("Writing information file {}", text_path.display());
            output
                .write_file(&text_path, report.render(tree.as_ref()).as_bytes())
                .await?;
            text = Some(text_path);
            master_hash = Some(report.master);
        }

        Ok(Extraction {
            layout: self.layout,
            text,
            icons,
            tree,
            master_hash,
        })
    }

    fn plan_icon(
        &self,
        header: &Header,
        n: usize,
        output: &Output,
    ) -> std::result::Result<(u32, PathBuf), IconOutcome> {
        let len = header.icons.check(&self.layout, n)?;
        let path = output.icon_path(n);
        if !output.allow(&path, ArtifactKind::File) {
            return Err(IconOutcome::Declined(path));
        }
        Ok((len, path))
    }

    async fn run_icon(
        &self,
        plan: std::result::Result<(u32, PathBuf), IconOutcome>,
        n: usize,
        output: &Output,
    ) -> Result<IconOutcome> {
        match plan {
            Ok((len, path)) => {
                extract_icon(self.reader.as_ref(), &self.layout, n, len, output, path).await
            }
            Err(outcome) => {
                report_skipped_icon(n, &outcome);
                Ok(outcome)
            }
        }
    }

    async fn collect_report(&self, header: &Header) -> Result<ContainerReport> {
        let reader = self.reader.as_ref();
        let layout = &self.layout;

        let master = verify_range(
            reader,
            header.master_hash,
            header.entry_id,
            HASHED_REGION_START,
            layout.hash_stop,
        )
        .await?;
        if !master.is_ok() {
            warn!("Master hash mismatch: {}", master);
        }

        let mut sections = Vec::with_capacity(layout.sections.len());
        for section in layout.sections {
            sections.push((section.label, read_vec_at(reader, section.offset, section.len).await?));
        }

        let metadata = Metadata::read(reader).await?;
        let hash_table = read_clamped_at(
            reader,
            layout.hash_stop,
            (layout.directory_start - layout.hash_stop) as usize,
        )
        .await?;

        Ok(ContainerReport {
            layout: *layout,
            header: header.clone(),
            sections,
            master,
            metadata,
            hash_table,
        })
    }

    async fn build_tree(
        &self,
        header: &Header,
        output: &Output,
        root: PathBuf,
    ) -> Result<ValidationReport> {
        let len = CLUSTER_SIZE as usize * header.directory_clusters as usize;
        let blob = read_clamped_at(self.reader.as_ref(), self.layout.directory_start, len).await?;

        info!("Creating and filling content directory {}", root.display());
        let builder = DirectoryTreeBuilder::new(
            self.reader.clone(),
            self.layout.block_step,
            self.layout.directory_start,
            output,
            root,
        );
        Ok(builder.build(&blob, len / 64).await)
    }
}
