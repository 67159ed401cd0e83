//! XUIZ (.xzp) resource packages: a short directory of length/offset pairs
//! followed by the file data.

use byteorder::{BigEndian, ReadBytesExt};
use std::fmt::Write;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::error::ExtractError;
use crate::io::{ReadAt, read_vec_at};
use crate::output::{ArtifactKind, Output};

/// Signature plus the fixed header fields.
pub const HEADER_SIZE: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
    pub flags: u32,
    pub length: u32,
    pub unknown: u32,
    /// Size of the directory; file offsets count from its end.
    pub data_ptr: u32,
    pub entry_count: u16,
}

impl PackageHeader {
    /// Parse a header starting with the `XUIZ` signature.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            bail!("Package header truncated: {} bytes", data.len());
        }
        let mut cursor = Cursor::new(&data[4..]);
        Ok(Self {
            flags: cursor.read_u32::<BigEndian>()?,
            length: cursor.read_u32::<BigEndian>()?,
            unknown: cursor.read_u32::<BigEndian>()?,
            data_ptr: cursor.read_u32::<BigEndian>()?,
            entry_count: cursor.read_u16::<BigEndian>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub length: u32,
    pub offset: u32,
    /// `\`-separated relative path.
    pub name: String,
}

impl PackageEntry {
    /// Parse `count` entries from the directory bytes.
    pub fn parse_all(directory: &[u8], count: u16) -> Result<Vec<Self>> {
        let mut cursor = Cursor::new(directory);
        let mut entries = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let length = cursor.read_u32::<BigEndian>()?;
            let offset = cursor.read_u32::<BigEndian>()?;
            let name_len = cursor.read_u8()? as usize;

            let mut raw = vec![0u8; 2 * name_len];
            cursor.read_exact(&mut raw)?;
            let units = raw.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
            let name: String = char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();

            entries.push(Self {
                length,
                offset,
                name: name
                    .trim_matches(|c: char| c == '\0' || c == '\u{FF}' || c.is_whitespace())
                    .to_string(),
            });
        }

        Ok(entries)
    }

    /// Absolute offset of the file data.
    pub fn data_start(&self, header: &PackageHeader) -> u64 {
        HEADER_SIZE as u64 + header.data_ptr as u64 + self.offset as u64
    }

    /// The entry's path beneath `root`, refusing anything that would escape it.
    pub fn target(&self, root: &Path) -> Result<PathBuf> {
        let components: Vec<&str> = self.name.split('\\').filter(|c| !c.is_empty()).collect();
        let unsafe_component = |c: &&str| *c == "." || *c == ".." || c.contains(['/', ':', '\0']);
        if components.is_empty() || components.iter().any(unsafe_component) {
            return Err(ExtractError::UnsafePath(self.name.clone()).into());
        }
        Ok(components.iter().fold(root.to_path_buf(), |path, c| path.join(c)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageExtraction {
    pub header: PackageHeader,
    pub entries: Vec<PackageEntry>,
    pub text: Option<PathBuf>,
    /// Files written beneath `<basename>.dir`, if it was allowed.
    pub written: Option<Vec<PathBuf>>,
}

fn render(header: &PackageHeader, entries: &[PackageEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Flags: {}", header.flags);
    let _ = writeln!(out, "Size: {}", header.length);
    let _ = writeln!(out, "? : {}", header.unknown);
    let _ = writeln!(out, "Data pointer: {}", header.data_ptr);
    let _ = writeln!(out, "Directory entries: {}", header.entry_count);
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "\nEntry {}", i);
        let _ = writeln!(out, "File length: {}", entry.length);
        let _ = writeln!(out, "File start: {}", entry.offset);
        let _ = writeln!(out, "Filename: {}", entry.name);
    }
    out
}

/// Unpack every entry beneath `<basename>.dir` and describe the package in
/// `<basename>.txt`.
///
/// The declared package length must equal the input size; otherwise nothing
/// is written.
pub async fn extract<R: ReadAt + ?Sized>(
    reader: &R,
    output: &Output,
) -> Result<PackageExtraction> {
    let size = reader.size();
    if size < HEADER_SIZE as u64 {
        return Err(ExtractError::InputTooSmall {
            size,
            minimum: HEADER_SIZE as u64,
        }
        .into());
    }

    let header = PackageHeader::from_bytes(&read_vec_at(reader, 0, HEADER_SIZE).await?)?;
    if header.length as u64 != size {
        return Err(ExtractError::SizeMismatch {
            declared: header.length as u64,
            actual: size,
        }
        .into());
    }

    let directory = read_vec_at(reader, HEADER_SIZE as u64, header.data_ptr as usize).await?;
    let entries = PackageEntry::parse_all(&directory, header.entry_count)?;

    let mut text = None;
    let text_path = output.text_path();
    if output.allow(&text_path, ArtifactKind::File) {
        info!("Writing information file {}", text_path.display());
        output
            .write_file(&text_path, render(&header, &entries).as_bytes())
            .await?;
        text = Some(text_path);
    }

    let root = output.tree_root();
    let mut written = None;
    if output.allow(&root, ArtifactKind::Directory) {
        output.create_dir(&root).await?;
        let mut paths = Vec::new();
        for entry in &entries {
            let extracted = async {
                let path = entry.target(&root)?;
                let data =
                    read_vec_at(reader, entry.data_start(&header), entry.length as usize).await?;
                output.write_file(&path, &data).await?;
                anyhow::Ok(path)
            }
            .await;
            match extracted {
                Ok(path) => {
                    info!("  extracting: {}", path.display());
                    paths.push(path);
                }
                Err(e) => warn!("Cannot extract {}: {:#}", entry.name, e),
            }
        }
        written = Some(paths);
    }

    Ok(PackageExtraction {
        header,
        entries,
        text,
        written,
    })
}
