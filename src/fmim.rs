//! FMIM audio wrapper: a fixed text header in front of a WMA stream.

use byteorder::{BigEndian, ReadBytesExt};
use std::fmt::Write;
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::error::ExtractError;
use crate::io::{ReadAt, read_clamped_at, read_vec_at};
use crate::output::{ArtifactKind, Output};
use crate::stfs::metadata::decode_text;

const PATTERN: [u8; 8] = [0, 0, 0, 1, 0, 1, 0, 1];
const FIELDS: [&str; 6] = ["Song", "Album", "Artist 1", "Artist 2", "Genre 1", "Genre 2"];
const FIELD_SIZE: usize = 0x200;
const PADDING_SIZE: usize = 0xF8;

/// Signature, pattern, text fields, size and padding.
pub const HEADER_SIZE: usize = 4 + PATTERN.len() + FIELDS.len() * FIELD_SIZE + 4 + PADDING_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHeader {
    pub fields: Vec<(&'static str, String)>,
    pub size: u32,
    /// The bytes after the size field; normally all zero.
    pub padding: Vec<u8>,
}

impl AudioHeader {
    /// Parse a header starting with the `FMIM` signature.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            bail!("Audio header truncated: {} bytes", data.len());
        }

        let pattern = &data[4..4 + PATTERN.len()];
        if pattern != PATTERN {
            return Err(ExtractError::PatternMismatch {
                found: pattern.to_vec(),
                expected: PATTERN.to_vec(),
            }
            .into());
        }

        let text = &data[4 + PATTERN.len()..];
        let fields = FIELDS
            .iter()
            .zip(text.chunks(FIELD_SIZE))
            .map(|(&name, raw)| (name, decode_text(raw)))
            .collect();

        let rest = &text[FIELDS.len() * FIELD_SIZE..];
        let size = Cursor::new(rest).read_u32::<BigEndian>()?;

        Ok(Self {
            fields,
            size,
            padding: rest[4..4 + PADDING_SIZE].to_vec(),
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.fields {
            let _ = writeln!(out, "{}: {}", name, value);
        }
        let _ = writeln!(out, "Size: {}", self.size);
        if self.padding.iter().any(|&b| b != 0) {
            let _ = writeln!(
                out,
                "Not followed by {} 0-bytes: {}",
                PADDING_SIZE,
                hex::encode(&self.padding)
            );
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    pub header: AudioHeader,
    pub text: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

/// Write the header fields to `<basename>.txt` and the stream to `<basename>.wma`.
pub async fn extract<R: ReadAt + ?Sized>(reader: &R, output: &Output) -> Result<AudioExtraction> {
    let size = reader.size();
    if size < HEADER_SIZE as u64 {
        return Err(ExtractError::InputTooSmall {
            size,
            minimum: HEADER_SIZE as u64,
        }
        .into());
    }

    let header = AudioHeader::from_bytes(&read_vec_at(reader, 0, HEADER_SIZE).await?)?;
    if header.padding.iter().any(|&b| b != 0) {
        warn!("Header size field is not followed by {} 0-bytes", PADDING_SIZE);
    }

    let mut text = None;
    let text_path = output.text_path();
    if output.allow(&text_path, ArtifactKind::File) {
        info!("Writing information file {}", text_path.display());
        output.write_file(&text_path, header.render().as_bytes()).await?;
        text = Some(text_path);
    }

    let mut audio = None;
    let audio_path = output.artifact(".wma");
    if output.allow(&audio_path, ArtifactKind::File) {
        let len = (size - HEADER_SIZE as u64) as usize;
        let data = read_clamped_at(reader, HEADER_SIZE as u64, len).await?;
        info!("Writing WMA file {}", audio_path.display());
        output.write_file(&audio_path, &data).await?;
        audio = Some(audio_path);
    }

    Ok(AudioExtraction { header, text, audio })
}
