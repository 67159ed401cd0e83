use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{info, warn};

use super::structures::{ICON_HEADER_OFFSET, Layout, METADATA_OFFSET};
use crate::io::{ReadAt, read_vec_at};
use crate::output::Output;

/// Slot order of the localized titles and descriptions.
pub const LANGUAGES: [&str; 9] = [
    "English",
    "Japanese",
    "German",
    "French",
    "Spanish",
    "Italian",
    "Korean",
    "Chinese",
    "Portuguese",
];

const TEXT_SLOT: usize = 0x100;
const NAME_SLOT: usize = 0x80;

fn is_padding(b: u8) -> bool {
    matches!(b, 0x00 | b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C | 0xFF)
}

/// Trim NUL, whitespace and 0xFF padding from both ends.
pub fn strip_padding(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| !is_padding(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| !is_padding(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Decode a fixed-size text slot.
///
/// Slots hold big-endian UTF-16 for Latin text in practice, so embedded
/// NULs are dropped after trimming rather than treated as terminators.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(strip_padding(bytes)).replace('\0', "")
}

/// Localized titles and descriptions, publisher and filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// (language, text) for every non-empty title slot.
    pub titles: Vec<(&'static str, String)>,
    pub descriptions: Vec<(&'static str, String)>,
    pub publisher: String,
    pub filename: String,
}

impl Metadata {
    pub const SIZE: usize = 2 * LANGUAGES.len() * TEXT_SLOT + 2 * NAME_SLOT;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Metadata block truncated: {} bytes", data.len());
        }

        let (titles, rest) = data.split_at(LANGUAGES.len() * TEXT_SLOT);
        let (descriptions, rest) = rest.split_at(LANGUAGES.len() * TEXT_SLOT);
        let (publisher, rest) = rest.split_at(NAME_SLOT);

        Ok(Self {
            titles: localized(titles),
            descriptions: localized(descriptions),
            publisher: decode_text(publisher),
            filename: decode_text(&rest[..NAME_SLOT]),
        })
    }

    pub async fn read<R: ReadAt + ?Sized>(reader: &R) -> Result<Self> {
        let data = read_vec_at(reader, METADATA_OFFSET, Self::SIZE).await?;
        Self::from_bytes(&data)
    }
}

fn localized(block: &[u8]) -> Vec<(&'static str, String)> {
    LANGUAGES
        .iter()
        .zip(block.chunks(TEXT_SLOT))
        .map(|(&lang, slot)| (lang, decode_text(slot)))
        .filter(|(_, text)| !text.is_empty())
        .collect()
}

/// The header in front of the two embedded PNG icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconHeader {
    pub value: u16,
    pub lengths: [u32; 2],
}

impl IconHeader {
    pub const SIZE: usize = 10;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Icon header truncated: {} bytes", data.len());
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            value: cursor.read_u16::<BigEndian>()?,
            lengths: [cursor.read_u32::<BigEndian>()?, cursor.read_u32::<BigEndian>()?],
        })
    }

    pub async fn read<R: ReadAt + ?Sized>(reader: &R) -> Result<Self> {
        let data = read_vec_at(reader, ICON_HEADER_OFFSET, Self::SIZE).await?;
        Self::from_bytes(&data)
    }

    /// Length of icon `n` (1 or 2) if it should be written, otherwise why not.
    pub fn check(&self, layout: &Layout, n: usize) -> std::result::Result<u32, IconOutcome> {
        let declared = self.lengths[n - 1];
        let limit = layout.icon_limit(n);
        if declared == 0 {
            Err(IconOutcome::Absent)
        } else if declared as u64 > limit {
            Err(IconOutcome::TooLarge { declared, limit })
        } else {
            Ok(declared)
        }
    }
}

/// What happened to one embedded icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOutcome {
    /// Declared length is zero.
    Absent,
    /// Declared length does not fit its slot; nothing is written.
    TooLarge { declared: u32, limit: u64 },
    /// The target exists and overwriting it was declined.
    Declined(PathBuf),
    Written { path: PathBuf, len: usize },
}

/// Copy icon `n` (`len` bytes, already checked against its slot) to `path`.
pub async fn extract_icon<R: ReadAt + ?Sized>(
    reader: &R,
    layout: &Layout,
    n: usize,
    len: u32,
    output: &Output,
    path: PathBuf,
) -> Result<IconOutcome> {
    let data = read_vec_at(reader, layout.icon_offset(n), len as usize).await?;
    info!("Writing PNG file {}", path.display());
    output.write_file(&path, &data).await?;
    Ok(IconOutcome::Written {
        path,
        len: data.len(),
    })
}

/// Log an icon that will not be written.
pub fn report_skipped_icon(n: usize, outcome: &IconOutcome) {
    if let IconOutcome::TooLarge { declared, limit } = outcome {
        warn!(
            "PNG image {} too large ({} instead of maximal {} bytes), file not written.",
            n, declared, limit
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stfs::structures::Layout;

    #[test]
    fn strips_both_ends() {
        assert_eq!(strip_padding(b"\0 \tHello\r\n\xff\0\0"), b"Hello");
        assert_eq!(strip_padding(b"\0\0\0"), b"");
        assert_eq!(strip_padding(b""), b"");
        assert_eq!(decode_text(b"\0H\0i\0\0\0\0"), "Hi");
    }

    #[test]
    fn metadata_slots_in_language_order() {
        let mut block = vec![0u8; Metadata::SIZE];
        block[..5].copy_from_slice(b"Title");
        block[2 * TEXT_SLOT..][..5].copy_from_slice(b"Titel");
        let desc = LANGUAGES.len() * TEXT_SLOT;
        block[desc + 8 * TEXT_SLOT..][..6].copy_from_slice(b"  Desc");
        let publisher = 2 * desc;
        block[publisher..][..3].copy_from_slice(b"Pub");
        block[publisher + NAME_SLOT..][..4].copy_from_slice(b"Name");
        block[publisher + NAME_SLOT + 4..publisher + 2 * NAME_SLOT].fill(0xFF);

        let meta = Metadata::from_bytes(&block).unwrap();
        assert_eq!(
            meta.titles,
            vec![("English", "Title".to_string()), ("German", "Titel".to_string())]
        );
        assert_eq!(meta.descriptions, vec![("Portuguese", "Desc".to_string())]);
        assert_eq!(meta.publisher, "Pub");
        assert_eq!(meta.filename, "Name");
    }

    #[test]
    fn icon_checks() {
        let layout = Layout::con();
        let mut raw = vec![0u8, 7];
        raw.extend_from_slice(&0x100u32.to_be_bytes());
        raw.extend_from_slice(&0x5000u32.to_be_bytes());
        let header = IconHeader::from_bytes(&raw).unwrap();

        assert_eq!(header.value, 7);
        assert_eq!(header.check(&layout, 1), Ok(0x100));
        assert_eq!(
            header.check(&layout, 2),
            Err(IconOutcome::TooLarge {
                declared: 0x5000,
                limit: 0xA000 - 0x571A,
            })
        );

        let none = IconHeader {
            value: 0,
            lengths: [0, 0],
        };
        assert_eq!(none.check(&layout, 1), Err(IconOutcome::Absent));
    }
}
