use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

use anyhow::{Result, bail};

use super::directory::SkipReason;

/// Master SHA-1 digest of the header region.
pub const MASTER_HASH_OFFSET: u64 = 0x32C;
/// First byte covered by the master hash.
pub const HASHED_REGION_START: u64 = 0x344;
/// Big-endian entry id followed by the content type mask.
pub const ENTRY_ID_OFFSET: u64 = 0x354;
/// Titles, descriptions, publisher and filename.
pub const METADATA_OFFSET: u64 = 0x410;
/// Icon header: a 16-bit value and the two icon lengths.
pub const ICON_HEADER_OFFSET: u64 = 0x1710;
pub const ICON1_OFFSET: u64 = 0x171A;
pub const ICON2_OFFSET: u64 = 0x571A;
/// Smallest container that can hold a header and a directory cluster.
pub const MIN_CONTAINER_SIZE: u64 = 0xD000;
/// LIVE/PIRS: path index of the first record at 0xC000 (0xC030 + 2).
pub const LIVE_PATH_FLAG_OFFSET: u64 = 0xC032;
/// Offset, inside the directory, of the first record's start cluster.
pub const FIRST_CLUSTER_OFFSET: u64 = 0x2F;

/// Container flavours sharing the cluster filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Live,
    Pirs,
    Con,
}

impl Variant {
    pub fn magic(&self) -> &'static str {
        match self {
            Variant::Live => "LIVE",
            Variant::Pirs => "PIRS",
            Variant::Con => "CON ",
        }
    }
}

/// A labelled stretch of the header that is dumped as hex into the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSection {
    pub label: &'static str,
    pub offset: u64,
    pub len: usize,
}

const LIVE_SECTIONS: &[HeaderSection] = &[
    HeaderSection {
        label: "Certificate",
        offset: 0x4,
        len: 0x100,
    },
    HeaderSection {
        label: "Data",
        offset: 0x104,
        len: 0x228,
    },
];

const CON_SECTIONS: &[HeaderSection] = &[
    HeaderSection {
        label: "(Console specific) header",
        offset: 0x4,
        len: 0x1A8,
    },
    HeaderSection {
        label: "File specific data",
        offset: 0x1AC,
        len: 388,
    },
];

/// Absolute offsets that differ between container variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub variant: Variant,
    /// End of the master-hashed region and start of the hash table.
    pub hash_stop: u64,
    /// Start of the directory table; also the base of cluster numbering.
    pub directory_start: u64,
    /// Size of the hash block inserted at every band boundary.
    pub block_step: u64,
    pub sections: &'static [HeaderSection],
}

impl Layout {
    /// LIVE/PIRS layout. `path_flag` is the big-endian value at
    /// [`LIVE_PATH_FLAG_OFFSET`]: 0xFFFF means the directory starts at 0xC000.
    pub fn live(variant: Variant, path_flag: u16) -> Self {
        let directory_start = if path_flag == 0xFFFF { 0xC000 } else { 0xD000 };
        Self::new(variant, 0xB000, directory_start, LIVE_SECTIONS)
    }

    pub fn con() -> Self {
        Self::new(Variant::Con, 0xA000, 0xC000, CON_SECTIONS)
    }

    fn new(
        variant: Variant,
        hash_stop: u64,
        directory_start: u64,
        sections: &'static [HeaderSection],
    ) -> Self {
        let block_step = if hash_stop == 0xB000 && directory_start == 0xC000 {
            0x1000
        } else {
            0x2000
        };
        Self {
            variant,
            hash_stop,
            directory_start,
            block_step,
            sections,
        }
    }

    /// Largest allowed length of icon `n` (1 or 2).
    pub fn icon_limit(&self, n: usize) -> u64 {
        match n {
            1 => ICON2_OFFSET - ICON1_OFFSET,
            _ => self.hash_stop - ICON2_OFFSET,
        }
    }

    pub fn icon_offset(&self, n: usize) -> u64 {
        match n {
            1 => ICON1_OFFSET,
            _ => ICON2_OFFSET,
        }
    }
}

/// Content type classification.
///
/// Tests run in a fixed order and the first mask sharing any bit with the
/// value wins, so overlapping masks resolve by position, not specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    None,
    GameSave,
    GameAddOn,
    Theme,
    VideoClip,
    GameTrailer,
    ArcadeTitle,
    GamerProfile,
    GamerPicture,
    SystemUpdate,
    FullGameDemo,
    Unknown,
}

const CONTENT_MASKS: &[(u32, ContentKind)] = &[
    (0x0000_0001, ContentKind::GameSave),
    (0x0000_0002, ContentKind::GameAddOn),
    (0x0003_0000, ContentKind::Theme),
    (0x0009_0000, ContentKind::VideoClip),
    (0x000C_0000, ContentKind::GameTrailer),
    (0x000D_0000, ContentKind::ArcadeTitle),
    (0x0001_0000, ContentKind::GamerProfile),
    (0x0002_0000, ContentKind::GamerPicture),
    (0x0004_0000, ContentKind::SystemUpdate),
    (0x0008_0000, ContentKind::FullGameDemo),
];

impl ContentKind {
    pub fn classify(mask: u32) -> Self {
        if mask == 0 {
            return ContentKind::None;
        }
        CONTENT_MASKS
            .iter()
            .find(|(bits, _)| mask & bits != 0)
            .map(|&(_, kind)| kind)
            .unwrap_or(ContentKind::Unknown)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentKind::None => "(no type)",
            ContentKind::GameSave => "Game save",
            ContentKind::GameAddOn => "Game add-on",
            ContentKind::Theme => "Theme",
            ContentKind::VideoClip => "Video clip",
            ContentKind::GameTrailer => "Game trailer",
            ContentKind::ArcadeTitle => "Xbox Live Arcade",
            ContentKind::GamerProfile => "Gamer profile",
            ContentKind::GamerPicture => "Gamer picture",
            ContentKind::SystemUpdate => "System update",
            ContentKind::FullGameDemo => "Full game demo",
            ContentKind::Unknown => "(unknown)",
        })
    }
}

/// One 64-byte record of the directory table.
///
/// The three 24-bit fields are stored as a little-endian 16-bit low part
/// followed by the high byte; everything after them is big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub raw_name: [u8; 40],
    pub name_flags: u8,
    pub cluster_count: u32,
    pub cluster_count_copy: u32,
    pub start_cluster: u32,
    pub path_index: u16,
    pub file_length: u32,
    pub modify_time: u32,
    pub access_time: u32,
}

impl DirectoryEntry {
    pub const SIZE: usize = 64;
    pub const MAX_NAME_LEN: usize = 40;

    const DIRECTORY_FLAG: u8 = 0x80;
    const RESERVED_FLAG: u8 = 0x40;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Directory record truncated: {} bytes", data.len());
        }

        let mut cursor = Cursor::new(data);
        let mut raw_name = [0u8; 40];
        cursor.read_exact(&mut raw_name)?;

        Ok(Self {
            raw_name,
            name_flags: cursor.read_u8()?,
            cluster_count: cursor.read_u24::<LittleEndian>()?,
            cluster_count_copy: cursor.read_u24::<LittleEndian>()?,
            start_cluster: cursor.read_u24::<LittleEndian>()?,
            path_index: cursor.read_u16::<BigEndian>()?,
            file_length: cursor.read_u32::<BigEndian>()?,
            modify_time: cursor.read_u32::<BigEndian>()?,
            access_time: cursor.read_u32::<BigEndian>()?,
        })
    }

    /// A zero name-length byte terminates the table.
    pub fn is_end(&self) -> bool {
        self.name_flags == 0
    }

    pub fn is_directory(&self) -> bool {
        self.name_flags & Self::DIRECTORY_FLAG != 0
    }

    pub fn is_flagged(&self) -> bool {
        self.name_flags & Self::RESERVED_FLAG != 0
    }

    /// Name length with both flag bits masked off.
    pub fn name_len(&self) -> usize {
        (self.name_flags & !(Self::DIRECTORY_FLAG | Self::RESERVED_FLAG)) as usize
    }

    /// The name, lossily decoded; `None` when the length is out of range.
    pub fn name(&self) -> Option<String> {
        let len = self.name_len();
        if !(1..=Self::MAX_NAME_LEN).contains(&len) {
            return None;
        }
        Some(String::from_utf8_lossy(&self.raw_name[..len]).into_owned())
    }

    /// Check the record's internal consistency, returning its name.
    pub fn validate(&self) -> std::result::Result<String, SkipReason> {
        let name = self.name().ok_or(SkipReason::NameLength(self.name_len()))?;
        if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(SkipReason::UnsafeName(name));
        }
        if self.cluster_count != self.cluster_count_copy {
            return Err(SkipReason::ClusterCountMismatch {
                first: self.cluster_count,
                second: self.cluster_count_copy,
            });
        }
        if self.start_cluster < 1 && !self.is_directory() {
            return Err(SkipReason::ZeroStartCluster);
        }
        if self.file_length as u64 > 0x1000 * self.cluster_count as u64 {
            return Err(SkipReason::LengthExceedsClusters {
                length: self.file_length,
                clusters: self.cluster_count,
            });
        }
        Ok(name)
    }
}

/// One populated 24-byte record of the trailing hash table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub digest: [u8; 20],
    pub entry_id: u32,
}

impl HashRecord {
    pub const SIZE: usize = 24;

    /// `None` for the all-zero "empty" sentinel.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < Self::SIZE {
            bail!("Hash record truncated: {} bytes", data.len());
        }
        let data = &data[..Self::SIZE];
        if data.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let mut cursor = Cursor::new(data);
        let mut digest = [0u8; 20];
        cursor.read_exact(&mut digest)?;
        Ok(Some(Self {
            digest,
            entry_id: cursor.read_u32::<BigEndian>()?,
        }))
    }
}
