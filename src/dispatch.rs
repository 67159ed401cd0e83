use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::error::ExtractError;
use crate::fmim::{self, AudioExtraction};
use crate::io::{ReadAt, read_vec_at};
use crate::output::Output;
use crate::stfs::{ContainerExtractor, Extraction, Variant};
use crate::xuiz::{self, PackageExtraction};

/// Input formats, told apart by their first four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Container(Variant),
    Audio,
    Package,
}

impl Format {
    pub fn from_magic(magic: &[u8; 4]) -> Option<Self> {
        match magic {
            b"LIVE" => Some(Format::Container(Variant::Live)),
            b"PIRS" => Some(Format::Container(Variant::Pirs)),
            b"CON " => Some(Format::Container(Variant::Con)),
            b"FMIM" => Some(Format::Audio),
            b"XUIZ" => Some(Format::Package),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Format::Container(Variant::Con) => "CON file",
            Format::Container(_) => "LIVE/PIRS file",
            Format::Audio => "FMIM file",
            Format::Package => "XUIZ file",
        }
    }
}

/// What was extracted, per format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Container(Extraction),
    Audio(AudioExtraction),
    Package(PackageExtraction),
}

/// Identify the input by its signature.
pub async fn detect<R: ReadAt + ?Sized>(reader: &R) -> Result<Format> {
    let size = reader.size();
    if size < 4 {
        return Err(ExtractError::InputTooSmall { size, minimum: 4 }.into());
    }
    let raw = read_vec_at(reader, 0, 4).await?;
    let magic = [raw[0], raw[1], raw[2], raw[3]];
    Format::from_magic(&magic).ok_or_else(|| ExtractError::UnknownSignature(magic).into())
}

/// Hand the input to the extractor matching its signature.
///
/// Unknown signatures fail with [`ExtractError::UnknownSignature`] before
/// anything is written.
pub async fn extract<R: ReadAt>(reader: Arc<R>, output: &Output) -> Result<Extracted> {
    let format = detect(reader.as_ref()).await?;
    info!("Handling {}.", format.describe());

    Ok(match format {
        Format::Container(variant) => {
            let extractor = ContainerExtractor::open(reader, variant).await?;
            Extracted::Container(extractor.extract(output).await?)
        }
        Format::Audio => Extracted::Audio(fmim::extract(reader.as_ref(), output).await?),
        Format::Package => Extracted::Package(xuiz::extract(reader.as_ref(), output).await?),
    })
}
