mod local;
mod memory;

pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ExtractError;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Fill `buf` from `offset`, failing with [`ExtractError::ShortRead`] when
/// the source runs out first.
pub async fn read_exact_at<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read_at(offset + filled as u64, &mut buf[filled..])
            .await?;
        if n == 0 {
            return Err(ExtractError::ShortRead {
                offset,
                expected: buf.len(),
                actual: filled,
            }
            .into());
        }
        filled += n;
    }
    Ok(())
}

/// Read `len` bytes at `offset` into a new buffer; short reads are errors.
pub async fn read_vec_at<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact_at(reader, offset, &mut buf).await?;
    Ok(buf)
}

/// Read up to `len` bytes at `offset`, stopping at the end of the source.
pub async fn read_clamped_at<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let available = reader.size().saturating_sub(offset);
    let len = (len as u64).min(available) as usize;
    read_vec_at(reader, offset, len).await
}
