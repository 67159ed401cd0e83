use super::ReadAt;
use anyhow::Result;
use async_trait::async_trait;

/// In-memory data source, handy for containers that are already loaded.
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::io::{read_clamped_at, read_vec_at};

    #[tokio::test]
    async fn short_read_is_reported() {
        let reader = MemoryReader::new(vec![1, 2, 3, 4]);
        let err = read_vec_at(&reader, 2, 4).await.unwrap_err();
        match err.downcast_ref::<ExtractError>() {
            Some(ExtractError::ShortRead {
                offset: 2,
                expected: 4,
                actual: 2,
            }) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn clamped_read_stops_at_end() {
        let reader = MemoryReader::new(vec![1, 2, 3, 4]);
        assert_eq!(read_clamped_at(&reader, 1, 10).await.unwrap(), vec![2, 3, 4]);
        assert!(read_clamped_at(&reader, 9, 10).await.unwrap().is_empty());
    }
}
