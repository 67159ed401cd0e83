//! Cluster addressing and chunked file reads.
//!
//! File payload is allocated in 4 KiB clusters, but every 170 clusters the
//! container interleaves a hash block that is not part of any file. The
//! cluster number advertised in a directory record therefore has to be
//! corrected before it can be turned into a byte offset.

use std::sync::Arc;

use anyhow::Result;

use crate::io::{ReadAt, read_exact_at};

/// Size of one allocation unit.
pub const CLUSTER_SIZE: u64 = 0x1000;

/// Number of clusters in one band between interleaved hash blocks.
pub const CLUSTERS_PER_BAND: u32 = 170;

/// Bytes to skip on top of the advertised offset of `cluster`.
///
/// Each band boundary crossed inserts one `block_step`-sized block; the
/// correction is accumulated while repeatedly dividing by the band size.
pub fn correction(cluster: u32, block_step: u64) -> u64 {
    let mut cluster = cluster;
    let mut total = 0;
    while cluster >= CLUSTERS_PER_BAND {
        cluster /= CLUSTERS_PER_BAND;
        total += (cluster as u64 + 1) * block_step;
    }
    total
}

/// Preallocation for a file of `length` bytes advertised at
/// `advertised_start`, bounded by what the source can still hold.
fn capacity_hint(source_size: u64, advertised_start: u64, length: u32) -> usize {
    (length as u64).min(source_size.saturating_sub(advertised_start)) as usize
}

/// Reads the contents of one file cluster by cluster.
pub struct BlockReader<R: ReadAt> {
    reader: Arc<R>,
    block_step: u64,
}

impl<R: ReadAt> BlockReader<R> {
    pub fn new(reader: Arc<R>, block_step: u64) -> Self {
        Self { reader, block_step }
    }

    /// Read `length` bytes of a file whose data starts at cluster
    /// `start_cluster`, advertised at byte `advertised_start`.
    ///
    /// Each cluster is read separately at its corrected offset; the last
    /// read is short when `length` is not a multiple of the cluster size.
    /// A physical read that comes back short fails the whole file.
    pub async fn read_file(
        &self,
        advertised_start: u64,
        start_cluster: u32,
        length: u32,
    ) -> Result<Vec<u8>> {
        let capacity = capacity_hint(self.reader.size(), advertised_start, length);
        let mut data = Vec::with_capacity(capacity);
        let mut advertised = advertised_start;
        let mut cluster = start_cluster;
        let mut remaining = length as u64;

        while remaining > 0 {
            let chunk = remaining.min(CLUSTER_SIZE) as usize;
            let offset = advertised + correction(cluster, self.block_step);

            let filled = data.len();
            data.resize(filled + chunk, 0);
            read_exact_at(self.reader.as_ref(), offset, &mut data[filled..]).await?;

            cluster += 1;
            advertised += CLUSTER_SIZE;
            remaining -= chunk as u64;
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every read issued against the wrapped source.
    struct CountingReader {
        inner: MemoryReader,
        reads: Mutex<Vec<(u64, usize)>>,
    }

    impl CountingReader {
        fn new(data: Vec<u8>) -> Self {
            Self {
                inner: MemoryReader::new(data),
                reads: Mutex::new(Vec::new()),
            }
        }

        fn reads(&self) -> Vec<(u64, usize)> {
            self.reads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReadAt for CountingReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            self.reads.lock().unwrap().push((offset, buf.len()));
            self.inner.read_at(offset, buf).await
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    #[test]
    fn no_correction_inside_first_band() {
        for cluster in 0..CLUSTERS_PER_BAND {
            assert_eq!(correction(cluster, 0x1000), 0);
            assert_eq!(correction(cluster, 0x2000), 0);
        }
    }

    #[test]
    fn correction_follows_repeated_division() {
        // 170 / 170 = 1 -> (1 + 1) steps
        assert_eq!(correction(170, 0x1000), 2 * 0x1000);
        // 340 / 170 = 2 -> (2 + 1) steps
        assert_eq!(correction(340, 0x1000), 3 * 0x1000);
        assert_eq!(correction(339, 0x2000), 2 * 0x2000);
        // 28900 / 170 = 170 -> 171 steps, 170 / 170 = 1 -> 2 more
        assert_eq!(correction(28900, 0x1000), 173 * 0x1000);
    }

    #[tokio::test]
    async fn whole_clusters_take_one_read_each() {
        let data: Vec<u8> = (0..4 * CLUSTER_SIZE).map(|i| (i % 251) as u8).collect();
        let reader = Arc::new(CountingReader::new(data.clone()));
        let blocks = BlockReader::new(reader.clone(), 0x1000);

        let out = blocks.read_file(0, 1, 3 * CLUSTER_SIZE as u32).await.unwrap();

        let reads = reader.reads();
        assert_eq!(reads.len(), 3);
        assert!(reads.iter().all(|&(_, len)| len == CLUSTER_SIZE as usize));
        assert_eq!(out, &data[..3 * CLUSTER_SIZE as usize]);
    }

    #[tokio::test]
    async fn partial_tail_is_read_short() {
        let data = vec![7u8; 4 * CLUSTER_SIZE as usize];
        let reader = Arc::new(CountingReader::new(data));
        let blocks = BlockReader::new(reader.clone(), 0x1000);

        let out = blocks
            .read_file(CLUSTER_SIZE, 1, 2 * CLUSTER_SIZE as u32 + 10)
            .await
            .unwrap();

        assert_eq!(out.len(), 2 * CLUSTER_SIZE as usize + 10);
        assert_eq!(
            reader.reads(),
            vec![(0x1000, 0x1000), (0x2000, 0x1000), (0x3000, 10)]
        );
    }

    #[tokio::test]
    async fn reads_skip_hash_blocks_past_first_band() {
        let step = 0x1000;
        let advertised = 169 * CLUSTER_SIZE;
        let size = advertised + 2 * CLUSTER_SIZE + 2 * step;
        let mut data = vec![0u8; size as usize];
        data[advertised as usize..][..4].copy_from_slice(b"AAAA");
        // cluster 170 sits one cluster later plus the two inserted blocks
        let second = (advertised + CLUSTER_SIZE + 2 * step) as usize;
        data[second..][..4].copy_from_slice(b"BBBB");

        let reader = Arc::new(CountingReader::new(data));
        let blocks = BlockReader::new(reader.clone(), step);
        let out = blocks
            .read_file(advertised, 169, CLUSTER_SIZE as u32 + 4)
            .await
            .unwrap();

        assert_eq!(&out[..4], b"AAAA");
        assert_eq!(&out[CLUSTER_SIZE as usize..], b"BBBB");
        assert_eq!(reader.reads()[1].0, second as u64);
    }

    #[test]
    fn preallocation_is_bounded_by_source() {
        assert_eq!(capacity_hint(0x10000, 0xD000, 10), 10);
        assert_eq!(capacity_hint(0x10000, 0xD000, u32::MAX), 0x3000);
        assert_eq!(capacity_hint(0x10000, 0x20000, u32::MAX), 0);
    }

    #[tokio::test]
    async fn huge_declared_length_fails_after_source_ends() {
        let reader = Arc::new(CountingReader::new(vec![1u8; 3 * CLUSTER_SIZE as usize]));
        let blocks = BlockReader::new(reader.clone(), 0x1000);

        assert!(blocks.read_file(CLUSTER_SIZE, 1, u32::MAX).await.is_err());
        // two whole clusters, then one read that comes back empty
        assert_eq!(reader.reads().len(), 3);
    }

    #[tokio::test]
    async fn short_physical_read_fails_the_file() {
        let reader = Arc::new(MemoryReader::new(vec![0u8; 100]));
        let blocks = BlockReader::new(reader, 0x1000);
        assert!(blocks.read_file(0, 1, 200).await.is_err());
    }
}
