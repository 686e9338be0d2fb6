// Chunk partitioning for parallel passes.
//
// A pass over `[0, size)` is split into contiguous, non-overlapping chunks,
// one per worker. Chunk starts stay aligned for direct I/O; the last chunk
// absorbs the division remainder and is flagged for buffered writes when its
// length breaks alignment.

use crate::io::PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub len: u64,
    /// Offset and length are both alignment multiples, so a cache-bypassing
    /// writer may take this chunk. When false the writer falls back to
    /// buffered I/O instead of failing the job.
    pub aligned: bool,
}

impl Chunk {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Clamp a requested worker count to `[1, min(requested, online CPUs)]`.
pub fn clamp_workers(requested: usize, max_workers: usize) -> usize {
    let hardware = num_cpus::get().max(1);
    requested.min(hardware).min(max_workers.max(1)).max(1)
}

/// Partition `[0, size_bytes)` into at most `workers` chunks aligned to
/// `align` bytes. The chunks are returned in ascending offset order, cover
/// the range exactly once, and are never empty.
pub fn partition(size_bytes: u64, workers: usize, align: u64) -> Vec<Chunk> {
    if size_bytes == 0 {
        return Vec::new();
    }

    let workers = workers.max(1) as u64;
    let align = align.max(1);

    // Round the per-worker share down to the alignment so every interior
    // boundary stays aligned. Tiny targets collapse to fewer workers.
    let share = (size_bytes / workers) / align * align;
    if share == 0 {
        return vec![Chunk {
            start: 0,
            len: size_bytes,
            aligned: size_bytes % align == 0,
        }];
    }

    let mut chunks = Vec::with_capacity(workers as usize);
    let mut start = 0u64;
    for i in 0..workers {
        let len = if i == workers - 1 {
            size_bytes - start
        } else {
            share
        };
        chunks.push(Chunk {
            start,
            len,
            aligned: start % align == 0 && len % align == 0,
        });
        start += len;
    }

    chunks
}

/// Default partition alignment: one page, the strictest requirement the
/// direct write path has.
pub fn default_alignment() -> u64 {
    PAGE_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn partition_covers_range_exactly() {
        let chunks = partition(1024 * 1024, 4, 4096);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start, 0);
        let total: u64 = chunks.iter().map(|c| c.len).sum();
        assert_eq!(total, 1024 * 1024);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
        }
    }

    #[test]
    fn last_chunk_absorbs_remainder() {
        let size = 10 * 4096 + 513;
        let chunks = partition(size, 3, 4096);

        let total: u64 = chunks.iter().map(|c| c.len).sum();
        assert_eq!(total, size);

        let last = chunks.last().unwrap();
        assert!(!last.aligned, "remainder chunk must fall back to buffered");
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.aligned);
        }
    }

    #[test]
    fn tiny_target_collapses_to_single_chunk() {
        let chunks = partition(100, 8, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].len, 100);
        assert!(!chunks[0].aligned);
    }

    #[test]
    fn empty_target_yields_no_chunks() {
        assert!(partition(0, 4, 4096).is_empty());
    }

    #[test]
    fn single_worker_gets_the_whole_range() {
        let chunks = partition(5 * 1024 * 1024, 1, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len, 5 * 1024 * 1024);
        assert!(chunks[0].aligned);
    }

    #[test]
    fn clamp_workers_bounds() {
        assert_eq!(clamp_workers(0, 8), 1);
        assert!(clamp_workers(4, 8) >= 1);
        assert!(clamp_workers(1024, 8) <= 8);
        assert_eq!(clamp_workers(3, 1), 1);
    }

    proptest! {
        #[test]
        fn chunks_always_partition_exactly(
            size in 0u64..=(1u64 << 40),
            workers in 1usize..=64,
        ) {
            let chunks = partition(size, workers, 4096);

            let total: u64 = chunks.iter().map(|c| c.len).sum();
            prop_assert_eq!(total, size);

            let mut expected_start = 0u64;
            for chunk in &chunks {
                prop_assert_eq!(chunk.start, expected_start);
                prop_assert!(chunk.len > 0);
                expected_start = chunk.end();
            }
            prop_assert_eq!(expected_start, size);
            prop_assert!(chunks.len() <= workers.max(1));
        }

        #[test]
        fn interior_chunks_stay_aligned(
            size in 4096u64..=(1u64 << 36),
            workers in 1usize..=32,
        ) {
            let chunks = partition(size, workers, 4096);
            for chunk in chunks.iter().take(chunks.len().saturating_sub(1)) {
                prop_assert_eq!(chunk.start % 4096, 0);
                prop_assert_eq!(chunk.len % 4096, 0);
            }
        }
    }
}
