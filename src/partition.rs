//! Static size-balanced partitioning
//!
//! Greedy bin-packing, largest file first, into the least-loaded chunk
//! (ties go to the lowest worker index). Chunks handed to odd-numbered
//! workers are reversed so half the pool starts small and ends large,
//! which staggers the tails of an imperfect split.

use crate::types::FileRecord;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

/// A pre-assigned, worker-owned list of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Worker this chunk belongs to (0..N-1)
    pub id: usize,

    /// Sum of the sizes of `files`
    pub total_size: u64,

    /// Files in transfer order
    pub files: Vec<FileRecord>,
}

impl Chunk {
    fn new(id: usize) -> Self {
        Self {
            id,
            total_size: 0,
            files: Vec::new(),
        }
    }

    fn push(&mut self, file: FileRecord) {
        self.total_size += file.size;
        self.files.push(file);
    }

    /// Number of files in the chunk
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// An empty chunk leaves its worker idle
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Split files (sorted largest first) into `workers` balanced chunks
///
/// Always returns exactly `workers` chunks; some may be empty.
pub fn partition(files: Vec<FileRecord>, workers: usize) -> Vec<Chunk> {
    let workers = workers.max(1);
    let mut chunks: Vec<Chunk> = (0..workers).map(Chunk::new).collect();

    // Min-heap on (running total, worker index)
    let mut loads: BinaryHeap<Reverse<(u64, usize)>> =
        (0..workers).map(|id| Reverse((0, id))).collect();

    for file in files {
        let Some(Reverse((load, id))) = loads.pop() else {
            break;
        };
        let size = file.size;
        chunks[id].push(file);
        loads.push(Reverse((load + size, id)));
    }

    for chunk in chunks.iter_mut().filter(|c| c.id % 2 == 1) {
        chunk.files.reverse();
    }

    debug!(
        workers = workers,
        spread = partition_spread(&chunks),
        "Partitioned files into chunks"
    );

    chunks
}

/// Difference between the heaviest and the lightest chunk
pub fn partition_spread(chunks: &[Chunk]) -> u64 {
    let max = chunks.iter().map(|c| c.total_size).max().unwrap_or(0);
    let min = chunks.iter().map(|c| c.total_size).min().unwrap_or(0);
    max - min
}
