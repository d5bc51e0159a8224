//! Shared work queue for dynamic scheduling
//!
//! Holds the files nobody has claimed yet, largest first. Workers take
//! batches from the front with [`WorkQueue::claim_batch`]; the lock is held
//! only for the removal itself, never across a transfer.
//!
//! The queue is filled once and only ever shrinks.

use crate::types::FileRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A slice of the queue owned by one worker for one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Worker that claimed it
    pub worker_id: usize,

    /// Claimed files, in queue order
    pub files: Vec<FileRecord>,

    /// Files left in the queue right after this claim
    pub remaining: usize,
}

impl Batch {
    /// Number of files in the batch
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Batches handed out by the queue are never empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total bytes in the batch
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Non-empty claims served
    pub claims: AtomicU64,

    /// Files handed out
    pub files_claimed: AtomicU64,

    /// Claims that found the queue empty
    pub empty_claims: AtomicU64,
}

impl QueueStats {
    /// Number of non-empty claims
    pub fn claim_count(&self) -> u64 {
        self.claims.load(Ordering::Relaxed)
    }

    /// Number of files handed out
    pub fn files_claimed(&self) -> u64 {
        self.files_claimed.load(Ordering::Relaxed)
    }

    /// Number of empty claims
    pub fn empty_claim_count(&self) -> u64 {
        self.empty_claims.load(Ordering::Relaxed)
    }
}

struct Inner {
    files: VecDeque<FileRecord>,
    remaining_bytes: u64,
}

/// Work queue shared by all dynamic-mode workers
pub struct WorkQueue {
    inner: Mutex<Inner>,
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a queue holding `files` in the given order
    pub fn new(files: Vec<FileRecord>) -> Self {
        let remaining_bytes = files.iter().map(|f| f.size).sum();
        Self {
            inner: Mutex::new(Inner {
                files: files.into(),
                remaining_bytes,
            }),
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Atomically remove up to `max_count` files from the front
    ///
    /// Returns `None` once the queue is empty (or `max_count` is zero).
    /// Concurrent callers never receive overlapping files.
    pub fn claim_batch(&self, worker_id: usize, max_count: usize) -> Option<Batch> {
        let (files, remaining) = {
            let mut inner = self.inner.lock();
            let take = max_count.min(inner.files.len());
            let files: Vec<FileRecord> = inner.files.drain(..take).collect();
            let bytes: u64 = files.iter().map(|f| f.size).sum();
            inner.remaining_bytes -= bytes;
            (files, inner.files.len())
        };

        if files.is_empty() {
            self.stats.empty_claims.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.stats.claims.fetch_add(1, Ordering::Relaxed);
        self.stats
            .files_claimed
            .fetch_add(files.len() as u64, Ordering::Relaxed);

        Some(Batch {
            worker_id,
            files,
            remaining,
        })
    }

    /// Files not yet claimed
    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    /// Check if every file has been claimed
    pub fn is_empty(&self) -> bool {
        self.inner.lock().files.is_empty()
    }

    /// Bytes not yet claimed
    pub fn remaining_bytes(&self) -> u64 {
        self.inner.lock().remaining_bytes
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}
