//! End-of-run success check
//!
//! After every worker has been joined, files nobody claimed mean the run is
//! incomplete. Claimed files whose batch failed are reported separately.

use crate::error::{Result, SyncError};
use crate::worker::AggregateStats;

/// Final verdict for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every file was handed to a transfer that succeeded
    Complete,

    /// Files were left unclaimed after all workers exited
    Incomplete { remaining: usize },

    /// Every file was claimed but some batches failed
    BatchesFailed { batches: u64, files: u64 },
}

impl Completion {
    /// Returns true if the run succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Complete)
    }

    /// Convert into the run's error, if any
    pub fn into_result(self) -> Result<()> {
        match self {
            Completion::Complete => Ok(()),
            Completion::Incomplete { remaining } => Err(SyncError::IncompleteTransfer { remaining }),
            Completion::BatchesFailed { batches, files } => {
                Err(SyncError::BatchesFailed { batches, files })
            }
        }
    }
}

/// Decides a run's outcome from what is left over
#[derive(Debug, Clone, Copy)]
pub struct CompletionTracker {
    expected_files: usize,
}

impl CompletionTracker {
    /// Track a run that started with `expected_files`
    pub fn new(expected_files: usize) -> Self {
        Self { expected_files }
    }

    /// Files that never went through a finished transfer
    ///
    /// That is files nobody claimed plus files claimed by a worker that
    /// died before its transfer returned. `queue_remaining` is the shared
    /// queue length in dynamic mode; in static mode it is `None` and the
    /// unclaimed count comes from the claims.
    pub fn residual(&self, queue_remaining: Option<usize>, stats: &AggregateStats) -> usize {
        let unclaimed = match queue_remaining {
            Some(len) => len,
            None => self.expected_files.saturating_sub(stats.files_claimed as usize),
        };
        let in_flight = stats
            .files_claimed
            .saturating_sub(stats.files + stats.failed_files);
        unclaimed + in_flight as usize
    }

    /// Final verdict once all workers are joined
    pub fn check(&self, queue_remaining: Option<usize>, stats: &AggregateStats) -> Completion {
        let remaining = self.residual(queue_remaining, stats);
        if remaining > 0 {
            Completion::Incomplete { remaining }
        } else if stats.failed_batches > 0 {
            Completion::BatchesFailed {
                batches: stats.failed_batches,
                files: stats.failed_files,
            }
        } else {
            Completion::Complete
        }
    }
}
