//! Worker thread logic for parallel transfers
//!
//! Each worker:
//! - Gets work from its source (one pre-assigned chunk, or repeated claims
//!   from the shared queue)
//! - Builds a transfer task with its own host and bandwidth share
//! - Blocks in the transfer primitive until the batch is done
//! - Reports the result to the coordinator and loops
//!
//! State machine: `Idle -> Claiming -> Transferring -> Idle ... -> Done`.
//! An empty claim is the only normal exit.

use crate::bandwidth::BandwidthShare;
use crate::config::SyncConfig;
use crate::error::{BatchOutcome, TransferError, WorkerError};
use crate::partition::Chunk;
use crate::queue::{Batch, WorkQueue};
use crate::transfer::{TransferExecutor, TransferTask};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Claiming = 1,
    Transferring = 2,
    Done = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Claiming,
            2 => WorkerState::Transferring,
            3 => WorkerState::Done,
            _ => WorkerState::Idle,
        }
    }
}

/// Where a worker gets its files
pub enum WorkSource {
    /// One pre-assigned chunk, consumed once
    Static(Option<Chunk>),

    /// Repeated claims from the shared queue
    Dynamic {
        queue: Arc<WorkQueue>,
        batch_size: usize,
    },
}

impl WorkSource {
    /// Wrap a pre-assigned chunk
    pub fn chunk(chunk: Chunk) -> Self {
        WorkSource::Static(Some(chunk))
    }

    /// Claim from a shared queue
    pub fn queue(queue: Arc<WorkQueue>, batch_size: usize) -> Self {
        WorkSource::Dynamic { queue, batch_size }
    }

    /// Next batch for this worker, or `None` when no work remains
    pub fn next_batch(&mut self, worker_id: usize) -> Option<Batch> {
        match self {
            WorkSource::Static(slot) => slot
                .take()
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| Batch {
                    worker_id,
                    files: chunk.files,
                    remaining: 0,
                }),
            WorkSource::Dynamic { queue, batch_size } => queue.claim_batch(worker_id, *batch_size),
        }
    }
}

/// Messages sent from workers to the coordinator
#[derive(Debug)]
pub enum WorkerEvent {
    /// A batch was copied
    BatchDone { worker: usize, files: usize, bytes: u64 },

    /// A batch failed; the worker keeps going
    BatchFailed {
        worker: usize,
        files: usize,
        error: TransferError,
    },

    /// The worker left its loop
    Finished { worker: usize },
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Files claimed (handed to this worker)
    pub files_claimed: AtomicU64,

    /// Batches copied successfully
    pub batches: AtomicU64,

    /// Files copied successfully
    pub files: AtomicU64,

    /// Bytes copied successfully
    pub bytes: AtomicU64,

    /// Batches whose transfer failed
    pub failed_batches: AtomicU64,

    /// Files in failed batches
    pub failed_files: AtomicU64,

    state: AtomicU8,
}

impl WorkerStats {
    fn record_claim(&self, files: usize) {
        self.files_claimed.fetch_add(files as u64, Ordering::Relaxed);
    }

    fn record_batch(&self, files: usize, bytes: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.files.fetch_add(files as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_failure(&self, files: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.failed_files.fetch_add(files as u64, Ordering::Relaxed);
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Everything a worker shares with its siblings, read-only
#[derive(Clone)]
pub struct WorkerContext {
    /// Run configuration
    pub config: Arc<SyncConfig>,

    /// Transfer primitive
    pub executor: Arc<dyn TransferExecutor>,

    /// Fixed per-worker bandwidth share
    pub bandwidth: BandwidthShare,

    /// Event channel to the coordinator
    pub events: Sender<WorkerEvent>,

    /// Stop claiming once set
    pub shutdown: Arc<AtomicBool>,
}

/// A worker thread that transfers batches
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, source: WorkSource, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("parsync-{}", id))
            .spawn(move || worker_loop(id, source, ctx, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Check if the thread has exited (normally or not)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    mut source: WorkSource,
    ctx: WorkerContext,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    info!(
        worker = id,
        endpoint = %ctx.config.remote_endpoint(id),
        "Worker starting"
    );

    let result = run_batches(id, &mut source, &ctx, &stats);

    stats.set_state(WorkerState::Done);
    trace!(worker = id, "Worker state: done");
    // The coordinator may already be gone during teardown
    let _ = ctx.events.send(WorkerEvent::Finished { worker: id });

    info!(
        worker = id,
        batches = stats.batches.load(Ordering::Relaxed),
        files = stats.files.load(Ordering::Relaxed),
        failed_batches = stats.failed_batches.load(Ordering::Relaxed),
        "Worker finished"
    );

    result
}

fn run_batches(
    id: usize,
    source: &mut WorkSource,
    ctx: &WorkerContext,
    stats: &WorkerStats,
) -> Result<(), WorkerError> {
    loop {
        if ctx.shutdown.load(Ordering::Relaxed) {
            debug!(worker = id, "Shutdown requested, no further claims");
            return Ok(());
        }

        stats.set_state(WorkerState::Claiming);
        trace!(worker = id, "Worker state: claiming");

        let Some(batch) = source.next_batch(id) else {
            debug!(worker = id, "No work left");
            return Ok(());
        };

        stats.record_claim(batch.len());
        debug!(worker = id, files = batch.len(), bytes = batch.total_size(), "Claimed batch");

        stats.set_state(WorkerState::Transferring);
        trace!(worker = id, "Worker state: transferring");

        match process_batch(id, &batch, ctx) {
            BatchOutcome::Transferred { files, bytes } => {
                stats.record_batch(files, bytes);
                let _ = ctx.events.send(WorkerEvent::BatchDone {
                    worker: id,
                    files,
                    bytes,
                });
            }
            BatchOutcome::Failed { files, error } => {
                warn!(worker = id, files = files, error = %error, "Batch failed");
                stats.record_failure(files);
                let _ = ctx.events.send(WorkerEvent::BatchFailed {
                    worker: id,
                    files,
                    error,
                });
            }
            BatchOutcome::Fatal { files, error } => {
                warn!(worker = id, files = files, error = %error, "Transfer unavailable, worker stopping");
                stats.record_failure(files);
                let _ = ctx.events.send(WorkerEvent::BatchFailed {
                    worker: id,
                    files,
                    error: error.clone(),
                });
                return Err(WorkerError::TransferUnavailable { id, source: error });
            }
        }

        stats.set_state(WorkerState::Idle);
        trace!(worker = id, "Worker state: idle");
    }
}

/// Build the transfer task for a batch
pub fn build_task(worker_id: usize, batch: &Batch, ctx: &WorkerContext) -> TransferTask {
    let config = &ctx.config;
    TransferTask {
        worker_id,
        direction: config.direction,
        remote_user: config.remote.user.clone(),
        remote_host: config.remote.host_for(config.host_index(worker_id)),
        remote_path: config.remote.path.clone(),
        local_path: config.local_path.clone(),
        bandwidth_limit_kbs: ctx.bandwidth.limit_kbs(),
        files: batch.files.iter().map(|f| f.path.clone()).collect(),
    }
}

/// Hand one batch to the transfer primitive
fn process_batch(worker_id: usize, batch: &Batch, ctx: &WorkerContext) -> BatchOutcome {
    let task = build_task(worker_id, batch, ctx);
    let files = batch.len();

    match ctx.executor.execute(&task) {
        Ok(outcome) => {
            trace!(
                worker = worker_id,
                files = outcome.files,
                secs = outcome.duration.as_secs_f64(),
                "Batch transferred"
            );
            BatchOutcome::Transferred {
                files,
                bytes: batch.total_size(),
            }
        }
        Err(error) if error.is_batch_local() => BatchOutcome::Failed { files, error },
        Err(error) => BatchOutcome::Fatal { files, error },
    }
}

/// Totals across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub files_claimed: u64,
    pub batches: u64,
    pub files: u64,
    pub bytes: u64,
    pub failed_batches: u64,
    pub failed_files: u64,
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> AggregateStats {
    workers.iter().fold(AggregateStats::default(), |mut acc, w| {
        let s = w.stats();
        acc.files_claimed += s.files_claimed.load(Ordering::Relaxed);
        acc.batches += s.batches.load(Ordering::Relaxed);
        acc.files += s.files.load(Ordering::Relaxed);
        acc.bytes += s.bytes.load(Ordering::Relaxed);
        acc.failed_batches += s.failed_batches.load(Ordering::Relaxed);
        acc.failed_files += s.failed_files.load(Ordering::Relaxed);
        acc
    })
}

/// Workers currently claiming or transferring
pub fn active_count(workers: &[Worker]) -> usize {
    workers
        .iter()
        .filter(|w| {
            matches!(
                w.stats().state(),
                WorkerState::Claiming | WorkerState::Transferring
            )
        })
        .count()
}
