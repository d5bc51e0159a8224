//! Sync coordinator - orchestrates the parallel transfer
//!
//! The coordinator is responsible for:
//! - Computing the per-worker bandwidth share
//! - Partitioning files (static) or filling the shared queue (dynamic)
//! - Spawning a fixed pool of workers and waiting for all of them
//! - Progress reporting while workers run
//! - The final completion check

use crate::bandwidth::BandwidthShare;
use crate::completion::{Completion, CompletionTracker};
use crate::config::{Mode, SyncConfig};
use crate::error::Result;
use crate::partition::{partition, partition_spread};
use crate::queue::WorkQueue;
use crate::transfer::TransferExecutor;
use crate::types::{total_size, FileRecord};
use crate::worker::{
    active_count, aggregate_stats, WorkSource, Worker, WorkerContext, WorkerEvent,
};
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often progress is refreshed while waiting for workers
const TICK: Duration = Duration::from_millis(100);

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Scheduling mode used
    pub mode: Mode,

    /// Workers started
    pub workers: usize,

    /// Files in the workload
    pub total_files: usize,

    /// Bytes in the workload
    pub total_bytes: u64,

    /// Files copied successfully
    pub files_transferred: u64,

    /// Bytes copied successfully
    pub bytes_transferred: u64,

    /// Batches copied successfully
    pub batches: u64,

    /// Batches that failed
    pub failed_batches: u64,

    /// Files that never went through a finished transfer
    pub residual: usize,

    /// Bandwidth share each worker ran with
    pub bandwidth: BandwidthShare,

    /// When the run started
    pub started_at: DateTime<Local>,

    /// Time taken
    pub duration: Duration,

    /// Final verdict
    pub completion: Completion,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct SyncProgress {
    /// Files copied so far
    pub files: u64,

    /// Bytes copied so far
    pub bytes: u64,

    /// Files in the workload
    pub total_files: usize,

    /// Bytes in the workload
    pub total_bytes: u64,

    /// Batches that failed so far
    pub failed_batches: u64,

    /// Files still in the shared queue (dynamic mode)
    pub queue_remaining: Option<usize>,

    /// Workers claiming or transferring
    pub active_workers: usize,

    /// Workers started
    pub total_workers: usize,

    /// Elapsed time
    pub elapsed: Duration,
}

impl SyncProgress {
    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }

    /// Calculate bytes per second rate
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Coordinates the parallel transfer
pub struct SyncCoordinator {
    /// Configuration
    config: Arc<SyncConfig>,

    /// Transfer primitive shared by all workers
    executor: Arc<dyn TransferExecutor>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl SyncCoordinator {
    /// Create a new coordinator
    pub fn new(config: SyncConfig, executor: Arc<dyn TransferExecutor>) -> Self {
        Self {
            config: Arc::new(config),
            executor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the transfer without progress output
    pub fn run(&self, files: Vec<FileRecord>) -> Result<SyncResult> {
        self.run_with_progress(files, |_| {})
    }

    /// Run the transfer, calling `on_progress` periodically until all
    /// workers have exited
    ///
    /// `files` must already be sorted largest first.
    pub fn run_with_progress<F>(
        &self,
        files: Vec<FileRecord>,
        mut on_progress: F,
    ) -> Result<SyncResult>
    where
        F: FnMut(&SyncProgress),
    {
        let start_time = Instant::now();
        let started_at = Local::now();

        let total_files = files.len();
        let total_bytes = total_size(&files);
        let worker_count = self.config.worker_count;
        let bandwidth = BandwidthShare::allocate(self.config.total_bandwidth_mbps, worker_count);
        let tracker = CompletionTracker::new(total_files);

        info!(
            mode = %self.config.mode,
            workers = worker_count,
            files = total_files,
            bytes = total_bytes,
            bandwidth = %bandwidth,
            "Starting parallel transfer"
        );

        let (sources, queue) = self.build_sources(files);

        let (events_tx, events_rx) = unbounded();
        let ctx = WorkerContext {
            config: Arc::clone(&self.config),
            executor: Arc::clone(&self.executor),
            bandwidth,
            events: events_tx,
            shutdown: Arc::clone(&self.shutdown),
        };

        let mut workers = Vec::with_capacity(worker_count);
        let mut spawn_error = None;
        for (id, source) in sources.into_iter().enumerate() {
            match Worker::spawn(id, source, ctx.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    warn!(worker = id, error = %e, "Worker could not be started");
                    spawn_error = Some(e);
                }
            }
        }
        // Only workers hold senders from here on
        drop(ctx);

        if workers.is_empty() {
            if let Some(e) = spawn_error {
                return Err(e.into());
            }
        }

        info!(count = workers.len(), "Workers spawned");

        let mut progress = SyncProgress {
            total_files,
            total_bytes,
            total_workers: workers.len(),
            ..Default::default()
        };

        self.wait_for_workers(
            &workers,
            &events_rx,
            queue.as_deref(),
            &mut progress,
            start_time,
            &mut on_progress,
        );

        let stats = aggregate_stats(&workers);
        for worker in workers.drain(..) {
            let id = worker.id();
            if let Err(e) = worker.join() {
                warn!(worker = id, error = %e, "Worker failed to join cleanly");
            }
        }

        let queue_remaining = queue.as_ref().map(|q| q.len());
        let completion = tracker.check(queue_remaining, &stats);
        let residual = tracker.residual(queue_remaining, &stats);
        let duration = start_time.elapsed();

        if let Some(ref queue) = queue {
            let queue_stats = queue.stats();
            info!(
                claims = queue_stats.claim_count(),
                files_claimed = queue_stats.files_claimed(),
                empty_claims = queue_stats.empty_claim_count(),
                remaining_files = queue.len(),
                remaining_bytes = queue.remaining_bytes(),
                "Queue drained"
            );
        }

        info!(
            files = stats.files,
            bytes = stats.bytes,
            batches = stats.batches,
            failed_batches = stats.failed_batches,
            residual = residual,
            duration_secs = duration.as_secs(),
            "Transfer finished"
        );

        Ok(SyncResult {
            mode: self.config.mode,
            workers: worker_count,
            total_files,
            total_bytes,
            files_transferred: stats.files,
            bytes_transferred: stats.bytes,
            batches: stats.batches,
            failed_batches: stats.failed_batches,
            residual,
            bandwidth,
            started_at,
            duration,
            completion,
        })
    }

    /// One work source per worker, plus the shared queue in dynamic mode
    fn build_sources(&self, files: Vec<FileRecord>) -> (Vec<WorkSource>, Option<Arc<WorkQueue>>) {
        let workers = self.config.worker_count;

        match self.config.mode {
            Mode::Static => {
                let chunks = partition(files, workers);
                info!(spread = partition_spread(&chunks), "Static chunks assigned");
                for chunk in &chunks {
                    debug!(worker = chunk.id, files = chunk.len(), bytes = chunk.total_size, "Chunk");
                }
                (chunks.into_iter().map(WorkSource::chunk).collect(), None)
            }
            Mode::Dynamic => {
                let queue = Arc::new(WorkQueue::new(files));
                let sources = (0..workers)
                    .map(|_| WorkSource::queue(Arc::clone(&queue), self.config.batch_size))
                    .collect();
                (sources, Some(queue))
            }
        }
    }

    /// Block until every worker has exited, refreshing progress
    fn wait_for_workers<F>(
        &self,
        workers: &[Worker],
        events: &Receiver<WorkerEvent>,
        queue: Option<&WorkQueue>,
        progress: &mut SyncProgress,
        start_time: Instant,
        on_progress: &mut F,
    ) where
        F: FnMut(&SyncProgress),
    {
        let mut finished = 0;

        while finished < workers.len() {
            match events.recv_timeout(TICK) {
                Ok(event) => finished += apply_event(progress, event),
                // All senders gone: every worker thread has ended
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    // A panicked worker never sends Finished
                    if workers.iter().all(Worker::is_finished) {
                        break;
                    }
                }
            }

            progress.queue_remaining = queue.map(WorkQueue::len);
            progress.active_workers = active_count(workers);
            progress.elapsed = start_time.elapsed();
            on_progress(progress);
        }

        for event in events.try_iter() {
            apply_event(progress, event);
        }

        if self.shutdown.load(Ordering::Relaxed) {
            info!("Shutdown signal received, workers stopped claiming");
        }
    }
}

/// Fold a worker event into the progress totals; returns 1 for `Finished`
fn apply_event(progress: &mut SyncProgress, event: WorkerEvent) -> usize {
    match event {
        WorkerEvent::BatchDone { files, bytes, .. } => {
            progress.files += files as u64;
            progress.bytes += bytes;
            0
        }
        WorkerEvent::BatchFailed { .. } => {
            progress.failed_batches += 1;
            0
        }
        WorkerEvent::Finished { worker } => {
            debug!(worker = worker, "Worker exited");
            1
        }
    }
}
