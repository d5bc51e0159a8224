//! parsync - Parallel rsync Scheduler
//!
//! Splits one large rsync transfer into many concurrent rsync invocations
//! so that total wall-clock time is minimized and every file is sent
//! exactly once.
//!
//! # Features
//!
//! - **Dry-run Enumeration**: Asks rsync what it would send and sorts the
//!   result by size, largest first.
//!
//! - **Static Mode**: Greedy bin-packing pre-assigns one size-balanced chunk
//!   per worker.
//!
//! - **Dynamic Mode**: Workers claim small batches from one shared queue
//!   until it runs dry, so fast workers naturally take more.
//!
//! - **Bandwidth Share**: An optional total budget is split evenly between
//!   workers at startup.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────────────────────────┐
//!              │        rsync --dry-run listing       │
//!              └──────────────────┬───────────────────┘
//!                                 │ <size> <path>
//!                                 ▼
//!              ┌──────────────────────────────────────┐
//!              │  Enumerator (sorted, largest first)  │
//!              └─────────┬──────────────────┬─────────┘
//!                 static │                  │ dynamic
//!                        ▼                  ▼
//!              ┌──────────────────┐ ┌──────────────────────┐
//!              │   Partitioner    │ │  Work Queue (mutex)  │
//!              │  N fixed chunks  │ │  claim_batch(K)      │
//!              └────────┬─────────┘ └──────────┬───────────┘
//!                       └──────────┬───────────┘
//!       ┌─────────────┬────────────┼────────────┬─────────────┐
//!       ▼             ▼            ▼            ▼             ▼
//!  ┌─────────┐   ┌─────────┐  ┌─────────┐  ┌─────────┐   ┌─────────┐
//!  │Worker 0 │   │Worker 1 │  │Worker 2 │  │   ...   │   │Worker N │
//!  │  rsync  │   │  rsync  │  │  rsync  │  │         │   │  rsync  │
//!  └────┬────┘   └────┬────┘  └────┬────┘  └────┬────┘   └────┬────┘
//!       └─────────────┴────────────┼────────────┴─────────────┘
//!                                  ▼
//!                       ┌──────────────────────┐
//!                       │   Completion check   │
//!                       │  (residual == 0 ?)   │
//!                       └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Eight workers pulling batches of 10 files
//! parsync --parallel=8 -- -a /data/ backup@store:/srv/data/
//!
//! # Four hosts node1..node4 sharing 800 Mbit/s
//! parsync --parallel=4 --hosts=1 --total_bw=800 -- -a /data/ node{}:/data/
//! ```

pub mod bandwidth;
pub mod completion;
pub mod config;
pub mod coordinator;
pub mod enumerate;
pub mod error;
pub mod partition;
pub mod progress;
pub mod queue;
pub mod transfer;
pub mod types;
pub mod worker;

pub use bandwidth::BandwidthShare;
pub use completion::{Completion, CompletionTracker};
pub use config::{CliArgs, Mode, RemoteSpec, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncProgress, SyncResult};
pub use enumerate::{ListingRequest, ListingSource, RsyncDryRun, Workload};
pub use error::{Result, SyncError};
pub use partition::{partition, Chunk};
pub use queue::{Batch, WorkQueue};
pub use transfer::{RsyncExecutor, TransferExecutor, TransferOutcome, TransferTask};
pub use types::{Direction, FileRecord};
