//! Integration tests for parsync
//!
//! The transfer primitive and the dry-run listing are replaced with
//! in-process fakes, so these run without rsync or a remote host.

use clap::Parser;
use parking_lot::Mutex;
use parsync::completion::Completion;
use parsync::config::{CliArgs, Mode, SyncConfig};
use parsync::coordinator::SyncCoordinator;
use parsync::enumerate::{load_workload, ListingRequest, ListingSource, Workload};
use parsync::error::{EnumResult, SyncError, TransferError, TransferResult};
use parsync::transfer::{TransferExecutor, TransferOutcome, TransferTask};
use parsync::types::{Direction, FileRecord};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Records every task and fails the ones `fail` picks
struct FakeRsync {
    tasks: Mutex<Vec<TransferTask>>,
    fail: Box<dyn Fn(&TransferTask) -> Option<TransferError> + Send + Sync>,
    delay: Duration,
}

impl FakeRsync {
    fn ok() -> Arc<Self> {
        Self::failing(|_| None)
    }

    fn failing(
        fail: impl Fn(&TransferTask) -> Option<TransferError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(Vec::new()),
            fail: Box::new(fail),
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(Vec::new()),
            fail: Box::new(|_| None),
            delay,
        })
    }

    fn tasks(&self) -> Vec<TransferTask> {
        self.tasks.lock().clone()
    }

    fn sent_paths(&self) -> Vec<String> {
        self.tasks()
            .into_iter()
            .flat_map(|t| t.files)
            .collect()
    }
}

impl TransferExecutor for FakeRsync {
    fn execute(&self, task: &TransferTask) -> TransferResult<TransferOutcome> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.tasks.lock().push(task.clone());
        match (self.fail)(task) {
            Some(e) => Err(e),
            None => Ok(TransferOutcome {
                files: task.files.len(),
                duration: self.delay,
            }),
        }
    }
}

/// Returns a canned dry-run listing
struct CannedListing(&'static str);

impl ListingSource for CannedListing {
    fn list(&self, _request: &ListingRequest) -> EnumResult<String> {
        Ok(self.0.to_string())
    }
}

fn config(flags: &[&str]) -> SyncConfig {
    let mut argv = vec!["parsync", "--quiet"];
    argv.extend_from_slice(flags);
    let args = CliArgs::try_parse_from(argv).unwrap();
    SyncConfig::from_args(args).unwrap()
}

fn files(sizes: &[(u64, &str)]) -> Vec<FileRecord> {
    match Workload::from_records(sizes.iter().map(|&(s, p)| FileRecord::new(s, p)).collect()) {
        Workload::Files(files) => files,
        Workload::Empty => Vec::new(),
    }
}

fn many_files(count: usize) -> Vec<FileRecord> {
    let records = (0..count)
        .map(|i| FileRecord::new((i as u64 * 7919) % 1000 + 1, format!("dir/file-{i}")))
        .collect();
    match Workload::from_records(records) {
        Workload::Files(files) => files,
        Workload::Empty => Vec::new(),
    }
}

#[test]
fn test_cli_flags_end_to_end() {
    let cfg = config(&[
        "--parallel=4",
        "--hosts=1",
        "--total_bw=800",
        "--batch_size=25",
        "--",
        "-a",
        "--delete",
        "/data/",
        "backup@node{}:/srv/data/",
    ]);

    assert_eq!(cfg.mode, Mode::Dynamic);
    assert_eq!(cfg.worker_count, 4);
    assert_eq!(cfg.batch_size, 25);
    assert_eq!(cfg.total_bandwidth_mbps, Some(800));
    assert_eq!(cfg.direction, Direction::Upload);
    assert_eq!(cfg.rsync_options, vec!["-a", "--delete"]);
    assert_eq!(
        cfg.endpoints(2),
        ("/data/".to_string(), "backup@node3:/srv/data/".to_string())
    );
}

#[test]
fn test_invalid_cli_is_rejected() {
    let args = CliArgs::try_parse_from(["parsync", "--parallel=0", "--", "/a/", "h:/b/"]).unwrap();
    assert!(SyncConfig::from_args(args).is_err());

    let args = CliArgs::try_parse_from(["parsync", "--parallel=2", "--", "/a/", "/b/"]).unwrap();
    assert!(SyncConfig::from_args(args).is_err());

    let args = CliArgs::try_parse_from(["parsync", "--parallel=2", "--", "a:/x/", "b:/y/"]).unwrap();
    assert!(SyncConfig::from_args(args).is_err());
}

#[test]
fn test_empty_enumeration_is_nothing_to_do() {
    let cfg = config(&["--parallel=2", "--", "-a", "/data/", "store:/data/"]);
    let listing = CannedListing("sending incremental file list\n4096 ./\n4096 sub/\n\nsent 12 bytes  received 8 bytes\n");

    let workload = load_workload(&cfg, &listing).unwrap();
    assert_eq!(workload, Workload::Empty);
    assert!(workload.is_empty());
}

#[test]
fn test_dry_run_listing_feeds_workload() {
    let cfg = config(&["--parallel=2", "--", "-a", "/data/", "store:/data/"]);
    let listing = CannedListing(
        "sending incremental file list\n\
         4,096 ./\n\
         10 small.txt\n\
         4,096 big.bin\n\
         4,096 sub/\n\
         200 sub/mid.dat\n\
         total size is 4,306  speedup is 1.00 (DRY RUN)\n",
    );

    let Workload::Files(files) = load_workload(&cfg, &listing).unwrap() else {
        panic!("expected files");
    };
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["big.bin", "sub/mid.dat", "small.txt"]);
    assert_eq!(files[0].size, 4096);
}

#[test]
fn test_files_from_skips_listing() {
    let mut list = NamedTempFile::new().unwrap();
    writeln!(list, "100 a.txt").unwrap();
    writeln!(list, "5000 b.txt").unwrap();
    writeln!(list, "c.txt").unwrap();
    list.flush().unwrap();

    let path = list.path().to_str().unwrap().to_string();
    let files_from = format!("--files-from={path}");
    let cfg = config(&["--parallel=2", &files_from, "--", "/data/", "store:/data/"]);

    // A listing that would fail to parse proves it is never consulted
    let listing = CannedListing("garbage that is not a listing\n");
    let workload = load_workload(&cfg, &listing).unwrap();

    let Workload::Files(files) = workload else {
        panic!("expected files");
    };
    assert_eq!(files[0], FileRecord::new(5000, "b.txt"));
    assert_eq!(files.len(), 3);
}

#[test]
fn test_dynamic_two_workers_batch_two() {
    let cfg = config(&["--parallel=2", "--batch_size=2", "--", "-a", "/data/", "store:/data/"]);
    let executor = FakeRsync::ok();
    let coordinator = SyncCoordinator::new(cfg, executor.clone());

    let input = files(&[(50, "e"), (40, "d"), (30, "c"), (20, "b"), (10, "a")]);
    let result = coordinator.run(input).unwrap();

    assert_eq!(result.completion, Completion::Complete);
    assert_eq!(result.residual, 0);
    assert_eq!(result.files_transferred, 5);
    assert_eq!(result.bytes_transferred, 150);
    assert_eq!(result.batches, 3);

    let mut sizes: Vec<usize> = executor.tasks().iter().map(|t| t.files.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 2]);

    let mut sent = executor.sent_paths();
    sent.sort();
    assert_eq!(sent, vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn test_dynamic_every_file_sent_exactly_once() {
    let cfg = config(&["--parallel=8", "--batch_size=7", "--", "/data/", "store:/data/"]);
    let executor = FakeRsync::slow(Duration::from_micros(200));
    let coordinator = SyncCoordinator::new(cfg, executor.clone());

    let result = coordinator.run(many_files(1000)).unwrap();
    assert!(result.completion.is_success());

    let sent = executor.sent_paths();
    assert_eq!(sent.len(), 1000);
    let unique: HashSet<_> = sent.iter().collect();
    assert_eq!(unique.len(), 1000);

    for task in executor.tasks() {
        assert!(!task.files.is_empty());
        assert!(task.files.len() <= 7);
    }
}

#[test]
fn test_static_partition_reaches_workers() {
    let cfg = config(&["--mode=static", "--parallel=2", "--", "/data/", "store:/data/"]);
    let executor = FakeRsync::ok();
    let coordinator = SyncCoordinator::new(cfg, executor.clone());

    let input = files(&[(100, "d"), (200, "a"), (50, "b"), (150, "c")]);
    let result = coordinator.run(input).unwrap();

    assert_eq!(result.completion, Completion::Complete);
    assert_eq!(result.batches, 2);

    let tasks = executor.tasks();
    let by_worker = |id: usize| {
        tasks
            .iter()
            .find(|t| t.worker_id == id)
            .map(|t| t.files.clone())
            .unwrap()
    };
    assert_eq!(by_worker(0), vec!["a", "b"]);
    assert_eq!(by_worker(1), vec!["d", "c"]);
}

#[test]
fn test_hosts_and_bandwidth_reach_each_task() {
    let cfg = config(&[
        "--parallel=4",
        "--hosts=1",
        "--total_bw=800",
        "--batch_size=1",
        "--",
        "/data/",
        "node{}:/data/",
    ]);
    let executor = FakeRsync::ok();
    let coordinator = SyncCoordinator::new(cfg, executor.clone());

    let result = coordinator.run(many_files(40)).unwrap();
    assert!(result.completion.is_success());
    assert!(result.bandwidth.is_limited());

    for task in executor.tasks() {
        assert_eq!(task.remote_host, format!("node{}", task.worker_id + 1));
        assert_eq!(task.bandwidth_limit_kbs, 200 * 125);
    }
}

#[test]
fn test_failed_batches_make_run_fail() {
    let cfg = config(&["--parallel=2", "--batch_size=1", "--", "/data/", "store:/data/"]);
    let executor = FakeRsync::failing(|task| {
        task.files.iter().any(|f| f == "bad").then(|| TransferError::ExitStatus {
            endpoint: task.remote_endpoint(),
            code: Some(23),
        })
    });
    let coordinator = SyncCoordinator::new(cfg, executor.clone());

    let input = files(&[(30, "x"), (20, "bad"), (10, "y")]);
    let result = coordinator.run(input).unwrap();

    // The failure is local to its batch; the rest still goes out
    assert_eq!(result.residual, 0);
    assert_eq!(result.files_transferred, 2);
    assert_eq!(
        result.completion,
        Completion::BatchesFailed { batches: 1, files: 1 }
    );
    assert!(matches!(
        result.completion.into_result(),
        Err(SyncError::BatchesFailed { batches: 1, files: 1 })
    ));
}

#[test]
fn test_unstartable_transfer_leaves_residual() {
    let cfg = config(&["--parallel=2", "--batch_size=2", "--", "/data/", "store:/data/"]);
    let executor = FakeRsync::failing(|_| {
        Some(TransferError::Spawn {
            program: "rsync".into(),
            reason: "No such file or directory".into(),
        })
    });
    let coordinator = SyncCoordinator::new(cfg, executor.clone());

    let result = coordinator.run(many_files(10)).unwrap();

    // Each worker stops after its first claim
    assert_eq!(executor.tasks().len(), 2);
    assert_eq!(result.residual, 6);
    assert_eq!(result.completion, Completion::Incomplete { remaining: 6 });
    assert!(matches!(
        result.completion.into_result(),
        Err(SyncError::IncompleteTransfer { remaining: 6 })
    ));
}

#[test]
fn test_shutdown_before_start_claims_nothing() {
    let cfg = config(&["--parallel=3", "--", "/data/", "store:/data/"]);
    let executor = FakeRsync::ok();
    let coordinator = SyncCoordinator::new(cfg, executor.clone());
    coordinator
        .shutdown_flag()
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let result = coordinator.run(many_files(20)).unwrap();

    assert!(executor.tasks().is_empty());
    assert_eq!(result.completion, Completion::Incomplete { remaining: 20 });
}

#[test]
fn test_progress_callback_sees_totals() {
    let cfg = config(&["--parallel=2", "--batch_size=3", "--", "/data/", "store:/data/"]);
    let executor = FakeRsync::slow(Duration::from_millis(5));
    let coordinator = SyncCoordinator::new(cfg, executor);

    let mut last = None;
    let result = coordinator
        .run_with_progress(many_files(30), |p| last = Some(p.clone()))
        .unwrap();

    let last = last.expect("progress reported at least once");
    assert_eq!(last.total_files, 30);
    assert_eq!(last.total_workers, 2);
    assert_eq!(last.files, result.files_transferred);
    assert_eq!(last.queue_remaining, Some(0));
}

#[test]
fn test_source_without_slash_transfers_from_parent() {
    let cfg = config(&["--parallel=2", "--", "-a", "/srv/data", "store:/backup/"]);
    let listing = CannedListing(
        "sending incremental file list\n\
         4096 data/\n\
         300 data/a.bin\n\
         100 data/b.bin\n",
    );
    let Workload::Files(files) = load_workload(&cfg, &listing).unwrap() else {
        panic!("expected files");
    };

    let executor = FakeRsync::ok();
    let coordinator = SyncCoordinator::new(cfg, executor.clone());
    let result = coordinator.run(files).unwrap();
    assert!(result.completion.is_success());

    // Listed names start with `data/`, so they must resolve from `/srv/`
    for task in executor.tasks() {
        assert_eq!(task.endpoints(), ("/srv/".to_string(), "store:/backup/".to_string()));
        assert!(task.files.iter().all(|f| f.starts_with("data/")));
    }
}

#[test]
fn test_host_placeholder_without_hosts_is_rejected() {
    let args = CliArgs::try_parse_from(["parsync", "--parallel=2", "--", "/a/", "node{}:/b/"]).unwrap();
    assert!(SyncConfig::from_args(args).is_err());

    let args = CliArgs::try_parse_from(["parsync", "--parallel=2", "--", "/a/", "node::module"]).unwrap();
    assert!(SyncConfig::from_args(args).is_err());
}
