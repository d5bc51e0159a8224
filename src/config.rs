//! Configuration types for parsync
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Remote endpoint (`[user@]host:/path`) parsing

use crate::error::ConfigError;
use crate::types::Direction;
use clap::{Parser, ValueEnum};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 256;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 100_000;

/// Default files per dynamic claim
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Regex for parsing remote endpoints
static REMOTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: host:/path, user@host:/path, host:relative
    Regex::new(r"^(?:([^@:/\s]+)@)?([^@:/\s]+):(.*)$").expect("Invalid remote regex")
});

/// rsync options whose value is the following argument when written without `=`
const OPTIONS_WITH_VALUE: &[&str] = &[
    "-e",
    "--rsh",
    "-f",
    "--filter",
    "--exclude",
    "--include",
    "--exclude-from",
    "--include-from",
    "-T",
    "--temp-dir",
    "-B",
    "--block-size",
    "--chmod",
    "--chown",
    "--port",
    "--password-file",
    "--rsync-path",
    "--partial-dir",
    "--log-file",
    "--timeout",
    "--compare-dest",
    "--copy-dest",
    "--link-dest",
    "--backup-dir",
    "--suffix",
    "--max-size",
    "--min-size",
    "--modify-window",
    "--bwlimit",
    "--info",
    "--debug",
    "--out-format",
    "--log-file-format",
    "--max-delete",
    "--iconv",
    "--usermap",
    "--groupmap",
    "--skip-compress",
    "--compress-level",
    "--compress-choice",
    "--checksum-choice",
    "--address",
    "--sockopts",
    "--contimeout",
    "--protocol",
    "-M",
    "--remote-option",
];

/// Parallel rsync with size-balanced scheduling
#[derive(Parser, Debug, Clone)]
#[command(
    name = "parsync",
    version,
    about = "Parallel rsync with size-balanced scheduling",
    long_about = "Splits a transfer into many rsync invocations running in parallel.\n\n\
                  Files are listed with an rsync dry run, sorted by size, and either\n\
                  pre-assigned to workers with greedy bin-packing (static mode) or\n\
                  claimed from a shared queue in small batches (dynamic mode).",
    after_help = "EXAMPLES:\n    \
        parsync --parallel=8 -- -a /data/ backup@store:/srv/data/\n    \
        parsync --parallel=4 --hosts=1 --total_bw=800 -- -a /data/ node{}:/data/\n    \
        parsync --mode static -- -a store:/archive/ /restore/\n    \
        parsync --parallel=4 --files-from=list.txt -- -a /data/ store:/data/"
)]
pub struct CliArgs {
    /// Number of parallel workers (required in dynamic mode)
    #[arg(short = 'P', long, value_name = "N")]
    pub parallel: Option<usize>,

    /// First host index; worker i talks to host number START_INDEX + i
    #[arg(long, value_name = "START_INDEX")]
    pub hosts: Option<usize>,

    /// Total bandwidth budget in Mbit/s, shared evenly between workers
    #[arg(long = "total_bw", alias = "total-bw", value_name = "MBPS")]
    pub total_bw: Option<u64>,

    /// Files per claim in dynamic mode
    #[arg(
        long = "batch_size",
        alias = "batch-size",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_name = "SIZE"
    )]
    pub batch_size: usize,

    /// Read the file list from FILE instead of running a dry-run listing
    #[arg(long = "files-from", value_name = "FILE")]
    pub files_from: Option<PathBuf>,

    /// Scheduling mode
    #[arg(long, value_enum, default_value_t = Mode::Dynamic)]
    pub mode: Mode,

    /// Transfer program to invoke
    #[arg(long, default_value = "rsync", value_name = "PATH")]
    pub rsync: String,

    /// Quiet mode - suppress header, progress and summary
    #[arg(long)]
    pub quiet: bool,

    /// Verbose logging
    #[arg(long)]
    pub verbose: bool,

    /// Arguments passed through to rsync (options, source, destination)
    #[arg(
        value_name = "RSYNC_ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub rsync_args: Vec<String>,
}

/// How files are handed to workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Pre-assign size-balanced chunks, one per worker
    Static,
    /// Workers claim batches from a shared queue
    Dynamic,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Static => write!(f, "static"),
            Mode::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Parsed remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    /// Optional login user
    pub user: Option<String>,

    /// Host name, possibly containing a `{}` index placeholder
    pub host: String,

    /// Path on the remote host
    pub path: String,
}

impl RemoteSpec {
    /// Parse a remote endpoint string
    ///
    /// Accepts formats:
    /// - host:/path
    /// - user@host:/path
    /// - host:relative/path
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let caps = REMOTE_REGEX
            .captures(spec)
            .ok_or_else(|| ConfigError::InvalidRemote {
                spec: spec.to_string(),
                reason: "Expected format: [user@]host:/path".into(),
            })?;

        let user = caps.get(1).map(|m| m.as_str().to_string());
        let host = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ConfigError::InvalidRemote {
                spec: spec.to_string(),
                reason: "Missing host".into(),
            })?;
        let path = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

        if path.starts_with("//") {
            return Err(ConfigError::InvalidRemote {
                spec: spec.to_string(),
                reason: "URL-style endpoints are not supported".into(),
            });
        }

        if path.starts_with(':') {
            return Err(ConfigError::InvalidRemote {
                spec: spec.to_string(),
                reason: "rsync daemon (host::module) endpoints are not supported".into(),
            });
        }

        Ok(Self {
            user,
            host,
            path: path.to_string(),
        })
    }

    /// Check whether an argument looks like a remote endpoint
    ///
    /// A colon before the first slash marks rsync's remote syntax.
    pub fn looks_remote(arg: &str) -> bool {
        match (arg.find(':'), arg.find('/')) {
            (Some(colon), Some(slash)) => colon < slash,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Host name for a given host index
    ///
    /// A `{}` placeholder is replaced by the index, otherwise the index
    /// is appended to the host name.
    pub fn host_for(&self, index: Option<usize>) -> String {
        match index {
            None => self.host.clone(),
            Some(i) if self.host.contains("{}") => self.host.replace("{}", &i.to_string()),
            Some(i) => format!("{}{}", self.host, i),
        }
    }

    /// Format as an rsync endpoint for a given host index
    pub fn endpoint(&self, index: Option<usize>) -> String {
        let host = self.host_for(index);
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, host, self.path),
            None => format!("{}:{}", host, self.path),
        }
    }
}

/// Validated runtime configuration
///
/// Built once and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Scheduling mode
    pub mode: Mode,

    /// Number of worker threads
    pub worker_count: usize,

    /// First host index (None = every worker uses the host as written)
    pub host_start: Option<usize>,

    /// Total bandwidth budget in Mbit/s
    pub total_bandwidth_mbps: Option<u64>,

    /// Files per claim in dynamic mode
    pub batch_size: usize,

    /// Pre-built file list (skips enumeration)
    pub files_from: Option<PathBuf>,

    /// Transfer program
    pub rsync_program: String,

    /// Transfer direction
    pub direction: Direction,

    /// Remote endpoint
    pub remote: RemoteSpec,

    /// Local path
    pub local_path: String,

    /// Pass-through rsync options, in order
    pub rsync_options: Vec<String>,

    /// Show header, progress and summary
    pub show_progress: bool,
}

impl SyncConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let worker_count = match (args.mode, args.parallel) {
            (_, Some(n)) => n,
            (Mode::Static, None) => num_cpus::get(),
            (Mode::Dynamic, None) => {
                return Err(ConfigError::MissingRequired {
                    flag: "--parallel",
                    reason: "dynamic mode needs an explicit worker count".into(),
                })
            }
        };

        // Validate worker count
        if worker_count == 0 || worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: worker_count,
                max: MAX_WORKERS,
            });
        }

        // Validate batch size
        if args.batch_size < MIN_BATCH_SIZE || args.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        let (options, paths) = split_passthrough(&args.rsync_args);

        // Exactly one remote endpoint
        let remote_positions: Vec<usize> = paths
            .iter()
            .enumerate()
            .filter(|(_, p)| RemoteSpec::looks_remote(p))
            .map(|(i, _)| i)
            .collect();

        if remote_positions.len() != 1 {
            return Err(ConfigError::RemoteCount {
                found: remote_positions.len(),
            });
        }

        let remote_index = remote_positions[0];
        let remote = RemoteSpec::parse(&paths[remote_index])?;

        if remote.host.contains("{}") && args.hosts.is_none() {
            return Err(ConfigError::MissingRequired {
                flag: "--hosts",
                reason: format!("host '{}' has an index placeholder", remote.host),
            });
        }

        // Each worker gets its own --bwlimit from the shared budget
        let user_bwlimit = options
            .iter()
            .any(|o| o == "--bwlimit" || o.starts_with("--bwlimit="));
        if user_bwlimit && args.total_bw.is_some() {
            return Err(ConfigError::ConflictingOptions {
                first: "--total_bw",
                second: "--bwlimit",
            });
        }

        let locals: Vec<&String> = paths
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != remote_index)
            .map(|(_, p)| p)
            .collect();

        if locals.len() != 1 {
            return Err(ConfigError::MissingLocalPath {
                found: locals.len(),
            });
        }

        // Remote as the last positional means it is the destination
        let direction = if remote_index == paths.len() - 1 {
            Direction::Upload
        } else {
            Direction::Download
        };

        if let Some(ref list) = args.files_from {
            if !list.is_file() {
                return Err(ConfigError::InvalidFilesFrom {
                    path: list.clone(),
                    reason: "File does not exist".into(),
                });
            }
        }

        Ok(Self {
            mode: args.mode,
            worker_count,
            host_start: args.hosts,
            total_bandwidth_mbps: args.total_bw,
            batch_size: args.batch_size,
            files_from: args.files_from,
            rsync_program: args.rsync,
            direction,
            remote,
            local_path: locals[0].clone(),
            rsync_options: options,
            show_progress: !args.quiet,
        })
    }

    /// Verify the transfer program can be found
    pub fn check_dependencies(&self) -> Result<(), ConfigError> {
        which::which(&self.rsync_program)
            .map(|path| debug!(program = %path.display(), "Found transfer program"))
            .map_err(|_| ConfigError::MissingDependency {
                program: self.rsync_program.clone(),
            })
    }

    /// Host index for a worker
    pub fn host_index(&self, worker_id: usize) -> Option<usize> {
        self.host_start.map(|start| start + worker_id)
    }

    /// Remote endpoint string for a worker
    pub fn remote_endpoint(&self, worker_id: usize) -> String {
        self.remote.endpoint(self.host_index(worker_id))
    }

    /// (source, destination) for a worker's rsync invocation
    pub fn endpoints(&self, worker_id: usize) -> (String, String) {
        let remote = self.remote_endpoint(worker_id);
        match self.direction {
            Direction::Upload => (self.local_path.clone(), remote),
            Direction::Download => (remote, self.local_path.clone()),
        }
    }

    /// Human-readable source for display
    pub fn source_display(&self) -> String {
        self.endpoints(0).0
    }

    /// Human-readable destination for display
    pub fn destination_display(&self) -> String {
        self.endpoints(0).1
    }
}

/// Split pass-through arguments into options and positional paths
///
/// Option values written as a separate argument (`-e ssh`) stay with
/// their option. Everything after a bare `--` is positional.
pub fn split_passthrough(args: &[String]) -> (Vec<String>, Vec<String>) {
    let mut options = Vec::new();
    let mut paths = Vec::new();
    let mut iter = args.iter();
    let mut only_paths = false;

    while let Some(arg) = iter.next() {
        if only_paths {
            paths.push(arg.clone());
        } else if arg == "--" {
            only_paths = true;
        } else if arg.starts_with('-') && arg.len() > 1 {
            options.push(arg.clone());
            if OPTIONS_WITH_VALUE.contains(&arg.as_str()) {
                if let Some(value) = iter.next() {
                    options.push(value.clone());
                }
            }
        } else {
            paths.push(arg.clone());
        }
    }

    (options, paths)
}
