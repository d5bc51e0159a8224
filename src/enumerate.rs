//! File enumeration via rsync dry run
//!
//! Asks the transfer program which files it would send, parses the
//! `<size> <path>` listing, drops directories and chatter, and returns
//! the files sorted largest first.

use crate::config::SyncConfig;
use crate::error::{EnumResult, EnumerationError, Result, SyncError};
use crate::types::{sort_by_size_desc, FileRecord};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Flags appended after the user's options so they win
///
/// Size then name per line, plain byte counts, and no deletion, stats or
/// itemize output mixed into the listing.
const LISTING_FLAGS: &[&str] = &[
    "--dry-run",
    "--out-format=%l %n",
    "--info=del0,stats0",
    "--no-human-readable",
    "--no-itemize-changes",
];

/// Informational line prefixes rsync prints around the listing
const INFO_PREFIXES: &[&str] = &[
    "sending incremental file list",
    "receiving incremental file list",
    "receiving file list",
    "building file list",
    "created directory ",
    "skipping non-regular file ",
    "deleting ",
    "*deleting ",
    "sent ",
    "total size is ",
    "total: ",
    "delta-transmission ",
    // --stats block
    "Number of ",
    "Total file size",
    "Total transferred file size",
    "Literal data",
    "Matched data",
    "File list size",
    "File list generation time",
    "File list transfer time",
    "Total bytes sent",
    "Total bytes received",
];

/// What a dry run found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workload {
    /// Nothing to transfer; a successful terminal state
    Empty,
    /// Files to transfer, largest first
    Files(Vec<FileRecord>),
}

impl Workload {
    /// Build a workload from records, sorting them largest first
    pub fn from_records(mut files: Vec<FileRecord>) -> Self {
        if files.is_empty() {
            Workload::Empty
        } else {
            sort_by_size_desc(&mut files);
            Workload::Files(files)
        }
    }

    /// Number of files
    pub fn len(&self) -> usize {
        match self {
            Workload::Empty => 0,
            Workload::Files(files) => files.len(),
        }
    }

    /// Check if there is nothing to transfer
    pub fn is_empty(&self) -> bool {
        matches!(self, Workload::Empty)
    }
}

/// Everything a dry run needs to know
#[derive(Debug, Clone)]
pub struct ListingRequest {
    /// Transfer program
    pub program: String,
    /// Pass-through options
    pub options: Vec<String>,
    /// Transfer source
    pub source: String,
    /// Transfer destination
    pub destination: String,
}

impl ListingRequest {
    /// Build the request from the run configuration
    ///
    /// The listing talks to the first worker's host.
    pub fn from_config(config: &SyncConfig) -> Self {
        let (source, destination) = config.endpoints(0);
        Self {
            program: config.rsync_program.clone(),
            options: config.rsync_options.clone(),
            source,
            destination,
        }
    }
}

/// A capability that lists the files a transfer would move
pub trait ListingSource: Send + Sync {
    /// Return the raw listing text
    fn list(&self, request: &ListingRequest) -> EnumResult<String>;
}

/// Lists files by running the transfer program with `--dry-run`
#[derive(Debug, Default, Clone, Copy)]
pub struct RsyncDryRun;

impl RsyncDryRun {
    /// Build the listing command line (without running it)
    pub fn command(&self, request: &ListingRequest) -> Command {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.options)
            .args(LISTING_FLAGS)
            .arg(&request.source)
            .arg(&request.destination)
            .stdin(Stdio::null());
        cmd
    }
}

impl ListingSource for RsyncDryRun {
    fn list(&self, request: &ListingRequest) -> EnumResult<String> {
        debug!(
            program = %request.program,
            source = %request.source,
            destination = %request.destination,
            "Running dry-run listing"
        );

        let output = self
            .command(request)
            .output()
            .map_err(|e| EnumerationError::SpawnFailed {
                program: request.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EnumerationError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Enumerate the files to transfer using a listing source
pub fn enumerate(source: &dyn ListingSource, request: &ListingRequest) -> EnumResult<Workload> {
    let text = source.list(request)?;
    let files = parse_listing(&text)?;

    info!(files = files.len(), "Enumerated files to transfer");
    Ok(Workload::from_records(files))
}

/// Load the workload for a run: from `--files-from` if given, else a dry run
pub fn load_workload(config: &SyncConfig, source: &dyn ListingSource) -> Result<Workload> {
    match &config.files_from {
        Some(path) => {
            let files = read_files_from(path)?;
            info!(files = files.len(), path = %path.display(), "Loaded file list");
            Ok(Workload::from_records(files))
        }
        None => enumerate(source, &ListingRequest::from_config(config)).map_err(SyncError::from),
    }
}

/// Parse a dry-run listing into file records (unsorted)
pub fn parse_listing(text: &str) -> EnumResult<Vec<FileRecord>> {
    let mut files = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if is_informational(line) {
            continue;
        }

        let (size, path) = split_size_path(line).ok_or_else(|| EnumerationError::MalformedListing {
            line_number: idx + 1,
            line: line.to_string(),
        })?;

        if is_directory(path) {
            continue;
        }

        files.push(FileRecord::new(size, path));
    }

    Ok(files)
}

/// Read a `--files-from` list
///
/// Each non-empty line is either `<size> <path>` or a bare path (size 0).
pub fn read_files_from(path: &Path) -> Result<Vec<FileRecord>> {
    let text = std::fs::read_to_string(path)?;

    let files = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match split_size_path(line) {
            Some((_, p)) if is_directory(p) => None,
            Some((size, p)) => Some(FileRecord::new(size, p)),
            None if is_directory(line) => None,
            None => Some(FileRecord::new(0, line)),
        })
        .collect();

    Ok(files)
}

fn is_informational(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || INFO_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

fn is_directory(path: &str) -> bool {
    path.ends_with('/') || path == "."
}

/// Split `<size> <path>`, accepting `1,234`-style sizes
fn split_size_path(line: &str) -> Option<(u64, &str)> {
    let line = line.trim_start();
    let (size, path) = line.split_once(' ')?;

    if size.is_empty() || !size.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }

    let digits: String = size.chars().filter(char::is_ascii_digit).collect();
    let size = digits.parse::<u64>().ok()?;

    if path.is_empty() {
        return None;
    }

    Some((size, path))
}
