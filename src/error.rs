//! Error types for parsync
//!
//! This module defines the error hierarchy for a parallel transfer run:
//! - Configuration and CLI errors (fatal before any transfer starts)
//! - Dry-run enumeration errors (fatal before partitioning/queueing)
//! - Transfer primitive errors (per batch or per worker)
//! - Worker thread errors
//!
//! Library code uses thiserror; the binary wraps everything in anyhow.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a parsync run
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dry-run enumeration errors
    #[error("Enumeration error: {0}")]
    Enumeration(#[from] EnumerationError),

    /// No worker could be started
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Work left behind after every worker exited
    #[error("Incomplete transfer: {remaining} file(s) were never transferred")]
    IncompleteTransfer { remaining: usize },

    /// Every file was handed to a worker but some batches failed
    #[error("{batches} batch(es) failed, covering {files} file(s)")]
    BatchesFailed { batches: u64, files: u64 },

    /// I/O errors (reading --files-from, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal before all work was claimed
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Required flag missing for the selected mode
    #[error("Missing required option {flag}: {reason}")]
    MissingRequired { flag: &'static str, reason: String },

    /// Remote endpoint could not be parsed
    #[error("Invalid remote path '{spec}': {reason}")]
    InvalidRemote { spec: String, reason: String },

    /// Zero or several remote endpoints among the pass-through arguments
    #[error("Expected exactly one remote path ([user@]host:/path) in the arguments, found {found}")]
    RemoteCount { found: usize },

    /// No local path among the pass-through arguments
    #[error("Expected exactly one local path in the arguments, found {found}")]
    MissingLocalPath { found: usize },

    /// External program not found
    #[error("Required program '{program}' was not found in PATH")]
    MissingDependency { program: String },

    /// Two options that cannot be combined
    #[error("{first} and {second} cannot be used together")]
    ConflictingOptions {
        first: &'static str,
        second: &'static str,
    },

    /// --files-from points nowhere
    #[error("Cannot read file list '{path}': {reason}")]
    InvalidFilesFrom { path: PathBuf, reason: String },
}

/// Dry-run enumeration errors
#[derive(Error, Debug)]
pub enum EnumerationError {
    /// A listing line could not be split into `<size> <path>`
    #[error("Malformed listing at line {line_number}: '{line}'")]
    MalformedListing { line_number: usize, line: String },

    /// The dry-run command could not be started
    #[error("Failed to run dry-run listing '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    /// The dry-run command exited non-zero
    #[error("Dry-run listing exited with status {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },
}

/// Transfer primitive errors
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    /// The primitive could not be started at all
    #[error("Failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The primitive ran and reported failure
    #[error("Transfer to '{endpoint}' exited with status {code:?}")]
    ExitStatus { endpoint: String, code: Option<i32> },
}

impl TransferError {
    /// Check if the worker can keep claiming after this error
    ///
    /// A failed run only costs the batch; a primitive that cannot start
    /// will not start for the next batch either.
    pub fn is_batch_local(&self) -> bool {
        matches!(self, TransferError::ExitStatus { .. })
    }
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be spawned
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Worker stopped because its transfer primitive could not run
    #[error("Worker {id} stopped: {source}")]
    TransferUnavailable { id: usize, source: TransferError },
}

/// Result type alias for SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for EnumerationError
pub type EnumResult<T> = std::result::Result<T, EnumerationError>;

/// Result type alias for TransferError
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Represents the outcome of one batch handed to the transfer primitive
#[derive(Debug)]
pub enum BatchOutcome {
    /// The primitive reported success
    Transferred { files: usize, bytes: u64 },

    /// The primitive ran and failed; the worker keeps going
    Failed { files: usize, error: TransferError },

    /// The primitive could not run; the worker stops
    Fatal { files: usize, error: TransferError },
}
