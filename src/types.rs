//! Core data types shared by the scheduler
//!
//! - `FileRecord`: one file to move, with its size
//! - `Direction`: which way the transfer goes

use std::fmt;

/// A single file to transfer
///
/// Immutable once created by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRecord {
    /// Size in bytes
    pub size: u64,

    /// Path relative to the transfer source root (or absolute)
    pub path: String,
}

impl FileRecord {
    /// Create a new file record
    pub fn new(size: u64, path: impl Into<String>) -> Self {
        Self {
            size,
            path: path.into(),
        }
    }
}

/// Sort file records by size, largest first
///
/// The sort is stable so equal-size files keep their listing order.
pub fn sort_by_size_desc(files: &mut [FileRecord]) {
    files.sort_by(|a, b| b.size.cmp(&a.size));
}

/// Sum of the sizes of a set of files
pub fn total_size(files: &[FileRecord]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

/// Transfer direction relative to the local machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local source, remote destination
    Upload,
    /// Remote source, local destination
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}
