//! Transfer primitive
//!
//! A [`TransferExecutor`] copies one batch of files. The production
//! executor runs rsync with the batch on stdin (`--files-from=- --from0`);
//! tests plug in fakes that only record what they were asked to do.

use crate::error::{TransferError, TransferResult};
use crate::types::Direction;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// One invocation of the transfer primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    /// Worker issuing the transfer
    pub worker_id: usize,

    /// Upload or download
    pub direction: Direction,

    /// Optional remote login user
    pub remote_user: Option<String>,

    /// Remote host for this worker
    pub remote_host: String,

    /// Path on the remote host
    pub remote_path: String,

    /// Local path
    pub local_path: String,

    /// Bandwidth ceiling in KB/s (0 = unlimited)
    pub bandwidth_limit_kbs: u64,

    /// Paths relative to the transfer source
    pub files: Vec<String>,
}

impl TransferTask {
    /// Remote endpoint in rsync syntax
    pub fn remote_endpoint(&self) -> String {
        self.remote_at(&self.remote_path)
    }

    fn remote_at(&self, path: &str) -> String {
        match &self.remote_user {
            Some(user) => format!("{}@{}:{}", user, self.remote_host, path),
            None => format!("{}:{}", self.remote_host, path),
        }
    }

    /// (source, destination) in rsync argument order
    ///
    /// The source is the directory the listed names are relative to, see
    /// [`source_root`].
    pub fn endpoints(&self) -> (String, String) {
        match self.direction {
            Direction::Upload => (source_root(&self.local_path), self.remote_endpoint()),
            Direction::Download => (
                self.remote_at(&source_root(&self.remote_path)),
                self.local_path.clone(),
            ),
        }
    }

    /// NUL-separated file list for `--from0`
    fn file_list(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.files.iter().map(|f| f.len() + 1).sum());
        for file in &self.files {
            buf.extend_from_slice(file.as_bytes());
            buf.push(0);
        }
        buf
    }
}

/// Directory that dry-run names are relative to
///
/// rsync lists `dir/` by its contents but `dir` under its own name
/// (`dir/x`), and `--files-from` resolves names against the source
/// argument. A source without a trailing slash therefore resolves from
/// its parent.
pub fn source_root(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or(path);
    if path.is_empty() || path.ends_with('/') || last == "." || last == ".." {
        return path.to_string();
    }

    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "./".to_string(),
    }
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Files handed to the primitive
    pub files: usize,

    /// Wall-clock time spent
    pub duration: Duration,
}

/// The capability of copying a batch of files
///
/// Implementations block until the copy finishes.
pub trait TransferExecutor: Send + Sync {
    /// Copy the files named in `task`
    fn execute(&self, task: &TransferTask) -> TransferResult<TransferOutcome>;
}

/// Runs rsync once per batch
#[derive(Debug, Clone)]
pub struct RsyncExecutor {
    program: String,
    options: Vec<String>,
}

impl RsyncExecutor {
    /// Create an executor for `program` with pass-through `options`
    pub fn new(program: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }

    /// Build the command line for a task (without spawning it)
    pub fn command(&self, task: &TransferTask) -> Command {
        let (source, destination) = task.endpoints();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.options)
            .arg("--files-from=-")
            .arg("--from0");

        if task.bandwidth_limit_kbs > 0 {
            cmd.arg(format!("--bwlimit={}", task.bandwidth_limit_kbs));
        }

        cmd.arg(source).arg(destination).stdin(Stdio::piped());
        cmd
    }
}

impl TransferExecutor for RsyncExecutor {
    fn execute(&self, task: &TransferTask) -> TransferResult<TransferOutcome> {
        let start = Instant::now();
        let spawn_error = |e: std::io::Error| TransferError::Spawn {
            program: self.program.clone(),
            reason: e.to_string(),
        };

        let mut child = self.command(task).spawn().map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits early closes the pipe; its exit status says why
            if let Err(e) = stdin.write_all(&task.file_list()) {
                debug!(worker = task.worker_id, error = %e, "File list write interrupted");
            }
        }

        let status = child.wait().map_err(spawn_error)?;

        if !status.success() {
            return Err(TransferError::ExitStatus {
                endpoint: task.remote_endpoint(),
                code: status.code(),
            });
        }

        Ok(TransferOutcome {
            files: task.files.len(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(direction: Direction, limit: u64) -> TransferTask {
        TransferTask {
            worker_id: 1,
            direction,
            remote_user: Some("backup".into()),
            remote_host: "node3".into(),
            remote_path: "/srv/data/".into(),
            local_path: "/data/".into(),
            bandwidth_limit_kbs: limit,
            files: vec!["a.bin".into(), "dir/b.txt".into()],
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_endpoints_follow_direction() {
        let up = task(Direction::Upload, 0);
        assert_eq!(
            up.endpoints(),
            ("/data/".to_string(), "backup@node3:/srv/data/".to_string())
        );

        let down = task(Direction::Download, 0);
        assert_eq!(down.endpoints().0, "backup@node3:/srv/data/");
    }

    #[test]
    fn test_file_list_nul_separated() {
        assert_eq!(task(Direction::Upload, 0).file_list(), b"a.bin\0dir/b.txt\0".to_vec());
    }

    #[test]
    fn test_command_with_bwlimit() {
        let exec = RsyncExecutor::new("rsync", vec!["-a".into(), "--delete".into()]);
        let cmd = exec.command(&task(Direction::Upload, 2500));

        assert_eq!(cmd.get_program(), "rsync");
        assert_eq!(
            args_of(&cmd),
            vec![
                "-a",
                "--delete",
                "--files-from=-",
                "--from0",
                "--bwlimit=2500",
                "/data/",
                "backup@node3:/srv/data/",
            ]
        );
    }

    #[test]
    fn test_command_unlimited() {
        let exec = RsyncExecutor::new("rsync", Vec::new());
        let args = args_of(&exec.command(&task(Direction::Download, 0)));
        assert!(!args.iter().any(|a| a.starts_with("--bwlimit")));
        assert_eq!(args.last().map(String::as_str), Some("/data/"));
    }

    #[test]
    fn test_source_root() {
        assert_eq!(source_root("/data/"), "/data/");
        assert_eq!(source_root("/data"), "/");
        assert_eq!(source_root("/srv/data"), "/srv/");
        assert_eq!(source_root("data"), "./");
        assert_eq!(source_root("a/b/file.txt"), "a/b/");
        assert_eq!(source_root("."), ".");
        assert_eq!(source_root("/data/."), "/data/.");
        assert_eq!(source_root(""), "");
    }

    #[test]
    fn test_source_without_slash_uses_parent() {
        let mut up = task(Direction::Upload, 0);
        up.local_path = "/data".into();
        up.files = vec!["data/a.bin".into()];
        let args = args_of(&RsyncExecutor::new("rsync", Vec::new()).command(&up));
        assert_eq!(&args[args.len() - 2..], &["/", "backup@node3:/srv/data/"]);

        let mut down = task(Direction::Download, 0);
        down.remote_path = "/srv/data".into();
        assert_eq!(
            down.endpoints(),
            ("backup@node3:/srv/".to_string(), "/data/".to_string())
        );
        // Error reports still name the endpoint as written
        assert_eq!(down.remote_endpoint(), "backup@node3:/srv/data");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let exec = RsyncExecutor::new("/nonexistent/parsync-test-rsync", Vec::new());
        let err = exec.execute(&task(Direction::Upload, 0)).unwrap_err();
        assert!(matches!(err, TransferError::Spawn { .. }));
    }
}
