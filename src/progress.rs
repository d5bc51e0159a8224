//! Progress reporting for parallel transfers
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::bandwidth::BandwidthShare;
use crate::completion::Completion;
use crate::config::SyncConfig;
use crate::coordinator::{SyncProgress, SyncResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays transfer status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &SyncProgress) {
        let queue = progress
            .queue_remaining
            .map(|n| format!(" | Queue: {}", format_number(n as u64)))
            .unwrap_or_default();

        let mut msg = format!(
            "Files: {}/{} | Size: {}/{} | Rate: {}/s{} | Workers: {}/{}",
            format_number(progress.files),
            format_number(progress.total_files as u64),
            format_size(progress.bytes, BINARY),
            format_size(progress.total_bytes, BINARY),
            format_size(progress.bytes_per_second() as u64, BINARY),
            queue,
            progress.active_workers,
            progress.total_workers,
        );

        if progress.failed_batches > 0 {
            msg.push_str(&format!(" | Failed batches: {}", progress.failed_batches));
        }

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(result: &SyncResult) {
    let duration_secs = result.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        result.bytes_transferred as f64 / duration_secs
    } else {
        0.0
    };

    let title = match result.completion {
        Completion::Complete => style("Transfer Complete").green().bold(),
        Completion::Incomplete { .. } => style("Transfer Incomplete").red().bold(),
        Completion::BatchesFailed { .. } => style("Transfer Finished With Errors").yellow().bold(),
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} of {}",
        style("Files:").bold(),
        format_number(result.files_transferred),
        format_number(result.total_files as u64)
    );
    println!(
        "  {} {} of {}",
        style("Size:").bold(),
        format_size(result.bytes_transferred, BINARY),
        format_size(result.total_bytes, BINARY)
    );
    println!(
        "  {} {} ({} mode, {} workers)",
        style("Batches:").bold(),
        format_number(result.batches),
        result.mode,
        result.workers
    );
    println!(
        "  {} {:.1}s ({}/s)",
        style("Duration:").bold(),
        duration_secs,
        format_size(rate as u64, BINARY)
    );
    println!(
        "  {} {}",
        style("Started:").bold(),
        result.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if result.failed_batches > 0 {
        println!(
            "  {} {}",
            style("Failed batches:").yellow().bold(),
            format_number(result.failed_batches)
        );
    }
    if result.residual > 0 {
        println!(
            "  {} {}",
            style("Never transferred:").red().bold(),
            format_number(result.residual as u64)
        );
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(config: &SyncConfig, bandwidth: BandwidthShare) {
    println!();
    println!(
        "{} {}",
        style("parsync").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), config.source_display());
    println!("  {} {}", style("Destination:").bold(), config.destination_display());
    println!("  {} {}", style("Direction:").bold(), config.direction);
    println!("  {} {}", style("Mode:").bold(), config.mode);
    println!("  {} {}", style("Workers:").bold(), config.worker_count);
    if let Some(start) = config.host_start {
        println!(
            "  {} {} .. {}",
            style("Hosts:").bold(),
            config.remote.host_for(Some(start)),
            config.remote.host_for(Some(start + config.worker_count - 1))
        );
    }
    println!("  {} {}", style("Bandwidth:").bold(), bandwidth);
    println!();
}
