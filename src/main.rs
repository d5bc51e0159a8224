//! parsync - Parallel rsync Scheduler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use parsync::bandwidth::BandwidthShare;
use parsync::config::{CliArgs, SyncConfig};
use parsync::coordinator::SyncCoordinator;
use parsync::enumerate::{load_workload, RsyncDryRun, Workload};
use parsync::error::SyncError;
use parsync::progress::{print_header, print_summary, ProgressReporter};
use parsync::transfer::RsyncExecutor;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = SyncConfig::from_args(args).context("Invalid configuration")?;
    config
        .check_dependencies()
        .context("Missing external dependency")?;

    let bandwidth = BandwidthShare::allocate(config.total_bandwidth_mbps, config.worker_count);
    if config.show_progress {
        print_header(&config, bandwidth);
    }

    // Find out what to send
    let progress = config.show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Listing files (rsync dry run)...");
    }

    let files = match load_workload(&config, &RsyncDryRun).context("File enumeration failed")? {
        Workload::Empty => {
            if let Some(ref p) = progress {
                p.finish("Nothing to transfer");
            }
            info!("Nothing to transfer");
            return Ok(());
        }
        Workload::Files(files) => files,
    };

    let show_progress = config.show_progress;
    let executor = Arc::new(RsyncExecutor::new(
        config.rsync_program.clone(),
        config.rsync_options.clone(),
    ));
    let coordinator = SyncCoordinator::new(config, executor);

    // Setup signal handler for graceful shutdown
    let interrupted = coordinator.shutdown_flag();
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        if shutdown_flag.load(Ordering::Relaxed) {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nInterrupt received, finishing in-flight transfers... (press Ctrl+C again to force)");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Run the transfer
    let result = coordinator
        .run_with_progress(files, |snapshot| {
            if let Some(ref p) = progress {
                p.update(snapshot);
            }
        })
        .context("Transfer failed")?;

    // Finish progress
    if let Some(ref p) = progress {
        if result.completion.is_success() {
            p.finish("Transfer completed");
        } else {
            p.finish("Transfer did not complete");
        }
    }

    if show_progress {
        print_summary(&result);
    }

    if interrupted.load(Ordering::Relaxed) && !result.completion.is_success() {
        return Err(SyncError::Interrupted.into());
    }

    result.completion.into_result()?;
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("parsync=debug,warn")
    } else {
        EnvFilter::new("parsync=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
