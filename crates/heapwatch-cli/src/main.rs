//! heapwatch: drive the managed heap to exhaustion and report what the
//! threshold notifications saw along the way.
//!
//! Configuration comes from `HEAPWATCH_*` environment variables; logs go to
//! stderr (`RUST_LOG`), reports to stdout.

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use heapwatch_core::config::HarnessConfig;
use heapwatch_exec::{ConsoleReporter, Harness, StopToken};
use heapwatch_mem::ManagedHeap;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = HarnessConfig::from_env();
    cfg.validate()?;

    let heap = Arc::new(ManagedHeap::from_config(&cfg)?);
    let reporter = Arc::new(ConsoleReporter::stdout(cfg.report_format));
    // Nothing requests a stop here, so the run always ends in exhaustion.
    let stop = StopToken::new();

    println!("Starting memory allocation...");
    let worker = thread::Builder::new().name("heapwatch-alloc".to_string()).spawn({
        let heap = Arc::clone(&heap);
        let stop = stop.clone();
        move || Harness::new(cfg, heap, reporter).run(&stop)
    })?;

    let report = worker
        .join()
        .map_err(|_| "allocation thread panicked")??;

    for installed in &report.registration.installed {
        tracing::info!(
            pool = %installed.pool,
            threshold = installed.threshold,
            "threshold was installed"
        );
    }
    tracing::info!(
        peak_bytes = heap.peak_bytes(),
        threshold_reports = report.threshold_reports,
        allocations = report.outcome.allocations(),
        state = ?report.state,
        "run summary"
    );
    Ok(())
}
