//! Drains the tailoring queue.
//!
//! `cvtailor-worker <config.json> [job-id]`
//!
//! Without a job id, queued jobs are dispatched oldest first until none are
//! left, including jobs re-queued for a retry along the way. With a job id,
//! only that job is run, through all of its retries.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use cvtailor::blob;
use cvtailor::pipeline::{AttemptOutcome, JobProcessor, StageTimeouts};
use cvtailor::worker::{AttemptReport, Dispatch, DispatchError, Dispatcher, WorkerPool};
use cvtailor::{
    load_config, telemetry, Config, CvTailorError, Database, SqliteJobStore, TailoringEngine,
    TextExtractor,
};

const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <config.json> [job-id]", args[0]);
        return ExitCode::from(2);
    }

    let config = match load_config(&args[1]) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting cvtailor worker v{}", env!("CARGO_PKG_VERSION"));

    match run(&config, args.get(2).map(String::as_str)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, job_id: Option<&str>) -> Result<(), CvTailorError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("cvtailor-rt")
        .build()
        .map_err(|e| cvtailor::WorkerError::SpawnFailed(format!("tokio runtime: {}", e)))?;

    let db_path: PathBuf = config.resolved_database_path().ok_or_else(|| {
        cvtailor::ConfigError::Validation {
            message: "No database_path configured and no home directory found".to_string(),
        }
    })?;
    let database = Database::open(&db_path)?;
    let store =
        SqliteJobStore::new(database).with_default_max_retries(config.default_max_retries);

    let blobs = blob::from_config(&config.blob)?;
    let extractor = TextExtractor::from_config(&config.ocr, &config.extraction);
    let timeouts = StageTimeouts::from(&config.timeouts);
    let tailor = TailoringEngine::from_config(&config.ai, timeouts.tailoring)?;

    let processor =
        JobProcessor::new(Arc::new(store), blobs, extractor, tailor).with_timeouts(timeouts);

    let pool = WorkerPool::new(
        processor.clone(),
        config.worker_count,
        runtime.handle().clone(),
    )?;

    let shutdown = pool.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || shutdown.trigger()) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let dispatcher = Dispatcher::new(processor, &pool);
    let result = match job_id {
        Some(id) => run_single(&dispatcher, &pool, id),
        None => drain_queue(&dispatcher, &pool),
    };

    pool.shutdown();
    for report in pool.wait() {
        log_report(&report);
    }
    runtime.shutdown_timeout(Duration::from_secs(5));

    result
}

fn drain_queue(dispatcher: &Dispatcher<'_>, pool: &WorkerPool) -> Result<(), CvTailorError> {
    let mut dispatched = 0usize;

    while !pool.is_shutdown() {
        match dispatcher.process_next() {
            Ok(Dispatch::Started { .. }) => {
                dispatched += 1;
                drain_reports(pool);
            }
            Ok(Dispatch::NoWork) if pool.in_flight() == 0 => break,
            // Running attempts may still re-queue their job.
            Ok(Dispatch::NoWork) | Err(DispatchError::QueueFull { .. }) => {
                if let Some(report) = pool.recv_result_timeout(RESULT_POLL_INTERVAL) {
                    log_report(&report);
                }
            }
            Ok(Dispatch::NotEligible { .. }) => {}
            Err(DispatchError::PoolClosed { .. }) => break,
            Err(e) => return Err(e.into()),
        }
    }

    info!("Dispatched {} attempts", dispatched);
    Ok(())
}

fn run_single(
    dispatcher: &Dispatcher<'_>,
    pool: &WorkerPool,
    job_id: &str,
) -> Result<(), CvTailorError> {
    while !pool.is_shutdown() {
        match dispatcher.process_specific(job_id)? {
            Dispatch::Started { .. } => {}
            Dispatch::NotEligible { status, .. } => {
                info!("Job {} is {}, nothing to do", job_id, status);
                return Ok(());
            }
            Dispatch::NoWork => return Ok(()),
        }

        let report = loop {
            if let Some(report) = pool.recv_result_timeout(RESULT_POLL_INTERVAL) {
                break Some(report);
            }
            if pool.in_flight() == 0 || pool.is_shutdown() {
                break None;
            }
        };

        match report {
            Some(report) => {
                log_report(&report);
                if !matches!(report.outcome, AttemptOutcome::Requeued { .. }) {
                    return Ok(());
                }
            }
            None => return Ok(()),
        }
    }

    Ok(())
}

fn drain_reports(pool: &WorkerPool) {
    while let Some(report) = pool.try_recv_result() {
        log_report(&report);
    }
}

fn log_report(report: &AttemptReport) {
    match report.outcome {
        AttemptOutcome::Completed => info!(
            "Job {} completed in {:.1}s",
            report.job_id,
            report.elapsed.as_secs_f64()
        ),
        AttemptOutcome::Requeued { retry_count, kind } => info!(
            "Job {} re-queued after {} (retry {})",
            report.job_id, kind, retry_count
        ),
        AttemptOutcome::Failed { kind } => {
            warn!("Job {} failed: {}", report.job_id, kind)
        }
        AttemptOutcome::Unrecorded => error!(
            "Job {} ended without a recorded outcome",
            report.job_id
        ),
    }
}
