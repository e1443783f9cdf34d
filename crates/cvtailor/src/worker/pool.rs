use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};
use tokio::runtime::Handle;

use crate::error::WorkerError;
use crate::job::Job;
use crate::pipeline::{AttemptOutcome, JobProcessor};

/// Result of one attempt, published on the pool's result channel.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub job_id: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Stops intake on a [`WorkerPool`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// A fixed set of OS threads running attempts for claimed jobs.
///
/// Attempts are async; each worker drives its attempt to completion on the
/// shared runtime handle.
pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<AttemptReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(
        processor: JobProcessor,
        worker_count: usize,
        runtime: Handle,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<AttemptReport>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let worker_processor = processor.clone();
            let worker_runtime = runtime.clone();
            let worker_in_flight = Arc::clone(&in_flight);

            let handle = thread::Builder::new()
                .name(format!("cvtailor-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        result_tx,
                        worker_processor,
                        worker_runtime,
                        worker_in_flight,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
            in_flight,
        })
    }

    /// Queues a claimed job without blocking.
    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.job_sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Err(match e {
                    TrySendError::Full(_) => WorkerError::QueueFull,
                    TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
                })
            }
        }
    }

    /// Jobs submitted whose attempt has not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn try_recv_result(&self) -> Option<AttemptReport> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<AttemptReport> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<AttemptReport> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Stops accepting new jobs. Jobs already queued still run.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Drains queued jobs, joins every worker and returns the reports that
    /// were not received yet.
    pub fn wait(self) -> Vec<AttemptReport> {
        // Workers exit once the channel is empty and disconnected.
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
        self.result_receiver.try_iter().collect()
    }
}

/// Decrements the in-flight count when dropped, including during unwinding.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<AttemptReport>,
    processor: JobProcessor,
    runtime: Handle,
    in_flight: Arc<AtomicUsize>,
) {
    debug!("Worker {} started", worker_id);

    for job in job_receiver.iter() {
        let job_id = job.id.clone();
        debug!("Worker {} processing job {}", worker_id, job_id);

        let guard = InFlightGuard(&in_flight);
        let started = Instant::now();
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(processor.run(job))
        }));
        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    "Worker {} attempt for job {} panicked: {}",
                    worker_id, job_id, message
                );
                processor.record_panic(&job_id, &message)
            }
        };
        drop(guard);

        let report = AttemptReport {
            job_id,
            outcome,
            elapsed: started.elapsed(),
        };

        match result_sender.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                debug!(
                    "Worker {} dropped report for job {} (result channel full)",
                    worker_id, report.job_id
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Worker {} result channel disconnected", worker_id);
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
