use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::error::{panic_message, WorkerError};
use crate::pipeline::{JobOutcome, Pipeline};
use crate::worker::job::ConvertJob;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_MESSAGE: &str = "conversion aborted: service shutting down";

/// Fixed set of conversion threads draining a bounded queue.
pub struct WorkerPool {
    job_sender: Sender<ConvertJob>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        pipeline: Arc<Pipeline>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }
        let (job_sender, job_receiver) = bounded::<ConvertJob>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("docconv-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, shutdown_flag, worker_pipeline))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!(
            "Started {} workers (queue capacity {})",
            worker_count,
            queue_capacity.max(1)
        );

        Ok(Self {
            job_sender,
            workers,
            shutdown,
        })
    }

    /// Enqueues a job without blocking.
    pub fn try_submit(&self, job: ConvertJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull,
            TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
        })
    }

    pub fn queued(&self) -> usize {
        self.job_sender.len()
    }

    /// Stops workers after their current job. Jobs still queued are failed.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Closes the queue and joins every worker. Without a prior
    /// [`shutdown`](Self::shutdown), queued jobs are drained first.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<ConvertJob>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            while let Ok(job) = job_receiver.try_recv() {
                pipeline.settle_failure(&job.task, SHUTDOWN_MESSAGE);
            }
            break;
        }

        match job_receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                debug!(
                    "Worker {} picked up {} after {:?} in queue",
                    worker_id,
                    job.task.task_id(),
                    job.enqueued_at.elapsed()
                );
                let task = Arc::clone(&job.task);
                match catch_unwind(AssertUnwindSafe(|| pipeline.run(Arc::clone(&task)))) {
                    Ok(JobOutcome::Completed { converted_filename }) => {
                        debug!("Worker {} completed {}", worker_id, converted_filename)
                    }
                    Ok(JobOutcome::Failed { error }) => {
                        debug!("Worker {} recorded failure: {}", worker_id, error)
                    }
                    Ok(JobOutcome::Abandoned) => {
                        debug!("Worker {} abandoned {}", worker_id, task.task_id())
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!("Worker {} recovered from panic: {}", worker_id, message);
                        pipeline.settle_failure(&task, &format!("conversion panicked: {}", message));
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
