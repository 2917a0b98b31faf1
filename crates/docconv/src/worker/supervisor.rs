//! Single-thread deadline tracker for in-flight conversions.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::convert::ConversionTask;
use crate::document::{DocumentRepository, StatusUpdate};
use crate::error::WorkerError;

enum Command {
    Register {
        task: Arc<ConversionTask>,
        timeout: Duration,
    },
    Shutdown,
}

struct Deadline {
    at: Instant,
    seq: u64,
    timeout: Duration,
    task: Arc<ConversionTask>,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

pub fn timeout_message(timeout: Duration) -> String {
    format!("conversion timeout exceeded {} seconds", timeout.as_secs())
}

/// Fails attempts that outlive their deadline.
///
/// On expiry the supervisor claims the task; if the claim wins it raises the
/// task's cancel flag and records the timeout. A task the worker already
/// settled is dropped silently.
pub struct DeadlineSupervisor {
    sender: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlineSupervisor {
    pub fn start(repository: Arc<dyn DocumentRepository>) -> Result<Self, WorkerError> {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("docconv-deadlines".to_string())
            .spawn(move || run_supervisor(receiver, repository))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    pub fn register(&self, task: Arc<ConversionTask>, timeout: Duration) -> Result<(), WorkerError> {
        self.sender
            .send(Command::Register { task, timeout })
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Stops the supervisor thread. Pending deadlines are discarded.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Deadline supervisor panicked");
            }
        }
    }
}

fn run_supervisor(receiver: Receiver<Command>, repository: Arc<dyn DocumentRepository>) {
    let mut heap: BinaryHeap<Reverse<Deadline>> = BinaryHeap::new();
    let mut seq = 0u64;
    debug!("Deadline supervisor started");

    loop {
        let now = Instant::now();
        while heap.peek().is_some_and(|Reverse(d)| d.at <= now) {
            if let Some(Reverse(deadline)) = heap.pop() {
                expire(&deadline, repository.as_ref());
            }
        }
        // settled attempts need no deadline
        heap.retain(|Reverse(d)| !d.task.is_settled());

        let received = match heap.peek() {
            Some(Reverse(next)) => {
                receiver.recv_timeout(next.at.saturating_duration_since(Instant::now()))
            }
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Register { task, timeout }) => {
                seq += 1;
                heap.push(Reverse(Deadline {
                    at: Instant::now() + timeout,
                    seq,
                    timeout,
                    task,
                }));
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    info!("Deadline supervisor stopped with {} pending", heap.len());
}

fn expire(deadline: &Deadline, repository: &dyn DocumentRepository) {
    let task = &deadline.task;
    if !task.try_settle() {
        return;
    }
    task.cancel();

    let message = timeout_message(deadline.timeout);
    warn!(
        "Conversion {} of document {} timed out",
        task.task_id(),
        task.document_id()
    );
    match repository.update_status(
        task.document_id(),
        task.task_id(),
        &StatusUpdate::failed(message),
    ) {
        Ok(true) => {}
        Ok(false) => debug!("Timed-out attempt {} was no longer current", task.task_id()),
        Err(e) => error!(
            "Failed to record timeout for document {}: {}",
            task.document_id(),
            e
        ),
    }
}
