use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;

use crate::document::ConvertStatus;

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Builds `convert_{unix_millis}_{document_id}_{seq}`.
pub fn next_task_id(document_id: i64) -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("convert_{}_{}_{}", millis, document_id, seq)
}

/// Returned to the caller once an attempt is queued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertTicket {
    pub task_id: String,
    pub status: ConvertStatus,
}

/// Shared state of one conversion attempt.
///
/// The worker and the deadline supervisor both hold it; whichever calls
/// [`try_settle`](Self::try_settle) first owns the terminal write.
#[derive(Debug)]
pub struct ConversionTask {
    document_id: i64,
    task_id: String,
    cancelled: AtomicBool,
    settled: AtomicBool,
}

impl ConversionTask {
    pub fn new(document_id: i64, task_id: impl Into<String>) -> Self {
        Self {
            document_id,
            task_id: task_id.into(),
            cancelled: AtomicBool::new(false),
            settled: AtomicBool::new(false),
        }
    }

    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Claims the right to write the terminal state. Returns `true` exactly once.
    pub fn try_settle(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}
