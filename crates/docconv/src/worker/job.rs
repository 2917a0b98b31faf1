use std::sync::Arc;
use std::time::Instant;

use crate::convert::ConversionTask;

/// A queued conversion attempt.
#[derive(Debug, Clone)]
pub struct ConvertJob {
    pub task: Arc<ConversionTask>,
    pub enqueued_at: Instant,
}

impl ConvertJob {
    pub fn new(task: Arc<ConversionTask>) -> Self {
        Self {
            task,
            enqueued_at: Instant::now(),
        }
    }
}
