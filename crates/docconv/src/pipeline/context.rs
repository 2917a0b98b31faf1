use std::sync::Arc;

use crate::convert::ConversionTask;
use crate::document::Document;

/// State threaded through the steps of one conversion attempt.
pub struct PipelineContext {
    pub task: Arc<ConversionTask>,

    // Step 1 result
    pub document: Option<Document>,

    // Step 2 result
    pub original: Vec<u8>,

    // Step 3 result
    pub markdown: String,

    // Step 4 results
    pub converted_filename: Option<String>,
    pub converted_ref: Option<String>,
}

impl PipelineContext {
    pub fn new(task: Arc<ConversionTask>) -> Self {
        Self {
            task,
            document: None,
            original: Vec::new(),
            markdown: String::new(),
            converted_filename: None,
            converted_ref: None,
        }
    }
}
