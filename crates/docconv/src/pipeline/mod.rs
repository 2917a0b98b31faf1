pub mod context;
pub mod error;
pub mod runner;

pub use context::PipelineContext;
pub use error::PipelineError;
pub use runner::{JobOutcome, Pipeline};
