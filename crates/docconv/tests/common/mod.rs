//! Shared test utilities for docconv integration tests.
//!
//! - `TestHarness` runs a real `ConversionService` over a temp directory
//! - builders produce in-memory PPTX, XLSX and PDF fixtures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{HarnessBuilder, TestHarness};
