//! Shared test utilities for ocrmerge integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated order runs backed by a temp directory
//! - Builders for configs, templates and extraction payloads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
