//! Shared test utilities for fileflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated pipeline runs with temp storage directories
//! - Builders for recipes and test plugins

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RunOutcome, TestHarness};
