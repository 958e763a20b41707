//! The pipeline engine: recipe validation, sequential plugin dispatch,
//! output materialization and status reporting.

pub mod error;
pub mod manager;
pub mod runner;

pub use error::PipelineError;
pub use manager::FileManager;
pub use runner::SINGLE_STEP_RECIPE;
