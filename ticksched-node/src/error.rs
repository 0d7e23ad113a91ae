//! Node errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors from node start-up
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("scheduler error: {0}")]
    Sched(#[from] ticksched::Error),

    #[error("failed to read task plan {path}: {source}")]
    PlanRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse task plan: {0}")]
    PlanParse(#[from] serde_json::Error),

    #[error("unknown task action: {0}")]
    UnknownAction(String),
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
