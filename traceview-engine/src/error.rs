//! Error taxonomy. One variant per row of the recovery table; leaves never
//! panic, they return one of these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("backing store access failed: {0}")]
    DbAccessFailed(#[from] sqlx::Error),

    #[error("aborted: {0}")]
    DbAbort(String),

    #[error("timed out waiting on {0}")]
    Timeout(String),

    /// Time range empty or segment absent. The orchestrator demotes this to
    /// success at exactly one call site (`model::graph::demote_out_of_range`);
    /// every other caller sees it as an ordinary error.
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("allocation failed in pool {0}")]
    AllocFailure(String),

    #[error("property {0} is read-only")]
    ReadOnly(String),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("metadata not loaded yet")]
    NotLoaded,
}

pub type Result<T> = std::result::Result<T, EngineError>;
