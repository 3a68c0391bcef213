//! Error types for the Light Timing subsystem

use std::time::Duration;

/// Light timing error types
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("Unknown node: {0}")]
    NodeNotFound(String),

    #[error("No offset recorded for node: {0}")]
    OffsetNotFound(String),

    #[error("Validator set is empty")]
    EmptyValidatorSet,

    #[error("Insufficient validators: resolved {resolved}, required {required}")]
    InsufficientValidators { required: usize, resolved: usize },

    #[error("Offset for node {node_id} is stale ({age:?} old)")]
    StaleOffset { node_id: String, age: Duration },

    #[error("Delay computation failed: {0}")]
    ComputationFailed(String),

    #[error("No valid reference measurements for node: {0}")]
    NoValidMeasurements(String),

    #[error("Batch partially failed: {failed} of {total} items failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("Batch cancelled after {completed} of {total} items")]
    Cancelled { completed: usize, total: usize },

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Node directory error: {0}")]
    Directory(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Invalid node record: {0}")]
    InvalidNode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse failure category exposed to the API layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InsufficientInput,
    Stale,
    ComputationFailed,
    PartialBatchFailure,
    Cancelled,
    DeadlineExceeded,
}

impl ErrorKind {
    /// HTTP-equivalent status code for the API boundary.
    ///
    /// Anything that is not a caller mistake maps to 500 so that no
    /// internal detail leaks through the status alone.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InsufficientInput => 400,
            ErrorKind::Stale => 409,
            ErrorKind::DeadlineExceeded => 504,
            ErrorKind::Cancelled => 499,
            ErrorKind::ComputationFailed | ErrorKind::PartialBatchFailure => 500,
        }
    }
}

impl TimingError {
    /// Map this error onto its taxonomy category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimingError::NodeNotFound(_) | TimingError::OffsetNotFound(_) => ErrorKind::NotFound,
            TimingError::EmptyValidatorSet
            | TimingError::InsufficientValidators { .. }
            | TimingError::InvalidPosition(_)
            | TimingError::InvalidNode(_)
            | TimingError::Config(_) => ErrorKind::InsufficientInput,
            TimingError::StaleOffset { .. } => ErrorKind::Stale,
            TimingError::ComputationFailed(_)
            | TimingError::NoValidMeasurements(_)
            | TimingError::Directory(_) => ErrorKind::ComputationFailed,
            TimingError::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            TimingError::Cancelled { .. } => ErrorKind::Cancelled,
            TimingError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
        }
    }
}

/// Result type for light timing operations
pub type TimingResult<T> = Result<T, TimingError>;
