use std::io;

use thiserror::Error;

/// Errors returned by every fallible trajectory operation.
///
/// The set is closed: callers can match exhaustively and outer layers can map
/// each variant to their own error codes.
#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("parse error: {0}")]
    Parse(&'static str),

    #[error("overflow: {0}")]
    Overflow(&'static str),

    /// The trajectory is empty, or a required part of it is absent.
    #[error("not found")]
    NotFound,

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TrajectoryError>;

impl From<std::collections::TryReserveError> for TrajectoryError {
    fn from(_: std::collections::TryReserveError) -> Self {
        TrajectoryError::OutOfMemory
    }
}
