//! Error types for pointkit

use thiserror::Error;

/// Main error type for pointkit operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Point cloud is empty")]
    EmptyCloud,

    #[error("Point {index} has no neighbors within radius {radius}")]
    InsufficientNeighbors { index: usize, radius: f32 },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type alias for pointkit operations
pub type Result<T> = std::result::Result<T, Error>;
