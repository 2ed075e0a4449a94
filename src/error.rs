use crate::parser::ParseError;
use std::io;

/// Central error type for the front-end's core engine.
#[derive(Debug, thiserror::Error)]
pub enum FrontError {
    /// Underlying I/O error from the OS or network.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during HTTP request parsing.
    #[error("malformed HTTP request: {0:?}")]
    Parse(#[from] ParseError),

    /// Connection slab reached its configured capacity.
    #[error("connection slab is full")]
    SlabFull,

    /// A background worker thread panicked.
    #[error("worker panic: {0}")]
    WorkerPanic(String),

    /// Weighted load balancer sample fell outside every configured range.
    /// Implies the weight table was built from weights that don't sum to 1.
    #[error("weighted load balancer sample {sample} matched no configured range")]
    NoRangeMatched { sample: f64 },

    /// Generic or miscellaneous error.
    #[error("{0}")]
    Other(String),
}

pub type FrontResult<T> = Result<T, FrontError>;
