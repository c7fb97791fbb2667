//! Transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode frame: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(&'static str),

    /// The remote developer function failed; the message is passed through
    /// verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("connection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
