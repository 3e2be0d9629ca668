//! Line error types

use thiserror::Error;

/// Errors that can occur while acquiring or driving a GPIO line
#[derive(Error, Debug)]
pub enum LineError {
    #[error("Line {offset} not found on {chip}")]
    NotFound { chip: String, offset: u32 },

    #[error("Line {offset} busy (claimed by {owner})")]
    Busy { offset: u32, owner: String },

    #[error("Line I/O error: {0}")]
    Io(String),

    #[error("Line already released")]
    Closed,

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl From<std::io::Error> for LineError {
    fn from(e: std::io::Error) -> Self {
        LineError::Io(e.to_string())
    }
}
