//! Daemon wire protocol
//!
//! One JSON object per line in each direction. Requests are tagged by `op`,
//! responses by `reply`:
//!
//! ```text
//! {"op":"write","endpoint":"led0","data":"1"}
//! {"reply":"written","len":1}
//! ```

use pressled_core::ControlError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Largest read a client may ask for
pub const MAX_READ_LEN: usize = 4096;

/// Read size used when a request doesn't give one
pub const DEFAULT_READ_LEN: usize = 256;

/// Longest request line the daemon accepts, newline excluded
pub const MAX_REQUEST_LEN: usize = 16 * 1024;

fn default_read_len() -> usize {
    DEFAULT_READ_LEN
}

fn default_times() -> u32 {
    1
}

fn default_interval_ms() -> u64 {
    200
}

/// Client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// List endpoint names
    List,
    /// Read the endpoint's status text
    Read {
        endpoint: String,
        #[serde(default = "default_read_len")]
        len: usize,
    },
    /// Write command tokens
    Write { endpoint: String, data: String },
    /// Structured control opcode
    Control { endpoint: String, opcode: u32 },
    /// Tap the simulated button
    Press {
        #[serde(default = "default_times")]
        times: u32,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
    },
}

/// Error category carried in error replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCommand,
    UnsupportedOperation,
    BufferTooSmall,
    TransferFault,
    HardwareUnavailable,
    NoSuchEndpoint,
    Line,
    ShutDown,
    InvalidConfig,
}

impl From<&ControlError> for ErrorKind {
    fn from(e: &ControlError) -> Self {
        match e {
            ControlError::InvalidCommand(_) => ErrorKind::InvalidCommand,
            ControlError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            ControlError::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            ControlError::TransferFault(_) => ErrorKind::TransferFault,
            ControlError::HardwareUnavailable { .. } => ErrorKind::HardwareUnavailable,
            ControlError::NoSuchEndpoint(_) => ErrorKind::NoSuchEndpoint,
            ControlError::Line(_) => ErrorKind::Line,
            ControlError::ShutDown => ErrorKind::ShutDown,
            ControlError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Daemon reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Response {
    Endpoints { endpoints: Vec<String> },
    /// Status text; empty at end of stream
    Data { text: String },
    Written { len: usize },
    Value { value: i32 },
    Ok,
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn from_error(e: &ControlError) -> Self {
        Response::Error {
            kind: e.into(),
            message: e.to_string(),
        }
    }
}

impl From<ControlError> for Response {
    fn from(e: ControlError) -> Self {
        Response::from_error(&e)
    }
}

/// Serialize a message as one line, newline included
pub fn encode_line<T: Serialize>(msg: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim_end())
}

/// Decode a raw line; invalid UTF-8 is reported as a JSON error
pub fn decode_bytes<T: DeserializeOwned>(line: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(line)
}
