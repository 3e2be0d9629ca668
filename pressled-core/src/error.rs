//! Control surface and driver errors

use pressled_line::LineError;
use thiserror::Error;

/// Errors returned by the driver and its control surface
///
/// Every variant except `HardwareUnavailable` is returned to the caller of a
/// single operation and leaves driver state as it was before the call.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Transfer fault: {0}")]
    TransferFault(String),

    #[error("Hardware unavailable: {line}: {source}")]
    HardwareUnavailable {
        line: String,
        #[source]
        source: LineError,
    },

    #[error("No such endpoint: {0}")]
    NoSuchEndpoint(String),

    #[error("Line error: {0}")]
    Line(#[from] LineError),

    #[error("Driver is shut down")]
    ShutDown,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ControlError {
    /// Render a write token for `InvalidCommand`
    pub fn invalid_token(data: &[u8]) -> Self {
        match data.first() {
            None => ControlError::InvalidCommand("empty write".to_string()),
            Some(b) if b.is_ascii_graphic() => {
                ControlError::InvalidCommand(format!("'{}'", *b as char))
            }
            Some(b) => ControlError::InvalidCommand(format!("0x{b:02x}")),
        }
    }

    /// Render an opcode for `UnsupportedOperation`
    pub fn unsupported_opcode(op: u32, endpoint: &str) -> Self {
        ControlError::UnsupportedOperation(format!("opcode 0x{op:08x} on {endpoint}"))
    }
}
