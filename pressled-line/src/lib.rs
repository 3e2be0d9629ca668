//! GPIO line abstraction for pressled
//!
//! The driver core never talks to hardware directly. It acquires lines through
//! a [`LineProvider`] and then only reads levels, sets levels, and listens to
//! edge events. Backends:
//!
//! - [`SimChip`] - in-memory chip for tests and `--simulate` runs
//! - `cdev::CdevChip` - Linux GPIO character device (`cdev` feature)

pub mod error;
pub mod sim;
pub mod types;

#[cfg(feature = "cdev")]
pub mod cdev;

pub use error::LineError;
pub use sim::SimChip;
pub use types::{
    Edge, EdgeDetect, EdgeEvent, Level, LineDirection, LineInfo, EDGE_CHANNEL_CAPACITY,
};

use tokio::sync::broadcast;

/// Source of GPIO lines (one chip)
///
/// Dropping a returned line releases it.
pub trait LineProvider: Send + Sync {
    /// Chip name, used in logs and errors
    fn chip_name(&self) -> &str;

    /// Claim a line as output, driven to `initial` immediately
    fn request_output(
        &self,
        offset: u32,
        consumer: &str,
        initial: Level,
    ) -> Result<Box<dyn OutputLine>, LineError>;

    /// Claim a line as input reporting the edges selected by `detect`
    fn request_input(
        &self,
        offset: u32,
        consumer: &str,
        detect: EdgeDetect,
    ) -> Result<Box<dyn InputLine>, LineError>;
}

/// An acquired output line
pub trait OutputLine: Send + Sync {
    fn info(&self) -> &LineInfo;

    /// Drive the line
    fn set_level(&self, level: Level) -> Result<(), LineError>;

    /// Level the line is currently driven at
    fn level(&self) -> Result<Level, LineError>;
}

/// An acquired input line
pub trait InputLine: Send + Sync {
    fn info(&self) -> &LineInfo;

    /// Read the current level
    fn level(&self) -> Result<Level, LineError>;

    /// Subscribe to edge events
    ///
    /// Events are pushed from whatever context the backend detects them in;
    /// slow receivers see `RecvError::Lagged` rather than blocking the source.
    fn subscribe_edges(&self) -> broadcast::Receiver<EdgeEvent>;
}
