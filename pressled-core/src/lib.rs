//! pressled core: button press sessions driving a bank of LEDs
//!
//! A debounced button feeds a multi-press session. The session commits when
//! its deadline passes or when the press limit is reached, and the committed
//! count selects an LED state. A [`Driver`] owns all of it and exposes a
//! file-like control surface per endpoint.

pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod led;
pub mod protocol;
pub mod session;
pub mod state;
pub mod surface;

pub use config::{ButtonLine, DriverConfig, LedLine, MAX_LEDS};
pub use debounce::DebounceFilter;
pub use dispatch::{DispatchResult, DispatchSlot, DispatchStats};
pub use driver::Driver;
pub use error::ControlError;
pub use led::{LedBank, LedState};
pub use session::{CommitReason, PressOutcome, PressSession, PressTracker};
pub use state::{DriverEvent, StatusSnapshot};
pub use surface::{
    button_status_bits, AggregateEndpoint, ButtonEndpoint, ControlCommand, ControlSurface,
    DeviceHandle, EndpointId, LedEndpoint,
};
