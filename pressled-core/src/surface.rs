//! Control surface: read / write / control on per-endpoint handles
//!
//! Endpoints come in three kinds:
//!
//! - `led<i>` - one LED ([`LedEndpoint`])
//! - `button` - the press session and button line ([`ButtonEndpoint`])
//! - `all` - every LED at once ([`AggregateEndpoint`])
//!
//! A [`DeviceHandle`] adds a read offset on top of an endpoint, so a second
//! read on the same handle reports end of stream until it is rewound.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::driver::Shared;
use crate::error::ControlError;
use crate::protocol::{endpoint, opcode, status_bits, token};
use crate::state::StatusSnapshot;

/// Endpoint address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointId {
    Led(usize),
    Button,
    AllLeds,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointId::Led(i) => write!(f, "{}{}", endpoint::LED_PREFIX, i),
            EndpointId::Button => write!(f, "{}", endpoint::BUTTON),
            EndpointId::AllLeds => write!(f, "{}", endpoint::ALL),
        }
    }
}

impl FromStr for EndpointId {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            endpoint::BUTTON => Ok(EndpointId::Button),
            endpoint::ALL => Ok(EndpointId::AllLeds),
            _ => s
                .strip_prefix(endpoint::LED_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
                .map(EndpointId::Led)
                .ok_or_else(|| ControlError::NoSuchEndpoint(s.to_string())),
        }
    }
}

/// Operation carried by a write token or control opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    TurnOn,
    TurnOff,
    Toggle,
    GetStatus,
    Reset,
}

impl ControlCommand {
    /// Decode an LED / aggregate write token
    pub fn from_led_token(b: u8) -> Option<Self> {
        match b {
            token::ON => Some(ControlCommand::TurnOn),
            token::OFF => Some(ControlCommand::TurnOff),
            token::TOGGLE | token::TOGGLE_UPPER => Some(ControlCommand::Toggle),
            _ => None,
        }
    }

    /// Decode an LED / aggregate opcode
    pub fn from_led_opcode(op: u32) -> Option<Self> {
        match op {
            opcode::LED_ON => Some(ControlCommand::TurnOn),
            opcode::LED_OFF => Some(ControlCommand::TurnOff),
            opcode::LED_TOGGLE => Some(ControlCommand::Toggle),
            opcode::GET_STATUS => Some(ControlCommand::GetStatus),
            _ => None,
        }
    }

    /// Decode a button opcode
    pub fn from_button_opcode(op: u32) -> Option<Self> {
        match op {
            opcode::BUTTON_GET_STATUS => Some(ControlCommand::GetStatus),
            opcode::BUTTON_RESET => Some(ControlCommand::Reset),
            _ => None,
        }
    }
}

fn fit(text: String, capacity: usize) -> Result<String, ControlError> {
    if text.len() > capacity {
        return Err(ControlError::BufferTooSmall {
            needed: text.len(),
            available: capacity,
        });
    }
    Ok(text)
}

fn on_off(lit: bool) -> &'static str {
    if lit {
        "ON"
    } else {
        "OFF"
    }
}

/// Operations every endpoint supports
#[async_trait]
pub trait ControlSurface: Send + Sync {
    fn id(&self) -> EndpointId;

    /// Current snapshot (the button endpoint consumes the pressed flag)
    async fn status(&self) -> Result<StatusSnapshot, ControlError>;

    /// Status text, if it fits in `capacity` bytes
    ///
    /// Nothing is consumed when the text doesn't fit.
    async fn read_text(&self, capacity: usize) -> Result<String, ControlError>;

    /// Apply the command token in the first byte; reports the whole length
    async fn write_command(&self, data: &[u8]) -> Result<usize, ControlError>;

    /// Map an opcode to a command this endpoint understands
    fn decode_opcode(&self, op: u32) -> Result<ControlCommand, ControlError>;

    /// Run a command, returning its integer result (0 for mutations)
    async fn execute(&self, command: ControlCommand) -> Result<i32, ControlError>;

    async fn control(&self, op: u32) -> Result<i32, ControlError> {
        let command = self.decode_opcode(op)?;
        debug!("{}: {} ({:?})", self.id(), opcode::name(op), command);
        self.execute(command).await
    }
}

// === LED endpoint ===

pub struct LedEndpoint {
    index: usize,
    name: String,
    shared: Arc<Shared>,
}

impl LedEndpoint {
    pub(crate) fn new(index: usize, name: String, shared: Arc<Shared>) -> Self {
        Self {
            index,
            name,
            shared,
        }
    }
}

#[async_trait]
impl ControlSurface for LedEndpoint {
    fn id(&self) -> EndpointId {
        EndpointId::Led(self.index)
    }

    async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        self.shared.snapshot().await
    }

    async fn read_text(&self, capacity: usize) -> Result<String, ControlError> {
        let snap = self.shared.snapshot().await?;
        let lit = snap.led_mask & (1 << self.index) != 0;
        fit(format!("{} is {}\n", self.name, on_off(lit)), capacity)
    }

    async fn write_command(&self, data: &[u8]) -> Result<usize, ControlError> {
        let command = data
            .first()
            .and_then(|b| ControlCommand::from_led_token(*b))
            .ok_or_else(|| ControlError::invalid_token(data))?;
        self.execute(command).await?;
        Ok(data.len())
    }

    fn decode_opcode(&self, op: u32) -> Result<ControlCommand, ControlError> {
        ControlCommand::from_led_opcode(op)
            .ok_or_else(|| ControlError::unsupported_opcode(op, &self.id().to_string()))
    }

    async fn execute(&self, command: ControlCommand) -> Result<i32, ControlError> {
        match command {
            ControlCommand::GetStatus => {
                let snap = self.shared.snapshot().await?;
                Ok(i32::from(snap.led_mask & (1 << self.index) != 0))
            }
            ControlCommand::TurnOn | ControlCommand::TurnOff | ControlCommand::Toggle => {
                self.shared.led_command(self.id(), command).await?;
                Ok(0)
            }
            ControlCommand::Reset => Err(ControlError::UnsupportedOperation(format!(
                "reset on {}",
                self.id()
            ))),
        }
    }
}

// === Aggregate endpoint ===

pub struct AggregateEndpoint {
    names: Vec<String>,
    shared: Arc<Shared>,
}

impl AggregateEndpoint {
    pub(crate) fn new(names: Vec<String>, shared: Arc<Shared>) -> Self {
        Self { names, shared }
    }
}

#[async_trait]
impl ControlSurface for AggregateEndpoint {
    fn id(&self) -> EndpointId {
        EndpointId::AllLeds
    }

    async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        self.shared.snapshot().await
    }

    async fn read_text(&self, capacity: usize) -> Result<String, ControlError> {
        let snap = self.shared.snapshot().await?;
        let text: String = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} is {}\n", name, on_off(snap.led_mask & (1 << i) != 0)))
            .collect();
        fit(text, capacity)
    }

    async fn write_command(&self, data: &[u8]) -> Result<usize, ControlError> {
        let command = data
            .first()
            .and_then(|b| ControlCommand::from_led_token(*b))
            .ok_or_else(|| ControlError::invalid_token(data))?;
        self.execute(command).await?;
        Ok(data.len())
    }

    fn decode_opcode(&self, op: u32) -> Result<ControlCommand, ControlError> {
        ControlCommand::from_led_opcode(op)
            .ok_or_else(|| ControlError::unsupported_opcode(op, &self.id().to_string()))
    }

    async fn execute(&self, command: ControlCommand) -> Result<i32, ControlError> {
        match command {
            ControlCommand::GetStatus => Ok(i32::from(self.shared.snapshot().await?.led_mask)),
            ControlCommand::TurnOn | ControlCommand::TurnOff | ControlCommand::Toggle => {
                self.shared.led_command(self.id(), command).await?;
                Ok(0)
            }
            ControlCommand::Reset => Err(ControlError::UnsupportedOperation(format!(
                "reset on {}",
                self.id()
            ))),
        }
    }
}

// === Button endpoint ===

pub struct ButtonEndpoint {
    shared: Arc<Shared>,
}

impl ButtonEndpoint {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn render(&self, snap: &StatusSnapshot) -> String {
        format!(
            "Button: {}\nPress Count: {}\nCurrent State: {}\n",
            if snap.button_pressed { "PRESSED" } else { "RELEASED" },
            snap.press_count,
            snap.led_state.describe(self.shared.led_names()),
        )
    }
}

/// Pack a snapshot into the button GET_STATUS value
pub fn button_status_bits(snap: &StatusSnapshot) -> i32 {
    let mut bits = 0;
    if snap.led_mask != 0 {
        bits |= status_bits::LED_ON;
    }
    if snap.button_held {
        bits |= status_bits::BUTTON_HELD;
    }
    if snap.button_pressed {
        bits |= status_bits::PRESSED_LATCH;
    }
    bits
}

#[async_trait]
impl ControlSurface for ButtonEndpoint {
    fn id(&self) -> EndpointId {
        EndpointId::Button
    }

    async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        let snap = self.shared.snapshot().await?;
        self.shared.consume_pressed(&snap);
        Ok(snap)
    }

    async fn read_text(&self, capacity: usize) -> Result<String, ControlError> {
        let snap = self.shared.snapshot().await?;
        let text = fit(self.render(&snap), capacity)?;
        self.shared.consume_pressed(&snap);
        Ok(text)
    }

    async fn write_command(&self, data: &[u8]) -> Result<usize, ControlError> {
        match data.first() {
            Some(&token::RESET) => {
                self.execute(ControlCommand::Reset).await?;
            }
            Some(&token::LOG_STATUS) => {
                let snap = self.shared.snapshot().await?;
                info!(
                    "Button status: count={} pressed={} held={} state={:?}",
                    snap.press_count, snap.button_pressed, snap.button_held, snap.led_state
                );
            }
            _ => return Err(ControlError::invalid_token(data)),
        }
        Ok(data.len())
    }

    fn decode_opcode(&self, op: u32) -> Result<ControlCommand, ControlError> {
        ControlCommand::from_button_opcode(op)
            .ok_or_else(|| ControlError::unsupported_opcode(op, &self.id().to_string()))
    }

    async fn execute(&self, command: ControlCommand) -> Result<i32, ControlError> {
        match command {
            ControlCommand::GetStatus => {
                let snap = self.shared.snapshot().await?;
                Ok(button_status_bits(&snap))
            }
            ControlCommand::Reset => {
                self.shared.reset().await?;
                Ok(0)
            }
            other => Err(ControlError::UnsupportedOperation(format!(
                "{other:?} on {}",
                self.id()
            ))),
        }
    }
}

// === File-style handle ===

/// An opened endpoint with a read offset
pub struct DeviceHandle {
    surface: Arc<dyn ControlSurface>,
    offset: usize,
}

impl DeviceHandle {
    pub(crate) fn new(surface: Arc<dyn ControlSurface>) -> Self {
        Self { surface, offset: 0 }
    }

    pub fn id(&self) -> EndpointId {
        self.surface.id()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Copy the whole status message into `buf`
    ///
    /// Returns 0 once the message has been read. A buffer that can't hold
    /// the message fails without copying anything or moving the offset.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ControlError> {
        if self.offset > 0 {
            return Ok(0);
        }
        let text = self.surface.read_text(buf.len()).await?;
        let bytes = text.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        self.offset = bytes.len();
        Ok(bytes.len())
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<usize, ControlError> {
        self.surface.write_command(data).await
    }

    pub async fn ioctl(&mut self, op: u32) -> Result<i32, ControlError> {
        self.surface.control(op).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        self.surface.status().await
    }

    /// Start reading from the beginning again
    pub fn rewind(&mut self) {
        self.offset = 0;
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("endpoint", &self.surface.id())
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::LedState;

    #[test]
    fn test_endpoint_names() {
        assert_eq!("led0".parse::<EndpointId>().unwrap(), EndpointId::Led(0));
        assert_eq!("led12".parse::<EndpointId>().unwrap(), EndpointId::Led(12));
        assert_eq!("button".parse::<EndpointId>().unwrap(), EndpointId::Button);
        assert_eq!("all".parse::<EndpointId>().unwrap(), EndpointId::AllLeds);
        assert!("ledx".parse::<EndpointId>().is_err());
        assert!("lamp".parse::<EndpointId>().is_err());
        assert_eq!(EndpointId::Led(2).to_string(), "led2");
    }

    #[test]
    fn test_token_decoding() {
        assert_eq!(ControlCommand::from_led_token(b'1'), Some(ControlCommand::TurnOn));
        assert_eq!(ControlCommand::from_led_token(b'0'), Some(ControlCommand::TurnOff));
        assert_eq!(ControlCommand::from_led_token(b't'), Some(ControlCommand::Toggle));
        assert_eq!(ControlCommand::from_led_token(b'T'), Some(ControlCommand::Toggle));
        assert_eq!(ControlCommand::from_led_token(b'r'), None);
    }

    #[test]
    fn test_opcode_decoding() {
        assert_eq!(
            ControlCommand::from_led_opcode(opcode::GET_STATUS),
            Some(ControlCommand::GetStatus)
        );
        assert_eq!(ControlCommand::from_led_opcode(opcode::BUTTON_RESET), None);
        assert_eq!(
            ControlCommand::from_button_opcode(opcode::BUTTON_RESET),
            Some(ControlCommand::Reset)
        );
        assert_eq!(ControlCommand::from_button_opcode(opcode::LED_ON), None);
    }

    #[test]
    fn test_button_status_bits() {
        let mut snap = StatusSnapshot {
            led_state: LedState::Slot(0),
            led_mask: 0b001,
            button_pressed: false,
            button_held: true,
            press_count: 0,
            press_seq: 0,
        };
        assert_eq!(button_status_bits(&snap), 0b011);

        snap.led_state = LedState::AllOff;
        snap.led_mask = 0;
        snap.button_held = false;
        snap.button_pressed = true;
        assert_eq!(button_status_bits(&snap), 0b100);
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("abc".to_string(), 3).unwrap(), "abc");
        assert!(matches!(
            fit("abcd".to_string(), 3),
            Err(ControlError::BufferTooSmall {
                needed: 4,
                available: 3
            })
        ));
    }
}
