//! In-memory GPIO chip
//!
//! Lines float high until something drives them, which matches a pulled-up
//! active-low button at rest. Tests and `--simulate` runs drive input lines
//! with [`SimChip::press`] / [`SimChip::release`] and inspect outputs with
//! [`SimChip::level`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::LineError;
use crate::types::{
    Edge, EdgeDetect, EdgeEvent, Level, LineDirection, LineInfo, EDGE_CHANNEL_CAPACITY,
};
use crate::{InputLine, LineProvider, OutputLine};

struct SimLine {
    level: Level,
    owner: Option<String>,
    detect: Option<EdgeDetect>,
    edges: Option<broadcast::Sender<EdgeEvent>>,
    writes: u64,
    fail_writes: bool,
}

impl Default for SimLine {
    fn default() -> Self {
        Self {
            level: Level::High,
            owner: None,
            detect: None,
            edges: None,
            writes: 0,
            fail_writes: false,
        }
    }
}

#[derive(Default)]
struct SimState {
    lines: HashMap<u32, SimLine>,
    unavailable: HashSet<u32>,
}

struct SimInner {
    name: String,
    state: Mutex<SimState>,
}

/// Simulated GPIO chip
///
/// Cloning yields another handle to the same chip.
#[derive(Clone)]
pub struct SimChip {
    inner: Arc<SimInner>,
}

impl SimChip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SimInner {
                name: name.into(),
                state: Mutex::new(SimState::default()),
            }),
        }
    }

    /// Make `offset` fail with `NotFound` on the next request
    pub fn mark_unavailable(&self, offset: u32) {
        self.inner.state.lock().unavailable.insert(offset);
    }

    /// Make writes to `offset` fail (or succeed again)
    pub fn fail_writes(&self, offset: u32, fail: bool) {
        let mut state = self.inner.state.lock();
        state.lines.entry(offset).or_default().fail_writes = fail;
    }

    /// Whether some handle currently owns `offset`
    pub fn is_claimed(&self, offset: u32) -> bool {
        self.owner(offset).is_some()
    }

    /// Consumer label of the handle owning `offset`
    pub fn owner(&self, offset: u32) -> Option<String> {
        let state = self.inner.state.lock();
        state.lines.get(&offset).and_then(|l| l.owner.clone())
    }

    /// Current level of `offset`
    pub fn level(&self, offset: u32) -> Level {
        let state = self.inner.state.lock();
        state.lines.get(&offset).map(|l| l.level).unwrap_or(Level::High)
    }

    /// Number of successful writes through an output handle on `offset`
    pub fn write_count(&self, offset: u32) -> u64 {
        let state = self.inner.state.lock();
        state.lines.get(&offset).map(|l| l.writes).unwrap_or(0)
    }

    /// Drive an input line externally, emitting an edge if the level changed
    pub fn drive(&self, offset: u32, level: Level) {
        let mut state = self.inner.state.lock();
        let line = state.lines.entry(offset).or_default();
        let previous = line.level;
        line.level = level;

        let Some(edge) = Edge::between(previous, level) else {
            return;
        };
        let reportable = line.detect.is_some_and(|d| d.matches(edge));
        if let (true, Some(tx)) = (reportable, line.edges.as_ref()) {
            trace!("sim {} line {}: {:?}", self.inner.name, offset, edge);
            // No receivers is fine, the edge is simply unobserved
            let _ = tx.send(EdgeEvent {
                offset,
                edge,
                timestamp: Instant::now(),
            });
        }
    }

    /// Pull the line low (pressing an active-low button)
    pub fn press(&self, offset: u32) {
        self.drive(offset, Level::Low);
    }

    /// Let the line float back high
    pub fn release(&self, offset: u32) {
        self.drive(offset, Level::High);
    }

    /// Press and release
    pub fn tap(&self, offset: u32) {
        self.press(offset);
        self.release(offset);
    }

    fn claim(
        &self,
        offset: u32,
        consumer: &str,
        direction: LineDirection,
    ) -> Result<LineInfo, LineError> {
        let mut state = self.inner.state.lock();
        if state.unavailable.contains(&offset) {
            return Err(LineError::NotFound {
                chip: self.inner.name.clone(),
                offset,
            });
        }
        let line = state.lines.entry(offset).or_default();
        if let Some(owner) = &line.owner {
            return Err(LineError::Busy {
                offset,
                owner: owner.clone(),
            });
        }
        line.owner = Some(consumer.to_string());
        debug!("sim {}: line {} claimed by {}", self.inner.name, offset, consumer);
        Ok(LineInfo {
            chip: self.inner.name.clone(),
            offset,
            consumer: consumer.to_string(),
            direction,
        })
    }
}

impl LineProvider for SimChip {
    fn chip_name(&self) -> &str {
        &self.inner.name
    }

    fn request_output(
        &self,
        offset: u32,
        consumer: &str,
        initial: Level,
    ) -> Result<Box<dyn OutputLine>, LineError> {
        let info = self.claim(offset, consumer, LineDirection::Output)?;
        {
            let mut state = self.inner.state.lock();
            let line = state.lines.entry(offset).or_default();
            line.level = initial;
            line.detect = None;
            line.edges = None;
        }
        Ok(Box::new(SimOutput {
            chip: Arc::clone(&self.inner),
            info,
        }))
    }

    fn request_input(
        &self,
        offset: u32,
        consumer: &str,
        detect: EdgeDetect,
    ) -> Result<Box<dyn InputLine>, LineError> {
        let info = self.claim(offset, consumer, LineDirection::Input)?;
        let (tx, _) = broadcast::channel(EDGE_CHANNEL_CAPACITY);
        {
            let mut state = self.inner.state.lock();
            let line = state.lines.entry(offset).or_default();
            line.detect = Some(detect);
            line.edges = Some(tx.clone());
        }
        Ok(Box::new(SimInput {
            chip: Arc::clone(&self.inner),
            info,
            edges: tx,
        }))
    }
}

fn release_claim(chip: &SimInner, offset: u32) {
    let mut state = chip.state.lock();
    if let Some(line) = state.lines.get_mut(&offset) {
        line.owner = None;
        line.detect = None;
        line.edges = None;
    }
    debug!("sim {}: line {} released", chip.name, offset);
}

struct SimOutput {
    chip: Arc<SimInner>,
    info: LineInfo,
}

impl OutputLine for SimOutput {
    fn info(&self) -> &LineInfo {
        &self.info
    }

    fn set_level(&self, level: Level) -> Result<(), LineError> {
        let mut state = self.chip.state.lock();
        let line = state.lines.entry(self.info.offset).or_default();
        if line.fail_writes {
            return Err(LineError::Io(format!(
                "simulated write fault on line {}",
                self.info.offset
            )));
        }
        line.level = level;
        line.writes += 1;
        Ok(())
    }

    fn level(&self) -> Result<Level, LineError> {
        let state = self.chip.state.lock();
        Ok(state
            .lines
            .get(&self.info.offset)
            .map(|l| l.level)
            .unwrap_or(Level::High))
    }
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        release_claim(&self.chip, self.info.offset);
    }
}

struct SimInput {
    chip: Arc<SimInner>,
    info: LineInfo,
    edges: broadcast::Sender<EdgeEvent>,
}

impl InputLine for SimInput {
    fn info(&self) -> &LineInfo {
        &self.info
    }

    fn level(&self) -> Result<Level, LineError> {
        let state = self.chip.state.lock();
        Ok(state
            .lines
            .get(&self.info.offset)
            .map(|l| l.level)
            .unwrap_or(Level::High))
    }

    fn subscribe_edges(&self) -> broadcast::Receiver<EdgeEvent> {
        self.edges.subscribe()
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        release_claim(&self.chip, self.info.offset);
    }
}
