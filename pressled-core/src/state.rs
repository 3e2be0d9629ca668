//! Shared state types

use crate::debounce::DebounceFilter;
use crate::led::LedState;
use crate::session::{CommitReason, PressSession};
use crate::surface::{ControlCommand, EndpointId};

/// State touched by the trigger and timer contexts
///
/// Lives under a `parking_lot::Mutex` that is only held for short,
/// non-blocking sections.
#[derive(Debug)]
pub(crate) struct FastState {
    pub debounce: DebounceFilter,
    pub session: PressSession,
    /// Accepted presses since start
    pub press_seq: u64,
    /// Highest `press_seq` consumed by a button read
    pub consumed_seq: u64,
    /// Bumped by every reset; commits from an older generation are stale
    pub reset_gen: u64,
}

impl FastState {
    pub fn new(debounce: DebounceFilter) -> Self {
        Self {
            debounce,
            session: PressSession::default(),
            press_seq: 0,
            consumed_seq: 0,
            reset_gen: 0,
        }
    }

    /// Tag a committed count with the current reset generation
    pub fn commit(&self, count: u8) -> Commit {
        Commit {
            count,
            generation: self.reset_gen,
        }
    }

    /// A press was accepted since the last consuming button read
    pub fn pressed_latch(&self) -> bool {
        self.press_seq > self.consumed_seq
    }

    /// Consume the latch up to the press observed by a snapshot
    ///
    /// Presses accepted after that snapshot stay latched.
    pub fn consume_through(&mut self, seq: u64) {
        self.consumed_seq = self.consumed_seq.max(seq);
    }
}

/// Committed press count handed to the deferred worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Commit {
    pub count: u8,
    pub generation: u64,
}

/// Consistent view of the LEDs and the button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub led_state: LedState,
    pub led_mask: u8,
    /// Pressed since the last consuming button read
    pub button_pressed: bool,
    /// Button line is at its pressed level right now
    pub button_held: bool,
    /// Presses in the live session
    pub press_count: u8,
    pub(crate) press_seq: u64,
}

/// Notifications for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    PressAccepted {
        count: u8,
    },
    Committed {
        count: u8,
        reason: CommitReason,
    },
    Applied {
        count: u8,
        state: LedState,
    },
    Commanded {
        endpoint: EndpointId,
        command: ControlCommand,
        state: LedState,
    },
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pressed_latch() {
        let mut fast = FastState::new(DebounceFilter::new(Duration::from_millis(50)));
        assert!(!fast.pressed_latch());

        fast.press_seq = 2;
        assert!(fast.pressed_latch());

        fast.consume_through(1);
        assert!(fast.pressed_latch());
        fast.consume_through(2);
        assert!(!fast.pressed_latch());

        // Stale consumers can't move the mark backwards
        fast.consume_through(1);
        assert_eq!(fast.consumed_seq, 2);
    }
}
