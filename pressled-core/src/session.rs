//! Multi-press session tracking
//!
//! A session starts with the first accepted press and ends with a commit,
//! either when `max_presses` is reached or when the deadline armed by the
//! last press passes without another press.

use std::time::Duration;

use tokio::time::Instant;

/// Live press session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressSession {
    pub count: u8,
    pub deadline: Option<Instant>,
}

impl PressSession {
    pub fn is_idle(&self) -> bool {
        self.count == 0 && self.deadline.is_none()
    }
}

/// Why a session was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReason {
    Timeout,
    MaxPresses,
}

impl std::fmt::Display for CommitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitReason::Timeout => write!(f, "timeout"),
            CommitReason::MaxPresses => write!(f, "max presses"),
        }
    }
}

/// Result of feeding an accepted press to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Session continues; the deadline was (re)armed
    Armed { count: u8, deadline: Instant },
    /// Session ended on this press
    Commit { count: u8, reason: CommitReason },
}

/// Session policy; the live `PressSession` is owned by the caller's lock
#[derive(Debug, Clone, Copy)]
pub struct PressTracker {
    timeout: Duration,
    max_presses: u8,
}

impl PressTracker {
    pub fn new(timeout: Duration, max_presses: u8) -> Self {
        Self {
            timeout,
            max_presses: max_presses.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_presses(&self) -> u8 {
        self.max_presses
    }

    /// Count a press accepted at `now`
    pub fn on_accepted_press(&self, session: &mut PressSession, now: Instant) -> PressOutcome {
        session.count = session.count.saturating_add(1);

        if session.count >= self.max_presses {
            let count = session.count;
            *session = PressSession::default();
            return PressOutcome::Commit {
                count,
                reason: CommitReason::MaxPresses,
            };
        }

        let deadline = now + self.timeout;
        session.deadline = Some(deadline);
        PressOutcome::Armed {
            count: session.count,
            deadline,
        }
    }

    /// Timer fired at `now`; returns the committed count, if any
    ///
    /// A deadline that was re-armed past `now` is left alone.
    pub fn on_deadline_expired(&self, session: &mut PressSession, now: Instant) -> Option<u8> {
        match session.deadline {
            Some(deadline) if deadline <= now && session.count > 0 => {
                let count = session.count;
                *session = PressSession::default();
                Some(count)
            }
            Some(deadline) if deadline <= now => {
                session.deadline = None;
                None
            }
            _ => None,
        }
    }
}
