//! Handoff from the non-blocking trigger/timer contexts to the deferred worker
//!
//! A capacity-1 slot: the producer never blocks and never allocates. A commit
//! that arrives while an earlier one is still pending replaces it.

use parking_lot::Mutex;
use tokio::sync::Notify;

/// What happened to a dispatched value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult<T> {
    /// Slot was empty
    Queued,
    /// Replaced this still-pending value
    Coalesced(T),
    /// Slot closed, value dropped
    Closed,
}

/// Counters for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub coalesced: u64,
    pub discarded: u64,
}

#[derive(Debug)]
struct SlotState<T> {
    pending: Option<T>,
    closed: bool,
    stats: DispatchStats,
}

#[derive(Debug)]
pub struct DispatchSlot<T> {
    state: Mutex<SlotState<T>>,
    notify: Notify,
}

impl<T> Default for DispatchSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
                stats: DispatchStats::default(),
            }),
            notify: Notify::new(),
        }
    }
}

impl<T> DispatchSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a committed value and wake the worker
    pub fn dispatch(&self, value: T) -> DispatchResult<T> {
        let result = {
            let mut state = self.state.lock();
            if state.closed {
                return DispatchResult::Closed;
            }
            state.stats.dispatched += 1;
            match state.pending.replace(value) {
                Some(previous) => {
                    state.stats.coalesced += 1;
                    DispatchResult::Coalesced(previous)
                }
                None => DispatchResult::Queued,
            }
        };
        self.notify.notify_one();
        result
    }

    /// Take the pending value without waiting
    pub fn take(&self) -> Option<T> {
        self.state.lock().pending.take()
    }

    /// Drop the pending value, returning it
    pub fn discard(&self) -> Option<T> {
        let mut state = self.state.lock();
        let dropped = state.pending.take();
        if dropped.is_some() {
            state.stats.discarded += 1;
        }
        dropped
    }

    /// Refuse further dispatches and wake the worker so it can exit
    ///
    /// Returns the pending value that will never be applied.
    pub fn close(&self) -> Option<T> {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            let dropped = state.pending.take();
            if dropped.is_some() {
                state.stats.discarded += 1;
            }
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> DispatchStats {
        self.state.lock().stats
    }

    /// Wait for the next value; `None` once the slot is closed
    pub async fn next(&self) -> Option<T> {
        loop {
            // Register interest before checking so a dispatch between the
            // check and the await isn't lost
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(value) = state.pending.take() {
                    return Some(value);
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_coalescing() {
        let slot = DispatchSlot::<u8>::new();
        assert_eq!(slot.dispatch(2), DispatchResult::Queued);
        assert_eq!(slot.dispatch(3), DispatchResult::Coalesced(2));
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);

        let stats = slot.stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.coalesced, 1);
    }

    #[test]
    fn test_close_discards_pending() {
        let slot = DispatchSlot::<u8>::new();
        slot.dispatch(4);
        assert_eq!(slot.close(), Some(4));
        assert!(slot.is_closed());
        assert_eq!(slot.dispatch(1), DispatchResult::Closed);
        assert_eq!(slot.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_next_waits_for_dispatch() {
        let slot = Arc::new(DispatchSlot::<u8>::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move {
                while let Some(count) = slot.next().await {
                    let _ = tx.send(count);
                }
            })
        };

        slot.dispatch(1);
        assert_eq!(rx.recv().await, Some(1));
        slot.dispatch(2);
        assert_eq!(rx.recv().await, Some(2));

        assert_eq!(slot.close(), None);
        worker.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
