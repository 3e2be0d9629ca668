//! Time-gated edge filter

use std::time::Duration;

use tokio::time::Instant;

/// Accepts an edge only if the previous accepted edge is at least `window` old
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl DebounceFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Gate an edge observed at `now`
    ///
    /// Timestamps that go backwards count as zero elapsed time, so they are
    /// rejected while inside the window.
    pub fn accept_edge(&mut self, now: Instant) -> bool {
        let accept = match self.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if accept {
            self.last_accepted = Some(now);
        }
        accept
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn test_first_edge_accepted() {
        let mut filter = DebounceFilter::new(WINDOW);
        assert!(filter.accept_edge(Instant::now()));
    }

    #[test]
    fn test_bounce_rejected() {
        let mut filter = DebounceFilter::new(WINDOW);
        let t0 = Instant::now();
        assert!(filter.accept_edge(t0));
        assert!(!filter.accept_edge(t0 + Duration::from_millis(10)));
        assert!(!filter.accept_edge(t0 + Duration::from_millis(49)));
        // Rejections don't move the reference point
        assert!(filter.accept_edge(t0 + WINDOW));
        assert_eq!(filter.last_accepted(), Some(t0 + WINDOW));
    }

    #[test]
    fn test_backwards_timestamp_rejected() {
        let mut filter = DebounceFilter::new(WINDOW);
        let t0 = Instant::now() + Duration::from_secs(1);
        assert!(filter.accept_edge(t0));
        assert!(!filter.accept_edge(t0 - Duration::from_millis(100)));
    }
}
