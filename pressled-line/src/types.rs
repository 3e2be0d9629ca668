//! Common types for the line layer

use tokio::time::Instant;

/// Capacity of each line's edge broadcast channel
pub const EDGE_CHANNEL_CAPACITY: usize = 64;

/// Logical level of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    pub fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Direction of a level transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Edge produced by moving from `from` to `to`, if the level changed
    pub fn between(from: Level, to: Level) -> Option<Self> {
        match (from, to) {
            (Level::Low, Level::High) => Some(Edge::Rising),
            (Level::High, Level::Low) => Some(Edge::Falling),
            _ => None,
        }
    }

    /// Level the line settles at after this edge
    pub fn resulting_level(self) -> Level {
        match self {
            Edge::Rising => Level::High,
            Edge::Falling => Level::Low,
        }
    }
}

/// Which edges an input line reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeDetect {
    Rising,
    #[default]
    Falling,
    Both,
}

impl EdgeDetect {
    pub fn matches(self, edge: Edge) -> bool {
        match self {
            EdgeDetect::Rising => edge == Edge::Rising,
            EdgeDetect::Falling => edge == Edge::Falling,
            EdgeDetect::Both => true,
        }
    }
}

impl From<Edge> for EdgeDetect {
    fn from(edge: Edge) -> Self {
        match edge {
            Edge::Rising => EdgeDetect::Rising,
            Edge::Falling => EdgeDetect::Falling,
        }
    }
}

/// A detected transition on an input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Line offset on its chip
    pub offset: u32,
    pub edge: Edge,
    /// When the edge was observed
    pub timestamp: Instant,
}

/// Line direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    Input,
    Output,
}

/// Identification of an acquired line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    /// Chip the line belongs to (e.g. `gpiochip0`)
    pub chip: String,
    /// Line offset on the chip
    pub offset: u32,
    /// Consumer label the line was requested with
    pub consumer: String,
    pub direction: LineDirection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_between_levels() {
        assert_eq!(Edge::between(Level::High, Level::Low), Some(Edge::Falling));
        assert_eq!(Edge::between(Level::Low, Level::High), Some(Edge::Rising));
        assert_eq!(Edge::between(Level::Low, Level::Low), None);
        assert_eq!(Edge::Falling.resulting_level(), Level::Low);
    }

    #[test]
    fn test_edge_detect_matches() {
        assert!(EdgeDetect::Falling.matches(Edge::Falling));
        assert!(!EdgeDetect::Falling.matches(Edge::Rising));
        assert!(EdgeDetect::Both.matches(Edge::Rising));
        assert_eq!(EdgeDetect::from(Edge::Rising), EdgeDetect::Rising);
    }

    #[test]
    fn test_level_conversions() {
        assert_eq!(Level::from(true), Level::High);
        assert_eq!(Level::High.inverted(), Level::Low);
        assert!(!Level::Low.is_high());
    }
}
