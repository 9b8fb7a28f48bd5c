//! Pixel-space geometry primitives used by the arbor layout engine.

#![warn(missing_docs)]

/// Error types for geometry operations.
mod error;
/// Point helpers.
mod point;
/// Rectangle operations.
mod rect;

use serde::{Deserialize, Serialize};

pub use error::{Error, Result};
pub use point::Point;
pub use rect::Rect;

/// Cardinal directions.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Upward direction.
    Up,
    /// Downward direction.
    Down,
    /// Leftward direction.
    Left,
    /// Rightward direction.
    Right,
}

impl Direction {
    /// True for `Up` and `Down`.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }

    /// Derive the dominant direction of a pointer delta. Returns `None` for a
    /// zero delta. Ties between the axes resolve to the horizontal axis.
    pub fn from_delta(dx: f64, dy: f64) -> Option<Self> {
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        if dy.abs() > dx.abs() {
            Some(if dy < 0.0 { Self::Up } else { Self::Down })
        } else {
            Some(if dx < 0.0 { Self::Left } else { Self::Right })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_delta() {
        assert_eq!(Direction::from_delta(0.0, 0.0), None);
        assert_eq!(Direction::from_delta(3.0, 1.0), Some(Direction::Right));
        assert_eq!(Direction::from_delta(-3.0, 1.0), Some(Direction::Left));
        assert_eq!(Direction::from_delta(1.0, -5.0), Some(Direction::Up));
        assert_eq!(Direction::from_delta(1.0, 5.0), Some(Direction::Down));
        assert_eq!(Direction::from_delta(2.0, 2.0), Some(Direction::Right));
        assert!(Direction::Down.is_vertical());
        assert!(!Direction::Left.is_vertical());
    }
}
