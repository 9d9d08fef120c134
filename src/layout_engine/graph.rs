use serde::{Deserialize, Serialize};

/// The direction of a split's divider.
///
/// A `Vertical` split has a vertical divider, so its children sit side by
/// side (first = left). A `Horizontal` split stacks them (first = top).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// Orientation of a split created at `depth` below the root.
    pub fn for_depth(depth: usize) -> Self {
        if depth % 2 == 0 { Orientation::Vertical } else { Orientation::Horizontal }
    }

    pub fn perpendicular(self) -> Self {
        match self {
            Orientation::Horizontal => Orientation::Vertical,
            Orientation::Vertical => Orientation::Horizontal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// The split orientation that separates windows along this direction.
    pub fn split_orientation(self) -> Orientation {
        match self {
            Direction::Left | Direction::Right => Orientation::Vertical,
            Direction::Up | Direction::Down => Orientation::Horizontal,
        }
    }

    /// Whether moving this way goes from a split's first child to its second.
    pub fn toward_second(self) -> bool { matches!(self, Direction::Right | Direction::Down) }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}
