use serde::{Deserialize, Serialize};

/// Integer lattice coordinate.
///
/// Cells and vertices share the same lattice: cell `(x, y)` owns the corner
/// vertices `(x, y)`, `(x + 1, y)`, `(x + 1, y + 1)` and `(x, y + 1)`.
/// Ordering is lexicographic on `(x, y)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Corner vertices of the cell at this coordinate, in bottom-left,
    /// bottom-right, top-right, top-left order.
    pub const fn corners(self) -> [GridCoord; 4] {
        let Self { x, y } = self;
        [
            GridCoord::new(x, y),
            GridCoord::new(x + 1, y),
            GridCoord::new(x + 1, y + 1),
            GridCoord::new(x, y + 1),
        ]
    }

    pub const fn step(self, dir: GridDir) -> GridCoord {
        let (dx, dy) = dir.delta();
        GridCoord::new(self.x + dx, self.y + dy)
    }

    /// Cells that may own this coordinate as one of their corners.
    pub const fn adjacent_cells(self) -> [GridCoord; 4] {
        let Self { x, y } = self;
        [
            GridCoord::new(x, y - 1),
            GridCoord::new(x - 1, y - 1),
            GridCoord::new(x - 1, y),
            GridCoord::new(x, y),
        ]
    }
}

impl From<(i32, i32)> for GridCoord {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the four lattice directions a cell can be extended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridDir {
    PosX,
    NegX,
    PosY,
    NegY,
}

impl GridDir {
    pub const ALL: [GridDir; 4] = [GridDir::PosX, GridDir::NegX, GridDir::PosY, GridDir::NegY];

    pub const fn delta(self) -> (i32, i32) {
        match self {
            GridDir::PosX => (1, 0),
            GridDir::NegX => (-1, 0),
            GridDir::PosY => (0, 1),
            GridDir::NegY => (0, -1),
        }
    }

    /// True for the grid X directions.
    pub const fn is_horizontal(self) -> bool {
        matches!(self, GridDir::PosX | GridDir::NegX)
    }

    /// The two corners of `cell` on the side facing this direction, ordered so
    /// that walking first → second keeps the cell interior on the left.
    pub const fn edge_of(self, cell: GridCoord) -> (GridCoord, GridCoord) {
        let [bl, br, tr, tl] = cell.corners();
        match self {
            GridDir::PosX => (br, tr),
            GridDir::NegX => (tl, bl),
            GridDir::PosY => (tr, tl),
            GridDir::NegY => (bl, br),
        }
    }
}

/// Undirected edge between two resolved vertices, stored with the lower
/// coordinate first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(pub GridCoord, pub GridCoord);

impl EdgeKey {
    /// Returns `None` for a collapsed edge (both ends resolve to the same vertex).
    pub fn new(a: GridCoord, b: GridCoord) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self(a, b)),
            std::cmp::Ordering::Greater => Some(Self(b, a)),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_wind_around_cell() {
        let c = GridCoord::new(2, -1);
        assert_eq!(
            c.corners(),
            [
                GridCoord::new(2, -1),
                GridCoord::new(3, -1),
                GridCoord::new(3, 0),
                GridCoord::new(2, 0),
            ]
        );
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(GridCoord::new(0, 5) < GridCoord::new(1, 0));
        assert!(GridCoord::new(1, 0) < GridCoord::new(1, 1));
    }

    #[test]
    fn edge_key_sorts_and_rejects_collapsed() {
        let a = GridCoord::new(1, 0);
        let b = GridCoord::new(0, 3);
        assert_eq!(EdgeKey::new(a, b), Some(EdgeKey(b, a)));
        assert_eq!(EdgeKey::new(a, a), None);
    }

    #[test]
    fn edge_of_matches_shared_side() {
        let left = GridCoord::new(0, 0);
        let right = left.step(GridDir::PosX);
        let (a, b) = GridDir::PosX.edge_of(left);
        let (c, d) = GridDir::NegX.edge_of(right);
        assert_eq!(EdgeKey::new(a, b), EdgeKey::new(c, d));
    }
}
