use crate::GridCoord;

/// Everything a grid operation can refuse to do.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetopoError {
    #[error("no retopology session is active")]
    NoSession,
    #[error("the grid is empty")]
    EmptyGrid,
    #[error("no align reference is marked")]
    EmptyContainer,
    #[error("the align reference has no vertices")]
    NoContainerGeometry,
    #[error("could not find the surface")]
    SurfaceMiss,
    #[error("the reference transform cannot be inverted")]
    NonInvertibleTransform,
    #[error("cannot delete the last cell")]
    LastCell,
    #[error("cannot merge two pinned vertices")]
    BothPinned,
    #[error("vertices are already merged")]
    AlreadyMerged,
    #[error("merge chain starting at {0} does not terminate")]
    BrokenMergeChain(GridCoord),
    #[error("vertex {0} is not part of the grid")]
    UnknownVertex(GridCoord),
    #[error("cell {0} is already occupied")]
    CellOccupied(GridCoord),
    #[error("cell {0} does not exist")]
    UnknownCell(GridCoord),
    #[error("line is too short")]
    LineTooShort,
    #[error("no vertices to pin")]
    NothingToPin,
    #[error("cell {0} is already at its minimum size")]
    MinimumSize(GridCoord),
    #[error("the grid produced no faces")]
    DegenerateGrid,
}

impl RetopoError {
    /// The message as a status line: capitalized, with a full stop.
    pub fn sentence(&self) -> String {
        let text = self.to_string();
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }
}

pub type Result<T, E = RetopoError> = std::result::Result<T, E>;
