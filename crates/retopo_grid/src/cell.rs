use bevy::math::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// A single quad of the retopology grid.
///
/// `rot` is an orthonormal frame whose Z column is the surface normal at
/// `loc`. `ideal_rot` remembers the frame the cell was created with so the
/// grid operators can tell how far a cell has drifted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub loc: Vec3,
    pub rot: Mat3,
    pub size: Vec2,
    pub ideal_rot: Mat3,
}

impl Cell {
    pub fn new(loc: Vec3, rot: Mat3, size: Vec2) -> Self {
        Self {
            loc,
            rot,
            size,
            ideal_rot: rot,
        }
    }

    /// Normalizes a stored cell into an absolute-size cell. Cells written by
    /// older sessions carry either no size, a multiplier of the session segment
    /// size, or an absolute size.
    pub fn from_legacy(legacy: LegacyCell, segment_size: f32) -> Self {
        let size = match legacy.size {
            Some(CellSize::Absolute(size)) => size,
            Some(CellSize::Multiplier(mult)) => Vec2::splat(segment_size * mult),
            None => Vec2::splat(segment_size),
        };
        Self {
            loc: legacy.loc,
            rot: legacy.rot,
            size,
            ideal_rot: legacy.ideal_rot.unwrap_or(legacy.rot),
        }
    }

    /// World-space corners derived from the cell transform, in the same order
    /// as [`GridCoord::corners`](crate::GridCoord::corners).
    pub fn corner_positions(&self) -> [Vec3; 4] {
        let h = self.size * 0.5;
        [
            Vec3::new(-h.x, -h.y, 0.0),
            Vec3::new(h.x, -h.y, 0.0),
            Vec3::new(h.x, h.y, 0.0),
            Vec3::new(-h.x, h.y, 0.0),
        ]
        .map(|offset| self.loc + self.rot * offset)
    }

    pub fn normal(&self) -> Vec3 {
        self.rot.z_axis
    }

    pub fn mean_size(&self) -> f32 {
        (self.size.x + self.size.y) * 0.5
    }
}

/// Size field of a stored cell before normalization.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellSize {
    Absolute(Vec2),
    Multiplier(f32),
}

/// Cell record as persisted by older grids.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyCell {
    pub loc: Vec3,
    pub rot: Mat3,
    #[serde(default)]
    pub size: Option<CellSize>,
    #[serde(default)]
    pub ideal_rot: Option<Mat3>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_follow_frame() {
        let rot = Mat3::from_cols(Vec3::Y, -Vec3::X, Vec3::Z);
        let cell = Cell::new(Vec3::new(1.0, 0.0, 0.0), rot, Vec2::new(2.0, 1.0));
        let [bl, br, tr, tl] = cell.corner_positions();
        assert!(bl.abs_diff_eq(Vec3::new(1.5, -1.0, 0.0), 1e-6));
        assert!(br.abs_diff_eq(Vec3::new(1.5, 1.0, 0.0), 1e-6));
        assert!(tr.abs_diff_eq(Vec3::new(0.5, 1.0, 0.0), 1e-6));
        assert!(tl.abs_diff_eq(Vec3::new(0.5, -1.0, 0.0), 1e-6));
    }

    #[test]
    fn legacy_sizes_normalize() {
        let base = LegacyCell {
            loc: Vec3::ZERO,
            rot: Mat3::IDENTITY,
            size: None,
            ideal_rot: None,
        };
        assert_eq!(Cell::from_legacy(base, 0.5).size, Vec2::splat(0.5));

        let mult = LegacyCell {
            size: Some(CellSize::Multiplier(2.0)),
            ..base
        };
        assert_eq!(Cell::from_legacy(mult, 0.5).size, Vec2::splat(1.0));

        let abs = LegacyCell {
            size: Some(CellSize::Absolute(Vec2::new(0.3, 0.4))),
            ..base
        };
        assert_eq!(Cell::from_legacy(abs, 0.5).size, Vec2::new(0.3, 0.4));
    }
}
