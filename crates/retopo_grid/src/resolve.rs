use std::collections::{BTreeMap, BTreeSet};

use bevy::math::{Mat3, Vec2, Vec3};

use crate::{GridCoord, GridStore};

/// Final position of every logical vertex, keyed by resolved coordinate.
pub type VertexMap = BTreeMap<GridCoord, Vec3>;

/// Whether pinned positions take part in vertex resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinPolicy {
    Apply,
    Ignore,
}

/// Computes the position of every logical vertex in the grid.
///
/// Each cell contributes its four transform-derived corners to the vertex
/// they resolve to and contributions are averaged. Overrides then replace
/// the average. Pins replace it only for vertices no override touched, so a
/// pinned vertex can be dragged before its pin is updated. Corners whose
/// merge chain is broken are left out.
pub fn calculate_final_verts(store: &GridStore, pins: PinPolicy) -> VertexMap {
    let mut sums: BTreeMap<GridCoord, (Vec3, u32)> = BTreeMap::new();
    for (coord, cell) in store.cells() {
        for (corner, pos) in coord.corners().into_iter().zip(cell.corner_positions()) {
            let Ok(root) = store.resolve(corner) else {
                continue;
            };
            let entry = sums.entry(root).or_insert((Vec3::ZERO, 0));
            entry.0 += pos;
            entry.1 += 1;
        }
    }

    let mut verts: VertexMap = sums
        .into_iter()
        .map(|(coord, (sum, count))| (coord, sum / count as f32))
        .collect();

    let mut overridden = BTreeSet::new();
    for (coord, pos) in store.overrides() {
        let Ok(root) = store.resolve(*coord) else {
            continue;
        };
        if let Some(slot) = verts.get_mut(&root) {
            *slot = *pos;
            overridden.insert(root);
        }
    }

    if pins == PinPolicy::Apply {
        for (vertex, pos) in store.pins() {
            if overridden.contains(vertex) {
                continue;
            }
            if let Some(slot) = verts.get_mut(vertex) {
                *slot = *pos;
            }
        }
    }

    verts
}

/// Resolved corner coordinates of a cell, or `None` if any merge chain is broken.
pub fn resolved_corners(store: &GridStore, cell: GridCoord) -> Option<[GridCoord; 4]> {
    let [a, b, c, d] = cell.corners();
    Some([
        store.resolve(a).ok()?,
        store.resolve(b).ok()?,
        store.resolve(c).ok()?,
        store.resolve(d).ok()?,
    ])
}

/// Final corner positions of a cell, or `None` if any corner is missing.
pub fn cell_quad(store: &GridStore, verts: &VertexMap, cell: GridCoord) -> Option<[Vec3; 4]> {
    let [a, b, c, d] = resolved_corners(store, cell)?;
    Some([
        *verts.get(&a)?,
        *verts.get(&b)?,
        *verts.get(&c)?,
        *verts.get(&d)?,
    ])
}

/// Center, edge-guided frame and extent of a quad given by its four corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadFrame {
    pub center: Vec3,
    /// Columns follow the averaged X and Y edge directions. Not necessarily
    /// orthogonal.
    pub guide: Mat3,
    pub size: Vec2,
}

impl QuadFrame {
    pub fn from_corners([bl, br, tr, tl]: [Vec3; 4]) -> Self {
        let center = (bl + br + tr + tl) * 0.25;
        let along_x = ((br - bl) + (tr - tl)) * 0.5;
        let along_y = ((tl - bl) + (tr - br)) * 0.5;

        let x = normalize_or(along_x, Vec3::X);
        let y = normalize_or(along_y, Vec3::Y);
        let z = normalize_or(x.cross(y), Vec3::Z);

        let width = ((br - bl).length() + (tr - tl).length()) * 0.5;
        let height = ((tl - bl).length() + (tr - br).length()) * 0.5;

        Self {
            center,
            guide: Mat3::from_cols(x, y, z),
            size: Vec2::new(width, height),
        }
    }
}

fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    if v.length_squared() > 1e-12 {
        v.normalize()
    } else {
        fallback
    }
}
