//! Local edits applied by the interaction state machine.
//!
//! Every function checks its preconditions before touching the store, so a
//! refused edit leaves the grid unchanged.

use std::collections::{BTreeMap, BTreeSet};

use bevy::log::debug;
use bevy::math::{Vec2, Vec3};

use crate::config::{MIN_CELL_SIZE, MIN_SEGMENT_SIZE};
use crate::error::Result;
use crate::handles::{ArrowHandle, ReferenceHandle};
use crate::resolve::{QuadFrame, cell_quad};
use crate::surface::{PreserveAxis, SurfaceQuery, solve_strip_transform, solve_surface_transform};
use crate::topology::falloff_rings;
use crate::{Cell, GridCoord, GridStore, RetopoError};

/// Replaces the grid with a strip of square cells laid along `start → end`.
/// Returns the number of cells placed. Samples that miss the surface leave a
/// gap; a strip with no cell at all is a [`RetopoError::SurfaceMiss`].
pub fn generate_strip<S: SurfaceQuery + ?Sized>(
    store: &mut GridStore,
    start: Vec3,
    end: Vec3,
    segment_size: f32,
    surface: &S,
) -> Result<usize> {
    store.clear();
    let line = end - start;
    let length = line.length();
    if length < MIN_SEGMENT_SIZE {
        return Err(RetopoError::LineTooShort);
    }
    if segment_size < MIN_SEGMENT_SIZE {
        return Ok(0);
    }

    let count = ((length / segment_size) as usize).max(1);
    let direction = line / length;
    let mut previous = None;
    for i in 0..count {
        let center = start + direction * (segment_size * (i as f32 + 0.5));
        let Ok((loc, rot)) = solve_strip_transform(surface, center, direction, previous) else {
            continue;
        };
        store.insert_cell(
            GridCoord::new(i as i32, 0),
            Cell::new(loc, rot, Vec2::splat(segment_size)),
        )?;
        previous = Some(rot);
    }
    if store.is_empty() {
        return Err(RetopoError::SurfaceMiss);
    }
    Ok(store.cell_count())
}

/// Adds the neighbour across the open side an arrow handle sits on.
///
/// The new cell inherits the parent's current shape: its guide frame and
/// size come from the parent's resolved corners when available.
pub fn extend_from<S: SurfaceQuery + ?Sized>(
    store: &mut GridStore,
    handle: &ArrowHandle,
    surface: &S,
) -> Result<GridCoord> {
    let target = handle.cell.step(handle.dir);
    if store.contains_cell(target) {
        return Err(RetopoError::CellOccupied(target));
    }
    let parent = *store
        .cell(handle.cell)
        .ok_or(RetopoError::UnknownCell(handle.cell))?;

    let verts = store.final_verts();
    let (guide, size) = match cell_quad(store, &verts, handle.cell) {
        Some(quad) => {
            let frame = QuadFrame::from_corners(quad);
            let size = if frame.size.x > MIN_CELL_SIZE && frame.size.y > MIN_CELL_SIZE {
                frame.size
            } else {
                parent.size
            };
            (frame.guide, size)
        }
        None => (parent.rot, parent.size),
    };

    let horizontal = handle.dir.is_horizontal();
    let reach = if horizontal { size.x } else { size.y };
    let outward = (handle.midpoint - parent.loc).normalize_or_zero();
    let estimate = handle.midpoint + outward * (reach * 0.5);
    let preserve = if horizontal {
        PreserveAxis::Y
    } else {
        PreserveAxis::X
    };

    let cell = match solve_surface_transform(surface, estimate, guide, preserve) {
        Ok((loc, rot)) => Cell::new(loc, rot, size),
        Err(_) => Cell::new(estimate, guide, size),
    };
    store.insert_cell(target, cell)?;
    debug!("extended grid from {} to {}", handle.cell, target);
    Ok(target)
}

/// Inserts the cell a reference handle describes, two columns right of the
/// rightmost existing cell so it never touches the current grid.
pub fn insert_reference_cell(store: &mut GridStore, handle: &ReferenceHandle) -> Result<GridCoord> {
    let coord = store
        .cells()
        .keys()
        .map(|c| c.x)
        .max()
        .map_or(GridCoord::new(0, 0), |x| GridCoord::new(x + 2, 0));
    store.insert_cell(
        coord,
        Cell::new(handle.loc, handle.rot, Vec2::splat(handle.size)),
    )?;
    Ok(coord)
}

pub fn delete_cell(store: &mut GridStore, cell: GridCoord) -> Result<Cell> {
    if !store.contains_cell(cell) {
        return Err(RetopoError::UnknownCell(cell));
    }
    if store.cell_count() <= 1 {
        return Err(RetopoError::LastCell);
    }
    store.remove_cell(cell).ok_or(RetopoError::UnknownCell(cell))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinToggle {
    Pinned(GridCoord),
    Unpinned(GridCoord),
}

/// Pins a vertex at its current unpinned position, or releases its pin.
pub fn toggle_pin(store: &mut GridStore, vertex: GridCoord) -> Result<PinToggle> {
    let vertex = store.resolve(vertex)?;
    if store.remove_pin(vertex).is_some() {
        return Ok(PinToggle::Unpinned(vertex));
    }
    let pos = *store
        .dynamic_verts()
        .get(&vertex)
        .ok_or(RetopoError::UnknownVertex(vertex))?;
    store.set_pin(vertex, pos);
    Ok(PinToggle::Pinned(vertex))
}

/// Merges two vertices and returns the survivor.
///
/// A pinned vertex survives and keeps its position. Otherwise the
/// lower-sorting coordinate survives at the midpoint.
pub fn connect_vertices(store: &mut GridStore, v1: GridCoord, v2: GridCoord) -> Result<GridCoord> {
    let r1 = store.resolve(v1)?;
    let r2 = store.resolve(v2)?;
    if r1 == r2 {
        return Err(RetopoError::AlreadyMerged);
    }

    let verts = store.final_verts();
    let pos1 = *verts.get(&r1).ok_or(RetopoError::UnknownVertex(r1))?;
    let pos2 = *verts.get(&r2).ok_or(RetopoError::UnknownVertex(r2))?;

    let (to, from, pos) = match (store.is_pinned(r1), store.is_pinned(r2)) {
        (true, true) => return Err(RetopoError::BothPinned),
        (true, false) => (r1, r2, pos1),
        (false, true) => (r2, r1, pos2),
        (false, false) => (r1.min(r2), r1.max(r2), (pos1 + pos2) * 0.5),
    };

    store.clear_vertex_overrides(from);
    store.clear_vertex_overrides(to);
    store.merge(from, to)?;
    store.set_override(to, pos);
    debug!("merged vertex {from} into {to}");
    Ok(to)
}

/// Re-derives a cell's transform from its resolved corners, seated on the
/// surface. Leaves the cell alone if a corner is missing or the surface is
/// out of reach.
pub fn reseat_cell<S: SurfaceQuery + ?Sized>(store: &mut GridStore, cell: GridCoord, surface: &S) -> bool {
    let verts = store.final_verts();
    let Some(quad) = cell_quad(store, &verts, cell) else {
        return false;
    };
    let frame = QuadFrame::from_corners(quad);
    let Ok((loc, rot)) = solve_surface_transform(surface, frame.center, frame.guide, PreserveAxis::Y)
    else {
        return false;
    };
    let Some(target) = store.cell_mut(cell) else {
        return false;
    };
    target.loc = loc;
    target.rot = rot;
    true
}

/// Scales one cell by `ratio` (or its inverse when shrinking).
pub fn resize_cell(store: &mut GridStore, cell: GridCoord, grow: bool, ratio: f32) -> Result<Vec2> {
    let current = store.cell(cell).ok_or(RetopoError::UnknownCell(cell))?.size;
    let factor = if grow { ratio } else { 1.0 / ratio };
    let size = current * factor;
    if size.x < MIN_CELL_SIZE || size.y < MIN_CELL_SIZE {
        return Err(RetopoError::MinimumSize(cell));
    }
    if let Some(target) = store.cell_mut(cell) {
        target.size = size;
    }
    Ok(size)
}

/// A cell drag in progress. Vertices of nearby cells follow with a weight
/// that falls off by neighbour ring.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentDrag {
    pub anchor: GridCoord,
    start: Vec3,
    rings: BTreeMap<GridCoord, usize>,
    /// Resolved vertex → position when the drag started.
    initial: BTreeMap<GridCoord, Vec3>,
}

impl SegmentDrag {
    pub fn begin(store: &GridStore, anchor: GridCoord, start: Vec3, max_depth: usize) -> Self {
        let rings = falloff_rings(store, anchor, max_depth);
        let verts = store.final_verts();
        let mut initial = BTreeMap::new();
        for cell in rings.keys() {
            for corner in cell.corners() {
                let Ok(vertex) = store.resolve(corner) else {
                    continue;
                };
                if let Some(pos) = verts.get(&vertex) {
                    initial.entry(vertex).or_insert(*pos);
                }
            }
        }
        Self {
            anchor,
            start,
            rings,
            initial,
        }
    }

    pub fn rings(&self) -> &BTreeMap<GridCoord, usize> {
        &self.rings
    }

    /// Moves every unpinned vertex of the affected cells by the drag delta
    /// scaled by its ring weight. A vertex shared by several rings moves once,
    /// with the weight of the innermost ring.
    pub fn apply<S: SurfaceQuery + ?Sized>(
        &self,
        store: &mut GridStore,
        current: Vec3,
        weights: &[f32],
        surface: &S,
    ) {
        let delta = current - self.start;
        let mut moved = BTreeSet::new();
        for (depth, weight) in weights.iter().enumerate() {
            for (cell, _) in self.rings.iter().filter(|(_, d)| **d == depth) {
                for corner in cell.corners() {
                    let Ok(vertex) = store.resolve(corner) else {
                        continue;
                    };
                    if moved.contains(&vertex) || store.is_pinned(vertex) {
                        continue;
                    }
                    let Some(initial) = self.initial.get(&vertex) else {
                        continue;
                    };
                    moved.insert(vertex);
                    let target = *initial + delta * *weight;
                    let pos = surface.project(target).map_or(target, |hit| hit.location);
                    store.set_vertex_override(vertex, pos);
                }
            }
        }
        for cell in self.rings.keys() {
            reseat_cell(store, *cell, surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::Mat3;

    use super::*;
    use crate::GridDir;
    use crate::testing::flat_plane;

    struct Nowhere;

    impl SurfaceQuery for Nowhere {
        fn project(&self, _: Vec3) -> Option<crate::surface::SurfaceHit> {
            None
        }

        fn raycast(&self, _: Vec3, _: Vec3) -> Option<crate::surface::RayHit> {
            None
        }
    }

    fn strip(n: i32) -> GridStore {
        let mut store = GridStore::new();
        generate_strip(
            &mut store,
            Vec3::ZERO,
            Vec3::new(0.5 * n as f32, 0.0, 0.0),
            0.5,
            &flat_plane(),
        )
        .unwrap();
        store
    }

    fn arrow(store: &GridStore, cell: GridCoord, dir: GridDir) -> ArrowHandle {
        let derived = crate::handles::derive(
            store,
            &crate::GridConfig::default(),
            &flat_plane(),
            &[],
        );
        *derived.handles.arrow_for(cell, dir).unwrap()
    }

    #[test]
    fn strip_fills_line() {
        let store = strip(4);
        assert_eq!(store.cell_count(), 4);
        let last = store.cell(GridCoord::new(3, 0)).unwrap();
        assert!(last.loc.abs_diff_eq(Vec3::new(1.75, 0.0, 0.0), 1e-4));
        assert!(last.rot.x_axis.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn short_line_leaves_empty_store() {
        let mut store = strip(2);
        let result = generate_strip(&mut store, Vec3::ZERO, Vec3::new(0.005, 0.0, 0.0), 0.5, &flat_plane());
        assert_eq!(result, Err(RetopoError::LineTooShort));
        assert!(store.is_empty());
    }

    #[test]
    fn strip_off_the_surface_is_a_miss() {
        let mut store = GridStore::new();
        let result = generate_strip(&mut store, Vec3::ZERO, Vec3::X, 0.5, &Nowhere);
        assert_eq!(result, Err(RetopoError::SurfaceMiss));
        assert!(store.is_empty());
    }

    #[test]
    fn extend_adds_neighbour_sharing_edge() {
        let mut store = strip(1);
        let handle = arrow(&store, GridCoord::new(0, 0), GridDir::PosY);
        let added = extend_from(&mut store, &handle, &flat_plane()).unwrap();
        assert_eq!(added, GridCoord::new(0, 1));
        let cell = store.cell(added).unwrap();
        assert!(cell.loc.abs_diff_eq(Vec3::new(0.25, 0.5, 0.0), 1e-4));
        assert!(cell.size.abs_diff_eq(Vec2::splat(0.5), 1e-4));
        assert_eq!(store.final_verts().len(), 6);

        assert_eq!(
            extend_from(&mut store, &handle, &flat_plane()),
            Err(RetopoError::CellOccupied(added))
        );
    }

    #[test]
    fn cannot_delete_last_cell() {
        let mut store = strip(1);
        assert_eq!(delete_cell(&mut store, GridCoord::new(0, 0)), Err(RetopoError::LastCell));
        assert_eq!(store.cell_count(), 1);
    }

    #[test]
    fn pin_toggle_round_trips() {
        let mut store = strip(1);
        let v = GridCoord::new(1, 1);
        assert_eq!(toggle_pin(&mut store, v), Ok(PinToggle::Pinned(v)));
        assert!(store.pin(v).unwrap().abs_diff_eq(Vec3::new(0.5, 0.25, 0.0), 1e-4));
        assert_eq!(toggle_pin(&mut store, v), Ok(PinToggle::Unpinned(v)));
        assert!(store.pins().is_empty());
    }

    #[test]
    fn pinned_vertex_wins_merge() {
        let mut store = strip(1);
        store
            .insert_cell(
                GridCoord::new(5, 0),
                Cell::new(Vec3::new(0.76, 0.0, 0.0), Mat3::IDENTITY, Vec2::splat(0.5)),
            )
            .unwrap();
        let pinned = GridCoord::new(5, 0);
        toggle_pin(&mut store, pinned).unwrap();
        let pin_pos = store.pin(pinned).unwrap();

        let survivor = connect_vertices(&mut store, GridCoord::new(1, 0), pinned).unwrap();
        assert_eq!(survivor, pinned);
        assert_eq!(store.resolve(GridCoord::new(1, 0)), Ok(pinned));
        assert_eq!(store.final_verts()[&pinned], pin_pos);
    }

    #[test]
    fn both_pinned_refused_without_change() {
        let mut store = strip(2);
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(2, 1));
        toggle_pin(&mut store, a).unwrap();
        toggle_pin(&mut store, b).unwrap();
        let before = store.clone();
        assert_eq!(connect_vertices(&mut store, a, b), Err(RetopoError::BothPinned));
        assert_eq!(store, before);
    }

    #[test]
    fn resize_respects_minimum() {
        let mut store = strip(1);
        let cell = GridCoord::new(0, 0);
        let grown = resize_cell(&mut store, cell, true, 1.1).unwrap();
        assert!(grown.abs_diff_eq(Vec2::splat(0.55), 1e-5));
        store.cell_mut(cell).unwrap().size = Vec2::new(0.00105, 0.5);
        assert_eq!(resize_cell(&mut store, cell, false, 1.1), Err(RetopoError::MinimumSize(cell)));
    }

    #[test]
    fn reference_cells_land_two_columns_right() {
        let handle = ReferenceHandle {
            pos: Vec3::ZERO,
            arrow_dir: Vec3::X,
            edge_dir: Vec3::Y,
            edge_length: 1.0,
            loc: Vec3::ZERO,
            rot: Mat3::IDENTITY,
            size: 1.0,
        };
        let mut store = GridStore::new();
        assert_eq!(insert_reference_cell(&mut store, &handle), Ok(GridCoord::new(0, 0)));
        assert_eq!(insert_reference_cell(&mut store, &handle), Ok(GridCoord::new(2, 0)));
        assert_eq!(store.cell(GridCoord::new(2, 0)).unwrap().size, Vec2::ONE);
    }

    #[test]
    fn drag_falls_off_by_ring() {
        let mut store = strip(4);
        let drag = SegmentDrag::begin(&store, GridCoord::new(1, 0), Vec3::new(0.75, 0.0, 0.0), 2);
        assert_eq!(drag.rings().len(), 4);
        drag.apply(&mut store, Vec3::new(0.85, 0.0, 0.0), &[1.0, 0.6, 0.3], &flat_plane());

        let verts = store.final_verts();
        let x = |x, y| verts[&GridCoord::new(x, y)].x;
        assert!((x(1, 0) - 0.6).abs() < 1e-4);
        assert!((x(0, 0) - 0.06).abs() < 1e-4);
        assert!((x(3, 0) - 1.56).abs() < 1e-4);
        assert!((x(4, 0) - 2.03).abs() < 1e-4);
    }

    #[test]
    fn drag_skips_pinned() {
        let mut store = strip(2);
        let pinned = GridCoord::new(1, 1);
        toggle_pin(&mut store, pinned).unwrap();
        let before = store.final_verts()[&pinned];
        let drag = SegmentDrag::begin(&store, GridCoord::new(0, 0), Vec3::ZERO, 2);
        drag.apply(&mut store, Vec3::new(0.2, 0.1, 0.0), &[1.0, 0.6, 0.3], &flat_plane());
        assert_eq!(store.final_verts()[&pinned], before);
    }
}
