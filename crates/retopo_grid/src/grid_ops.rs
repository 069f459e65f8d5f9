//! Operations applied to the whole grid at once.

use std::collections::BTreeSet;

use bevy::log::info;
use bevy::math::{Mat3, Vec2, Vec3};

use crate::container::{ContainerMesh, container_points};
use crate::error::Result;
use crate::resolve::{QuadFrame, cell_quad};
use crate::spatial::PointIndex;
use crate::surface::{PreserveAxis, SurfaceQuery, solve_surface_transform};
use crate::topology::{boundary_vertices, edge_counts};
use crate::{GridCoord, GridStore, RetopoError};

/// Reference vertices closer than this to a grid vertex count as taken.
const STUCK_DISTANCE: f32 = 0.001;
/// Grid vertices closer than this to a reference vertex are left alone.
const ALIGNED_DISTANCE: f32 = 0.0001;
const SNAP_CANDIDATES: usize = 5;

/// Snaps unpinned boundary vertices onto nearby vertices of the align
/// references. Each reference vertex is used at most once. With `pin` set
/// the snapped vertices are pinned too. Returns the number of snapped
/// vertices.
pub fn align_to_container(
    store: &mut GridStore,
    containers: &[ContainerMesh],
    radius: f32,
    pin: bool,
) -> Result<usize> {
    if store.is_empty() {
        return Err(RetopoError::EmptyGrid);
    }
    if containers.is_empty() {
        return Err(RetopoError::EmptyContainer);
    }
    let points = container_points(containers);
    if points.is_empty() {
        return Err(RetopoError::NoContainerGeometry);
    }
    let index = PointIndex::build(points);

    let verts = store.final_verts();
    let mut taken: BTreeSet<usize> = verts
        .values()
        .filter_map(|pos| index.nearest(*pos))
        .filter(|n| n.distance < STUCK_DISTANCE)
        .map(|n| n.index)
        .collect();

    let boundary = boundary_vertices(&edge_counts(store, &verts));
    let mut candidates: Vec<(GridCoord, Vec3, f32)> = verts
        .iter()
        .filter(|(vertex, _)| boundary.contains(vertex) && !store.is_pinned(**vertex))
        .filter_map(|(vertex, pos)| {
            let nearest = index.nearest(*pos)?;
            (nearest.distance < radius && nearest.distance >= ALIGNED_DISTANCE)
                .then_some((*vertex, *pos, nearest.distance))
        })
        .collect();
    candidates.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut snapped = 0;
    for (vertex, pos, _) in candidates {
        let Some(target) = index
            .nearest_n(pos, SNAP_CANDIDATES)
            .into_iter()
            .find(|n| n.distance < radius && !taken.contains(&n.index))
        else {
            continue;
        };
        store.set_vertex_override(vertex, target.position);
        if pin {
            store.set_pin(vertex, target.position);
        }
        taken.insert(target.index);
        snapped += 1;
    }

    info!("snapped {snapped} grid vertices to the align reference");
    Ok(snapped)
}

/// One frame for the whole grid from the averaged cell axes.
///
/// The second value is true when the averages cancel out and the first
/// cell's frame was used instead.
pub fn global_frame(store: &GridStore) -> Result<(Mat3, bool)> {
    let first = store
        .cells()
        .values()
        .next()
        .ok_or(RetopoError::EmptyGrid)?;
    let (sum_x, sum_y) = store
        .cells()
        .values()
        .fold((Vec3::ZERO, Vec3::ZERO), |(x, y), cell| {
            (x + cell.rot.x_axis, y + cell.rot.y_axis)
        });
    if sum_x.length() < 0.01 || sum_y.length() < 0.01 {
        return Ok((first.rot, true));
    }

    let x = sum_x.normalize();
    let y_flat = sum_y - x * sum_y.dot(x);
    let y = if y_flat.length() < 0.01 {
        let up = if x.dot(Vec3::Z).abs() > 0.99 {
            Vec3::Y
        } else {
            Vec3::Z
        };
        x.cross(up).normalize()
    } else {
        y_flat.normalize()
    };
    let z = x.cross(y).normalize();
    let x = y.cross(z).normalize();
    Ok((Mat3::from_cols(x, y, z), false))
}

/// Re-seats every cell on the surface using the grid's global frame as the
/// guide, resets every cell to `segment_size` and drops all overrides.
/// Returns whether the global frame fell back to the first cell. Leaves the
/// grid untouched when the surface cannot be queried or no cell lands on it.
pub fn straighten<S: SurfaceQuery + ?Sized>(
    store: &mut GridStore,
    surface: &S,
    segment_size: f32,
) -> Result<bool> {
    let (reference, fallback) = global_frame(store)?;
    if !surface.is_valid() {
        return Err(RetopoError::NonInvertibleTransform);
    }
    let verts = store.final_verts();
    let seated: Vec<(GridCoord, Vec3, Mat3)> = store
        .cells()
        .keys()
        .filter_map(|&coord| {
            let quad = cell_quad(store, &verts, coord)?;
            let center = QuadFrame::from_corners(quad).center;
            let (loc, rot) =
                solve_surface_transform(surface, center, reference, PreserveAxis::Y).ok()?;
            Some((coord, loc, rot))
        })
        .collect();
    if seated.is_empty() {
        return Err(RetopoError::SurfaceMiss);
    }

    for (coord, loc, rot) in seated {
        if let Some(cell) = store.cell_mut(coord) {
            cell.loc = loc;
            cell.rot = rot;
            cell.ideal_rot = rot;
        }
    }
    let size = Vec2::splat(segment_size);
    let coords: Vec<GridCoord> = store.cells().keys().copied().collect();
    for coord in coords {
        if let Some(cell) = store.cell_mut(coord) {
            cell.size = size;
        }
    }
    store.clear_overrides();
    info!("grid straightened");
    Ok(fallback)
}

/// Moves every cell onto the surface but gives all of them the same global
/// frame, ignoring surface curvature. Drops all overrides.
pub fn flatten<S: SurfaceQuery + ?Sized>(store: &mut GridStore, surface: &S) -> Result<bool> {
    let (reference, fallback) = global_frame(store)?;
    if !surface.is_valid() {
        return Err(RetopoError::NonInvertibleTransform);
    }
    let verts = store.final_verts();
    let coords: Vec<GridCoord> = store.cells().keys().copied().collect();
    for coord in coords {
        let Some(quad) = cell_quad(store, &verts, coord) else {
            continue;
        };
        let center = QuadFrame::from_corners(quad).center;
        let Some(hit) = surface.project(center) else {
            continue;
        };
        if let Some(cell) = store.cell_mut(coord) {
            cell.loc = hit.location;
            cell.rot = reference;
            cell.ideal_rot = reference;
        }
    }
    store.clear_overrides();
    info!("grid flattened");
    Ok(fallback)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinAll {
    Pinned(usize),
    Unpinned(usize),
}

/// Unpins everything if anything is pinned, otherwise pins every vertex at
/// its current unpinned position.
pub fn toggle_pin_all(store: &mut GridStore) -> Result<PinAll> {
    if store.is_empty() {
        return Err(RetopoError::EmptyGrid);
    }
    if !store.pins().is_empty() {
        let count = store.pins().len();
        store.clear_pins();
        info!("unpinned {count} vertices");
        return Ok(PinAll::Unpinned(count));
    }
    let verts = store.dynamic_verts();
    if verts.is_empty() {
        return Err(RetopoError::NothingToPin);
    }
    for (vertex, pos) in &verts {
        store.set_pin(*vertex, *pos);
    }
    info!("pinned {} vertices", verts.len());
    Ok(PinAll::Pinned(verts.len()))
}
