//! Interactive handles derived from the grid.
//!
//! Everything here is recomputed from the [`GridStore`] whenever it changes;
//! nothing in this module is authoritative.

use std::collections::{BTreeMap, BTreeSet};

use bevy::log::debug;
use bevy::math::{Mat3, Vec3};

use crate::overlay::GridOverlay;
use crate::resolve::{QuadFrame, VertexMap, cell_quad, resolved_corners};
use crate::spatial::PointIndex;
use crate::surface::{PreserveAxis, SurfaceQuery, solve_surface_transform};
use crate::topology::{edge_counts, open_sides};
use crate::{EdgeKey, GridConfig, GridCoord, GridDir, GridStore};

/// Extends the grid by one cell across an open side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArrowHandle {
    pub pos: Vec3,
    /// Midpoint of the open edge, on the surface.
    pub midpoint: Vec3,
    pub cell: GridCoord,
    pub dir: GridDir,
    pub arrow_dir: Vec3,
    pub edge_dir: Vec3,
    pub edge_length: f32,
}

/// Starts a new cell docked to a boundary edge of an align reference mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceHandle {
    pub pos: Vec3,
    pub arrow_dir: Vec3,
    pub edge_dir: Vec3,
    pub edge_length: f32,
    pub loc: Vec3,
    pub rot: Mat3,
    pub size: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CenterHandle {
    pub pos: Vec3,
    pub cell: GridCoord,
    pub rot: Mat3,
    /// Mean edge length of the cell as currently drawn.
    pub size: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexHandle {
    pub pos: Vec3,
    /// Resolved coordinate.
    pub vertex: GridCoord,
}

/// Offered between two close vertices that do not already share an edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectionHandle {
    pub pos: Vec3,
    pub v1: GridCoord,
    pub v2: GridCoord,
    pub distance: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Handle {
    Arrow(ArrowHandle),
    Reference(ReferenceHandle),
    Center(CenterHandle),
    Vertex(VertexHandle),
    Connection(ConnectionHandle),
}

impl Handle {
    pub fn position(&self) -> Vec3 {
        match self {
            Handle::Arrow(h) => h.pos,
            Handle::Reference(h) => h.pos,
            Handle::Center(h) => h.pos,
            Handle::Vertex(h) => h.pos,
            Handle::Connection(h) => h.pos,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandleSet {
    pub arrows: Vec<ArrowHandle>,
    pub references: Vec<ReferenceHandle>,
    pub centers: Vec<CenterHandle>,
    pub vertices: Vec<VertexHandle>,
    pub connections: Vec<ConnectionHandle>,
}

impl HandleSet {
    pub fn arrow_for(&self, cell: GridCoord, dir: GridDir) -> Option<&ArrowHandle> {
        self.arrows.iter().find(|a| a.cell == cell && a.dir == dir)
    }

    pub fn center_for(&self, cell: GridCoord) -> Option<&CenterHandle> {
        self.centers.iter().find(|c| c.cell == cell)
    }

    pub fn vertex_for(&self, vertex: GridCoord) -> Option<&VertexHandle> {
        self.vertices.iter().find(|v| v.vertex == vertex)
    }
}

/// Everything rebuilt from the store in one pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Derived {
    pub verts: VertexMap,
    pub handles: HandleSet,
    pub overlay: GridOverlay,
}

/// Rebuilds vertex positions, handles and overlay geometry from the store.
pub fn derive<S: SurfaceQuery + ?Sized>(
    store: &GridStore,
    config: &GridConfig,
    surface: &S,
    references: &[ReferenceHandle],
) -> Derived {
    let verts = store.final_verts();
    let offset = config.draw_offset;

    // Draw frame per cell: the quad seated on the surface, or the stored
    // transform when a corner is missing.
    let frames: BTreeMap<GridCoord, (Vec3, Mat3, f32)> = store
        .cells()
        .iter()
        .map(|(coord, cell)| {
            let frame = match cell_quad(store, &verts, *coord) {
                Some(quad) => {
                    let quad = QuadFrame::from_corners(quad);
                    let (loc, rot) = solve_surface_transform(
                        surface,
                        quad.center,
                        quad.guide,
                        PreserveAxis::Y,
                    )
                    .unwrap_or((quad.center, quad.guide));
                    (loc, rot, (quad.size.x + quad.size.y) * 0.5)
                }
                None => (cell.loc, cell.rot, cell.mean_size()),
            };
            (*coord, frame)
        })
        .collect();

    let normals = vertex_normals(store, &frames);
    let lift = |vertex: &GridCoord, pos: Vec3| {
        normals
            .get(vertex)
            .map_or(pos, |normal| pos + *normal * offset)
    };

    let counts = edge_counts(store, &verts);
    let mut overlay = GridOverlay::default();
    let mut handles = HandleSet::default();

    overlay.edges = counts
        .keys()
        .filter_map(|EdgeKey(a, b)| Some([*verts.get(a)?, *verts.get(b)?]))
        .collect();

    for (vertex, pos) in &verts {
        let pos = lift(vertex, *pos);
        overlay.points.push(pos);
        handles.vertices.push(VertexHandle {
            pos,
            vertex: *vertex,
        });
    }
    overlay.pinned = store
        .pins()
        .iter()
        .filter(|(vertex, _)| verts.contains_key(vertex))
        .map(|(vertex, pos)| lift(vertex, *pos))
        .collect();

    for (cell, (loc, rot, size)) in &frames {
        handles.centers.push(CenterHandle {
            pos: *loc + rot.z_axis * offset,
            cell: *cell,
            rot: *rot,
            size: *size,
        });
    }

    for side in open_sides(store, &counts) {
        let (Some(start), Some(end), Some((_, rot, _))) = (
            verts.get(&side.start),
            verts.get(&side.end),
            frames.get(&side.cell),
        ) else {
            continue;
        };
        let edge = *end - *start;
        let edge_length = edge.length();
        if edge_length < 1e-6 {
            continue;
        }
        let normal = rot.z_axis;
        let midpoint = (*start + *end) * 0.5;
        handles.arrows.push(ArrowHandle {
            pos: midpoint + normal * offset,
            midpoint,
            cell: side.cell,
            dir: side.dir,
            arrow_dir: edge.cross(normal).normalize_or_zero(),
            edge_dir: edge / edge_length,
            edge_length,
        });
    }

    handles.connections = connection_candidates(&verts, &counts, &normals, config, surface);
    handles.references = references.to_vec();

    debug!(
        "rebuilt grid handles: {} arrows, {} centers, {} vertices, {} connections",
        handles.arrows.len(),
        handles.centers.len(),
        handles.vertices.len(),
        handles.connections.len()
    );

    Derived {
        verts,
        handles,
        overlay,
    }
}

/// Unit normal per resolved vertex, averaged over the draw frames of every
/// cell using it.
fn vertex_normals(
    store: &GridStore,
    frames: &BTreeMap<GridCoord, (Vec3, Mat3, f32)>,
) -> BTreeMap<GridCoord, Vec3> {
    let mut sums: BTreeMap<GridCoord, Vec3> = BTreeMap::new();
    for (cell, (_, rot, _)) in frames {
        let Some(corners) = resolved_corners(store, *cell) else {
            continue;
        };
        for vertex in BTreeSet::from(corners) {
            *sums.entry(vertex).or_default() += rot.z_axis;
        }
    }
    sums.into_iter()
        .filter_map(|(vertex, sum)| Some((vertex, sum.try_normalize()?)))
        .collect()
}

fn connection_candidates<S: SurfaceQuery + ?Sized>(
    verts: &VertexMap,
    counts: &BTreeMap<EdgeKey, usize>,
    normals: &BTreeMap<GridCoord, Vec3>,
    config: &GridConfig,
    surface: &S,
) -> Vec<ConnectionHandle> {
    if verts.len() < 2 {
        return Vec::new();
    }
    let coords: Vec<GridCoord> = verts.keys().copied().collect();
    let index = PointIndex::build(verts.values().copied().collect());
    let threshold = config.connect_threshold();

    let mut seen = BTreeSet::new();
    let mut connections = Vec::new();
    for (v1, pos1) in verts {
        for neighbor in index.within_radius(*pos1, threshold) {
            let v2 = coords[neighbor.index];
            let Some(pair) = EdgeKey::new(*v1, v2) else {
                continue;
            };
            if counts.contains_key(&pair) || !seen.insert(pair) {
                continue;
            }
            let midpoint = (*pos1 + neighbor.position) * 0.5;
            let normal = match (normals.get(v1), normals.get(&v2)) {
                (Some(n1), Some(n2)) => (*n1 + *n2).try_normalize(),
                _ => None,
            }
            .or_else(|| {
                solve_surface_transform(surface, midpoint, Mat3::IDENTITY, PreserveAxis::Y)
                    .ok()
                    .map(|(_, rot)| rot.z_axis)
            });
            connections.push(ConnectionHandle {
                pos: normal.map_or(midpoint, |n| midpoint + n * config.draw_offset),
                v1: pair.0,
                v2: pair.1,
                distance: neighbor.distance,
            });
        }
    }
    connections
}
