//! Turning the grid into mesh data.

use std::collections::BTreeMap;

use bevy::log::{debug, info};
use bevy::math::{Vec2, Vec3};

use crate::error::Result;
use crate::resolve::resolved_corners;
use crate::spatial::PointIndex;
use crate::{GridStore, RetopoError};

/// Vertices closer than this are welded together.
pub const WELD_DISTANCE: f32 = 0.0001;

/// Polygon mesh produced from the grid, in world space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BakedMesh {
    pub vertices: Vec<Vec3>,
    /// Counter-clockwise polygons with three or four corners.
    pub faces: Vec<Vec<u32>>,
}

impl BakedMesh {
    /// Fan triangulation of every face.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        self.faces
            .iter()
            .flat_map(|face| {
                face.windows(2)
                    .skip(1)
                    .map(move |pair| [face[0], pair[0], pair[1]])
            })
            .collect()
    }

    /// Center of the axis-aligned bounds, or zero for an empty mesh.
    pub fn bounds_center(&self) -> Vec3 {
        let Some(first) = self.vertices.first() else {
            return Vec3::ZERO;
        };
        let (min, max) = self
            .vertices
            .iter()
            .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
        (min + max) * 0.5
    }
}

/// One vertex per logical vertex and one face per cell.
///
/// Corners that collapse onto the same vertex are dropped from their face,
/// and faces left with fewer than three corners are skipped. The result is
/// welded at [`WELD_DISTANCE`].
pub fn bake_grid(store: &GridStore) -> Result<BakedMesh> {
    if store.is_empty() {
        return Err(RetopoError::EmptyGrid);
    }
    let verts = store.final_verts();
    let indices: BTreeMap<_, u32> = verts
        .keys()
        .enumerate()
        .map(|(i, coord)| (*coord, i as u32))
        .collect();

    let mut faces = Vec::new();
    for coord in store.cells().keys() {
        let Some(corners) = resolved_corners(store, *coord) else {
            continue;
        };
        let Some(face) = corners
            .iter()
            .map(|corner| indices.get(corner).copied())
            .collect::<Option<Vec<u32>>>()
        else {
            continue;
        };
        let face = dedup_preserving_order(face);
        if face.len() >= 3 {
            faces.push(face);
        }
    }
    if faces.is_empty() {
        return Err(RetopoError::DegenerateGrid);
    }

    let mesh = weld_by_distance(
        &BakedMesh {
            vertices: verts.into_values().collect(),
            faces,
        },
        WELD_DISTANCE,
    );
    if mesh.faces.is_empty() {
        return Err(RetopoError::DegenerateGrid);
    }
    info!(
        "baked grid into {} vertices and {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

fn dedup_preserving_order(face: Vec<u32>) -> Vec<u32> {
    let mut unique = Vec::with_capacity(face.len());
    for index in face {
        if !unique.contains(&index) {
            unique.push(index);
        }
    }
    unique
}

/// Merges vertices within `distance` of each other into the earliest one,
/// dropping faces that degenerate or point past the vertex list and vertices
/// nothing uses any more. Remaining vertices keep their order.
pub fn weld_by_distance(mesh: &BakedMesh, distance: f32) -> BakedMesh {
    let index = PointIndex::build(mesh.vertices.clone());
    let mut target: Vec<Option<usize>> = vec![None; mesh.vertices.len()];
    for (i, pos) in mesh.vertices.iter().enumerate() {
        if target[i].is_some() {
            continue;
        }
        for neighbor in index.within_radius(*pos, distance) {
            if target[neighbor.index].is_none() {
                target[neighbor.index] = Some(i);
            }
        }
    }

    let vertex_count = mesh.vertices.len();
    let faces: Vec<Vec<usize>> = mesh
        .faces
        .iter()
        .filter(|face| face.iter().all(|&v| (v as usize) < vertex_count))
        .map(|face| {
            face.iter()
                .map(|&v| target[v as usize].unwrap_or(v as usize))
                .collect::<Vec<_>>()
        })
        .map(|face| {
            let mut unique = Vec::with_capacity(face.len());
            for v in face {
                if !unique.contains(&v) {
                    unique.push(v);
                }
            }
            unique
        })
        .filter(|face| face.len() >= 3)
        .collect();

    let mut used = vec![false; mesh.vertices.len()];
    for v in faces.iter().flatten() {
        used[*v] = true;
    }
    let mut remap = vec![0u32; mesh.vertices.len()];
    let mut vertices = Vec::new();
    for (i, pos) in mesh.vertices.iter().enumerate() {
        if used[i] {
            remap[i] = vertices.len() as u32;
            vertices.push(*pos);
        }
    }
    let faces = faces
        .into_iter()
        .map(|face| face.into_iter().map(|v| remap[v]).collect())
        .collect();

    let welded = BakedMesh { vertices, faces };
    debug!(
        "welded {} vertices down to {}",
        mesh.vertices.len(),
        welded.vertices.len()
    );
    welded
}

/// Joins several meshes into one and welds the seams.
pub fn weld_meshes(meshes: &[BakedMesh], distance: f32) -> BakedMesh {
    let mut joined = BakedMesh::default();
    for mesh in meshes {
        let offset = joined.vertices.len() as u32;
        let count = mesh.vertices.len();
        joined.vertices.extend_from_slice(&mesh.vertices);
        joined.faces.extend(
            mesh.faces
                .iter()
                .filter(|face| face.iter().all(|&v| (v as usize) < count))
                .map(|face| face.iter().map(|v| v + offset).collect()),
        );
    }
    weld_by_distance(&joined, distance)
}

/// Indices of the reference faces lying under some grid quad.
///
/// `faces` holds each reference face's world-space center and normal. A face
/// counts when its normal agrees with the quad's, its center is near the
/// quad's plane and falls inside the quad once flattened onto that plane.
pub fn select_faces_under_grid(store: &GridStore, faces: &[(Vec3, Vec3)]) -> Vec<usize> {
    let verts = store.final_verts();
    let mut selected = vec![false; faces.len()];

    for coord in store.cells().keys() {
        let Some([p1, p2, p3, p4]) = crate::resolve::cell_quad(store, &verts, *coord) else {
            continue;
        };
        let center = (p1 + p2 + p3 + p4) * 0.25;
        let normal = (p2 - p1).cross(p4 - p1) + (p4 - p3).cross(p2 - p3);
        if normal.length_squared() < 1e-9 {
            continue;
        }
        let normal = normal.normalize();
        let x_axis = p2 - p1;
        if x_axis.length_squared() < 1e-9 {
            continue;
        }
        let x_axis = x_axis.normalize();
        let y_axis = normal.cross(x_axis).normalize();
        let flatten = |p: Vec3| {
            let offset = p - center;
            Vec2::new(offset.dot(x_axis), offset.dot(y_axis))
        };
        let polygon = [flatten(p1), flatten(p2), flatten(p3), flatten(p4)];

        let width = (p1.distance(p2) + p4.distance(p3)) * 0.5;
        let height = (p1.distance(p4) + p2.distance(p3)) * 0.5;
        let threshold = (width + height) * 0.25;

        for (i, (face_center, face_normal)) in faces.iter().enumerate() {
            if selected[i] || face_normal.dot(normal) <= 0.1 {
                continue;
            }
            if (*face_center - center).dot(normal).abs() >= threshold {
                continue;
            }
            if point_in_polygon(flatten(*face_center), &polygon) {
                selected[i] = true;
            }
        }
    }

    let picked: Vec<usize> = selected
        .iter()
        .enumerate()
        .filter_map(|(i, hit)| hit.then_some(i))
        .collect();
    info!("selected {} reference faces under the grid", picked.len());
    picked
}

/// Even-odd crossing test.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
