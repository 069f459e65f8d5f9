use std::collections::BTreeMap;

use bevy::math::{Mat3, Vec3};

use crate::handles::ReferenceHandle;

/// A finished mesh marked as an align reference, in world space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerMesh {
    vertices: Vec<Vec3>,
    faces: Vec<Vec<u32>>,
}

/// A boundary edge as it appears in the winding of its only face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryEdge {
    pub face: usize,
    pub from: u32,
    pub to: u32,
}

impl ContainerMesh {
    /// Faces with fewer than three corners or out-of-range indices are dropped.
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>) -> Self {
        let count = vertices.len() as u32;
        let faces = faces
            .into_iter()
            .filter(|face| face.len() >= 3 && face.iter().all(|i| *i < count))
            .collect();
        Self { vertices, faces }
    }

    pub fn from_triangles(vertices: Vec<Vec3>, triangles: &[[u32; 3]]) -> Self {
        Self::new(vertices, triangles.iter().map(|t| t.to_vec()).collect())
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<u32>] {
        &self.faces
    }

    fn corner(&self, index: u32) -> Vec3 {
        self.vertices[index as usize]
    }

    pub fn face_center(&self, face: usize) -> Vec3 {
        let corners = &self.faces[face];
        corners.iter().map(|i| self.corner(*i)).sum::<Vec3>() / corners.len() as f32
    }

    /// Newell normal, zero for a degenerate face.
    pub fn face_normal(&self, face: usize) -> Vec3 {
        let corners = &self.faces[face];
        let mut normal = Vec3::ZERO;
        for (i, index) in corners.iter().enumerate() {
            let cur = self.corner(*index);
            let next = self.corner(corners[(i + 1) % corners.len()]);
            normal.x += (cur.y - next.y) * (cur.z + next.z);
            normal.y += (cur.z - next.z) * (cur.x + next.x);
            normal.z += (cur.x - next.x) * (cur.y + next.y);
        }
        normal.normalize_or_zero()
    }

    fn undirected_edges(&self) -> BTreeMap<(u32, u32), Vec<BoundaryEdge>> {
        let mut edges: BTreeMap<(u32, u32), Vec<BoundaryEdge>> = BTreeMap::new();
        for (face, corners) in self.faces.iter().enumerate() {
            for (i, from) in corners.iter().enumerate() {
                let to = corners[(i + 1) % corners.len()];
                if *from == to {
                    continue;
                }
                edges
                    .entry((*from.min(&to), *from.max(&to)))
                    .or_default()
                    .push(BoundaryEdge {
                        face,
                        from: *from,
                        to,
                    });
            }
        }
        edges
    }

    /// Edges used by exactly one face.
    pub fn boundary_edges(&self) -> Vec<BoundaryEdge> {
        self.undirected_edges()
            .into_values()
            .filter(|uses| uses.len() == 1)
            .flatten()
            .collect()
    }

    /// Every edge once, as world-space segments.
    pub fn wire_edges(&self) -> Vec<[Vec3; 2]> {
        self.undirected_edges()
            .into_keys()
            .map(|(a, b)| [self.corner(a), self.corner(b)])
            .collect()
    }
}

/// All vertices of all align references.
pub fn container_points(containers: &[ContainerMesh]) -> Vec<Vec3> {
    containers
        .iter()
        .flat_map(|c| c.vertices.iter().copied())
        .collect()
}

/// One handle per boundary edge, with the transform of a square cell docked
/// flush against the outside of that edge.
pub fn reference_handles(containers: &[ContainerMesh], draw_offset: f32) -> Vec<ReferenceHandle> {
    let mut handles = Vec::new();
    for mesh in containers {
        for edge in mesh.boundary_edges() {
            let a = mesh.corner(edge.from);
            let b = mesh.corner(edge.to);
            let along = b - a;
            let size = along.length();
            let normal = mesh.face_normal(edge.face);
            if size < 1e-6 || normal == Vec3::ZERO {
                continue;
            }

            let midpoint = (a + b) * 0.5;
            let inward = mesh.face_center(edge.face) - midpoint;
            let mut outward = normal.cross(along);
            if inward.dot(outward) > 0.0 {
                outward = -outward;
            }
            let Some(outward) = outward.try_normalize() else {
                continue;
            };

            let y = normal.cross(outward).normalize_or_zero();
            let x = y.cross(normal).normalize_or_zero();

            handles.push(ReferenceHandle {
                pos: midpoint + normal * (draw_offset * 2.0),
                arrow_dir: outward,
                edge_dir: along / size,
                edge_length: size,
                loc: midpoint + outward * (size * 0.5),
                rot: Mat3::from_cols(x, y, normal),
                size,
            });
        }
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> ContainerMesh {
        ContainerMesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        )
    }

    #[test]
    fn quad_has_four_boundary_edges() {
        let mesh = unit_quad();
        assert_eq!(mesh.boundary_edges().len(), 4);
        assert_eq!(mesh.wire_edges().len(), 4);
        assert!(mesh.face_normal(0).abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn shared_edge_is_not_boundary() {
        let mesh = ContainerMesh::from_triangles(
            vec![Vec3::ZERO, Vec3::X, Vec3::ONE.with_z(0.0), Vec3::Y],
            &[[0, 1, 2], [0, 2, 3]],
        );
        assert_eq!(mesh.boundary_edges().len(), 4);
        assert_eq!(mesh.wire_edges().len(), 5);
    }

    #[test]
    fn reference_cells_dock_outside() {
        let handles = reference_handles(&[unit_quad()], 0.005);
        assert_eq!(handles.len(), 4);
        let right = handles
            .iter()
            .find(|h| h.arrow_dir.abs_diff_eq(Vec3::X, 1e-5))
            .unwrap();
        assert!(right.loc.abs_diff_eq(Vec3::new(1.5, 0.5, 0.0), 1e-5));
        assert!((right.size - 1.0).abs() < 1e-6);
        assert!(right.rot.z_axis.abs_diff_eq(Vec3::Z, 1e-5));
        assert!(right.rot.x_axis.abs_diff_eq(Vec3::X, 1e-5));
        assert!((right.pos.z - 0.01).abs() < 1e-6);
    }

    #[test]
    fn flipped_winding_still_points_outward() {
        let flipped = ContainerMesh::new(unit_quad().vertices().to_vec(), vec![vec![3, 2, 1, 0]]);
        let handles = reference_handles(&[flipped], 0.0);
        for handle in handles {
            let outward = handle.loc - Vec3::new(0.5, 0.5, 0.0);
            assert!(outward.dot(handle.arrow_dir) > 0.0);
        }
    }

    #[test]
    fn degenerate_faces_are_dropped() {
        let mesh = ContainerMesh::new(vec![Vec3::ZERO, Vec3::X], vec![vec![0, 1], vec![0, 1, 5]]);
        assert!(mesh.faces().is_empty());
    }
}
