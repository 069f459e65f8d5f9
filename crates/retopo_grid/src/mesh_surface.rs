use bevy::{
    math::{Affine3A, Dir3, Mat3, Mat4, Ray3d, Vec3},
    picking::mesh_picking::ray_cast::{Backfaces, ray_mesh_intersection},
};

use crate::surface::{RayHit, SurfaceHit, SurfaceQuery};

/// Triangle soup in local space with a local-to-world transform.
///
/// Closest-point queries are brute force over every triangle. Ray casts go
/// through Bevy's mesh picking intersection. Degenerate triangles are skipped.
#[derive(Clone, Debug)]
pub struct TriangleSurface {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    // Flat copies in the layout mesh picking reads.
    raw_positions: Vec<[f32; 3]>,
    indices: Vec<u32>,
    world: Mat4,
    inverse: Option<Mat4>,
    normal_matrix: Mat3,
}

impl TriangleSurface {
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>, world: Mat4) -> Self {
        let inverse = (world.determinant().abs() > f32::EPSILON).then(|| world.inverse());
        let normal_matrix = inverse
            .map(|inv| Mat3::from_mat4(inv).transpose())
            .unwrap_or(Mat3::IDENTITY);
        let vertex_count = positions.len() as u32;
        let triangles: Vec<[u32; 3]> = triangles
            .into_iter()
            .filter(|tri| tri.iter().all(|i| *i < vertex_count))
            .collect();
        let raw_positions = positions.iter().map(|p| p.to_array()).collect();
        let indices = triangles.iter().flatten().copied().collect();
        Self {
            positions,
            triangles,
            raw_positions,
            indices,
            world,
            inverse,
            normal_matrix,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world
    }

    /// World-space centroid and unit normal of every triangle.
    pub fn face_samples(&self) -> Vec<(Vec3, Vec3)> {
        (0..self.triangles.len())
            .filter_map(|i| {
                let [a, b, c] = self.local_triangle(i);
                let normal = (b - a).cross(c - a).try_normalize()?;
                let center = (a + b + c) / 3.0;
                Some((
                    self.world.transform_point3(center),
                    self.world_normal(normal),
                ))
            })
            .collect()
    }

    /// World-space vertex positions.
    pub fn world_positions(&self) -> Vec<Vec3> {
        self.positions
            .iter()
            .map(|p| self.world.transform_point3(*p))
            .collect()
    }

    fn local_triangle(&self, index: usize) -> [Vec3; 3] {
        self.triangles[index].map(|i| self.positions[i as usize])
    }

    /// Index, closest point and unit normal of the triangle nearest to a
    /// local-space point.
    fn nearest_face(&self, local: Vec3) -> Option<(usize, Vec3, Vec3)> {
        let mut best: Option<(f32, usize, Vec3, Vec3)> = None;
        for i in 0..self.triangles.len() {
            let [a, b, c] = self.local_triangle(i);
            let Some(normal) = (b - a).cross(c - a).try_normalize() else {
                continue;
            };
            let closest = closest_point_on_triangle(local, a, b, c);
            let dist_sq = closest.distance_squared(local);
            if best.is_none_or(|(d, ..)| dist_sq < d) {
                best = Some((dist_sq, i, closest, normal));
            }
        }
        best.map(|(_, face, closest, normal)| (face, closest, normal))
    }

    fn world_normal(&self, local: Vec3) -> Vec3 {
        (self.normal_matrix * local).normalize_or(Vec3::Z)
    }
}

impl SurfaceQuery for TriangleSurface {
    fn project(&self, point: Vec3) -> Option<SurfaceHit> {
        let inverse = self.inverse?;
        let (_, closest, normal) = self.nearest_face(inverse.transform_point3(point))?;
        Some(SurfaceHit {
            location: self.world.transform_point3(closest),
            normal: self.world_normal(normal),
        })
    }

    fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<RayHit> {
        let inverse = self.inverse?;
        let ray = Ray3d::new(origin, Dir3::new(direction).ok()?);
        let hit = ray_mesh_intersection(
            ray,
            &Affine3A::from_mat4(self.world),
            &self.raw_positions,
            None,
            Some(&self.indices),
            None,
            Backfaces::Include,
        )?;
        let (face, _, normal) = self.nearest_face(inverse.transform_point3(hit.point))?;
        Some(RayHit {
            location: hit.point,
            normal: self.world_normal(normal),
            face,
            distance: origin.distance(hit.point),
        })
    }

    fn is_valid(&self) -> bool {
        self.inverse.is_some()
    }
}

/// Closest point to `p` on triangle `abc` (Ericson, Real-Time Collision
/// Detection 5.1.5).
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}
