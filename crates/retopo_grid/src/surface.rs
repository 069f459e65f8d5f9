//! Surface queries and the frame solver that keeps cells tangent to the
//! reference surface.

use bevy::math::{Mat3, Vec3};

use crate::RetopoError;
use crate::error::Result;

/// Below this length a projected guide axis is considered collapsed.
pub const AXIS_EPSILON: f32 = 0.01;

/// Closest point on a surface together with its unit normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub location: Vec3,
    pub normal: Vec3,
}

/// First intersection of a ray with a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub location: Vec3,
    pub normal: Vec3,
    pub face: usize,
    /// World-space distance from the ray origin.
    pub distance: f32,
}

/// Geometric queries against the reference surface. Everything is in world
/// space.
pub trait SurfaceQuery {
    /// Closest point on the surface to `point`.
    fn project(&self, point: Vec3) -> Option<SurfaceHit>;

    /// Nearest hit along `direction` starting at `origin`.
    fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<RayHit>;

    /// False when world-space queries cannot be answered at all, for example
    /// because the surface transform is singular.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Which tangent axis of the guide frame survives when a cell is re-seated
/// on the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreserveAxis {
    X,
    #[default]
    Y,
}

/// Builds a right-handed orthonormal frame with `normal` as Z, keeping the
/// preferred tangent axis of `guide` as close as possible.
///
/// When the preferred axis is (nearly) parallel to the normal the other guide
/// axis is used, and failing that the world up axis.
pub fn frame_from_normal(normal: Vec3, guide: Mat3, preserve: PreserveAxis) -> Mat3 {
    let z = normal.normalize_or(Vec3::Z);
    let (first, second) = match preserve {
        PreserveAxis::Y => (guide.y_axis, guide.x_axis),
        PreserveAxis::X => (guide.x_axis, guide.y_axis),
    };

    let x = if let Some(tangent) = tangent_projection(first, z) {
        match preserve {
            PreserveAxis::Y => tangent.cross(z),
            PreserveAxis::X => tangent,
        }
    } else if let Some(tangent) = tangent_projection(second, z) {
        match preserve {
            PreserveAxis::Y => tangent,
            PreserveAxis::X => tangent.cross(z),
        }
    } else {
        world_up_tangent(z).cross(z)
    };

    orthonormal_from_xz(x, z)
}

/// Seats a frame at the surface point closest to `point`.
pub fn solve_surface_transform<S: SurfaceQuery + ?Sized>(
    surface: &S,
    point: Vec3,
    guide: Mat3,
    preserve: PreserveAxis,
) -> Result<(Vec3, Mat3)> {
    let hit = surface.project(point).ok_or(RetopoError::SurfaceMiss)?;
    Ok((hit.location, frame_from_normal(hit.normal, guide, preserve)))
}

/// Seats a strip cell: X follows the stroke direction, falling back to the
/// previous cell's frame and then the world up axis.
pub fn solve_strip_transform<S: SurfaceQuery + ?Sized>(
    surface: &S,
    point: Vec3,
    direction: Vec3,
    previous: Option<Mat3>,
) -> Result<(Vec3, Mat3)> {
    let hit = surface.project(point).ok_or(RetopoError::SurfaceMiss)?;
    let z = hit.normal.normalize_or(Vec3::Z);

    let x = if let Some(x) = tangent_projection(direction, z) {
        x
    } else if let Some(prev) = previous {
        match tangent_projection(prev.x_axis, z) {
            Some(x) => x,
            None => match tangent_projection(prev.y_axis, z) {
                Some(y) => y.cross(z),
                None => world_up_tangent(z).cross(z),
            },
        }
    } else {
        world_up_tangent(z).cross(z)
    };

    Ok((hit.location, orthonormal_from_xz(x, z)))
}

/// Projects every point onto the surface, leaving misses where they are.
pub fn snap_to_surface<S: SurfaceQuery + ?Sized>(surface: &S, points: &mut [Vec3]) -> usize {
    let mut snapped = 0;
    for point in points.iter_mut() {
        if let Some(hit) = surface.project(*point) {
            *point = hit.location;
            snapped += 1;
        }
    }
    snapped
}

fn tangent_projection(axis: Vec3, normal: Vec3) -> Option<Vec3> {
    let projected = axis - normal * axis.dot(normal);
    (projected.length() > AXIS_EPSILON).then(|| projected.normalize())
}

/// Tangent Y axis derived from world up (+Z, or +Y when the normal is
/// vertical).
fn world_up_tangent(normal: Vec3) -> Vec3 {
    let up = if normal.dot(Vec3::Z).abs() > 0.999 {
        Vec3::Y
    } else {
        Vec3::Z
    };
    (up - normal * up.dot(normal)).normalize_or(Vec3::Y)
}

fn orthonormal_from_xz(x: Vec3, z: Vec3) -> Mat3 {
    let y = z.cross(x).normalize_or(Vec3::Y);
    let x = y.cross(z).normalize_or(Vec3::X);
    Mat3::from_cols(x, y, z)
}
