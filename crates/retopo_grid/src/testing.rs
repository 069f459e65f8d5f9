use bevy::math::{Mat4, Vec2, Vec3};

use crate::TriangleSurface;
use crate::hover::ScreenProjector;

/// 100×100 square in the XY plane facing +Z.
pub fn flat_plane() -> TriangleSurface {
    TriangleSurface::new(
        vec![
            Vec3::new(-50.0, -50.0, 0.0),
            Vec3::new(50.0, -50.0, 0.0),
            Vec3::new(50.0, 50.0, 0.0),
            Vec3::new(-50.0, 50.0, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
        Mat4::IDENTITY,
    )
}

/// Orthographic camera looking down -Z, `scale` pixels per world unit.
pub struct TopDown {
    pub scale: f32,
}

impl ScreenProjector for TopDown {
    fn world_to_screen(&self, point: Vec3) -> Option<Vec2> {
        Some(point.truncate() * self.scale)
    }

    fn screen_ray(&self, screen: Vec2) -> Option<(Vec3, Vec3)> {
        Some(((screen / self.scale).extend(100.0), Vec3::NEG_Z))
    }
}
