use bevy::prelude::*;
use retopo_grid::ScreenProjector;

/// Convert a window cursor position to coordinates local to the camera's viewport.
///
/// Returns `None` when the cursor is outside the viewport rectangle.
pub(crate) fn window_to_viewport_cursor(cursor_pos: Vec2, camera: &Camera) -> Option<Vec2> {
    let Some(rect) = camera.logical_viewport_rect() else {
        return Some(cursor_pos);
    };
    rect.contains(cursor_pos).then(|| cursor_pos - rect.min)
}

/// Projects through a Bevy camera, in the camera's logical viewport pixels.
pub struct CameraProjector<'a> {
    pub camera: &'a Camera,
    pub transform: &'a GlobalTransform,
}

impl<'a> CameraProjector<'a> {
    pub fn new(camera: &'a Camera, transform: &'a GlobalTransform) -> Self {
        Self { camera, transform }
    }
}

impl ScreenProjector for CameraProjector<'_> {
    fn world_to_screen(&self, point: Vec3) -> Option<Vec2> {
        self.camera.world_to_viewport(self.transform, point).ok()
    }

    fn screen_ray(&self, screen: Vec2) -> Option<(Vec3, Vec3)> {
        let ray = self.camera.viewport_to_world(self.transform, screen).ok()?;
        Some((ray.origin, *ray.direction))
    }
}
