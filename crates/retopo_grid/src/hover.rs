//! Screen-space handle picking.

use bevy::math::{Vec2, Vec3};

use crate::GridConfig;
use crate::handles::{CenterHandle, ConnectionHandle, Handle, HandleSet, VertexHandle};
use crate::surface::SurfaceQuery;

/// Maps between world space and the pixel space of the active view.
pub trait ScreenProjector {
    /// `None` when the point is behind the camera or otherwise unprojectable.
    fn world_to_screen(&self, point: Vec3) -> Option<Vec2>;

    /// Ray origin and unit direction through a pixel.
    fn screen_ray(&self, screen: Vec2) -> Option<(Vec3, Vec3)>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
    };

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }

    /// Ctrl or Alt switch picking over to vertices and connections.
    pub fn targets_vertices(self) -> bool {
        self.ctrl || self.alt
    }
}

/// The surface and view a pointer event happened in.
#[derive(Clone, Copy)]
pub struct Viewport<'a> {
    pub surface: &'a dyn SurfaceQuery,
    pub projector: &'a dyn ScreenProjector,
}

impl<'a> Viewport<'a> {
    pub fn new(surface: &'a dyn SurfaceQuery, projector: &'a dyn ScreenProjector) -> Self {
        Self { surface, projector }
    }

    /// Surface point under a pixel.
    pub fn surface_point(&self, screen: Vec2) -> Option<Vec3> {
        let (origin, dir) = self.projector.screen_ray(screen)?;
        self.surface.raycast(origin, dir).map(|hit| hit.location)
    }

    /// Whether the surface hides `point` from the camera. Points that cannot be
    /// projected count as hidden.
    pub fn is_occluded(&self, point: Vec3, config: &GridConfig) -> bool {
        if !config.prevent_click_through {
            return false;
        }
        let Some(screen) = self.projector.world_to_screen(point) else {
            return true;
        };
        let Some((origin, dir)) = self.projector.screen_ray(screen) else {
            return false;
        };
        match self.surface.raycast(origin, dir) {
            Some(hit) => hit.distance < origin.distance(point) - config.draw_offset * 1.5,
            None => false,
        }
    }

    pub fn within_click_radius(&self, point: Vec3, mouse: Vec2, config: &GridConfig) -> bool {
        self.projector
            .world_to_screen(point)
            .is_some_and(|screen| screen.distance(mouse) < config.click_radius)
    }

    /// Closest visible item within `radius` pixels of the mouse.
    fn closest<T: Copy>(
        &self,
        items: impl IntoIterator<Item = T>,
        position: impl Fn(&T) -> Vec3,
        mouse: Vec2,
        radius: f32,
        config: &GridConfig,
    ) -> Option<T> {
        let mut best: Option<(f32, T)> = None;
        for item in items {
            let pos = position(&item);
            let Some(screen) = self.projector.world_to_screen(pos) else {
                continue;
            };
            let dist = screen.distance(mouse);
            if dist >= radius || best.is_some_and(|(d, _)| dist >= d) {
                continue;
            }
            if !self.is_occluded(pos, config) {
                best = Some((dist, item));
            }
        }
        best.map(|(_, item)| item)
    }
}

/// Handles currently under the pointer, one slot per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HoverState {
    /// Grid arrow or reference arrow.
    pub edge: Option<Handle>,
    pub center: Option<CenterHandle>,
    pub vertex: Option<VertexHandle>,
    pub connection: Option<ConnectionHandle>,
}

impl HoverState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.edge
            .into_iter()
            .chain(self.center.map(Handle::Center))
            .chain(self.vertex.map(Handle::Vertex))
            .chain(self.connection.map(Handle::Connection))
    }
}

/// Finds the handles under `mouse` for the current modifier state.
///
/// With Ctrl or Alt held only vertices (and, with Alt, connections) are
/// candidates, and a hovered vertex hides any connection. Otherwise arrows
/// and cell centers are candidates.
pub fn pick(
    handles: &HandleSet,
    mouse: Vec2,
    modifiers: Modifiers,
    viewport: &Viewport,
    config: &GridConfig,
) -> HoverState {
    let mut hover = HoverState::default();
    if modifiers.targets_vertices() {
        hover.vertex = viewport.closest(
            handles.vertices.iter().copied(),
            |h| h.pos,
            mouse,
            config.click_radius * 1.5,
            config,
        );
        if modifiers.alt && hover.vertex.is_none() {
            hover.connection = viewport.closest(
                handles.connections.iter().copied(),
                |h| h.pos,
                mouse,
                config.hover_radius,
                config,
            );
        }
    } else {
        let edges = handles
            .arrows
            .iter()
            .copied()
            .map(Handle::Arrow)
            .chain(handles.references.iter().copied().map(Handle::Reference));
        hover.edge = viewport.closest(edges, Handle::position, mouse, config.hover_radius, config);
        hover.center = viewport.closest(
            handles.centers.iter().copied(),
            |h| h.pos,
            mouse,
            config.hover_radius,
            config,
        );
    }
    hover
}
