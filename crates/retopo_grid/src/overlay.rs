use bevy::math::{Mat3, Vec3};

use crate::handles::{CenterHandle, ConnectionHandle, Handle};
use crate::surface::{PreserveAxis, SurfaceQuery, solve_surface_transform};

/// Line and point geometry for drawing the grid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridOverlay {
    /// Grid edges at their exact vertex positions.
    pub edges: Vec<[Vec3; 2]>,
    /// Every vertex, lifted off the surface.
    pub points: Vec<Vec3>,
    /// Pinned vertices, lifted off the surface.
    pub pinned: Vec<Vec3>,
}

/// Geometry of a single hover indicator.
#[derive(Clone, Debug, PartialEq)]
pub enum Glyph {
    Triangle([Vec3; 3]),
    Lines(Vec<[Vec3; 2]>),
    Point(Vec3),
}

const CIRCLE_SEGMENTS: usize = 12;

/// Triangle pointing along `arrow_dir`, its base parallel to the edge.
pub fn arrow_glyph(pos: Vec3, arrow_dir: Vec3, edge_dir: Vec3, edge_length: f32) -> Glyph {
    let size = edge_length * 0.2;
    let tip = pos + arrow_dir * size;
    let base = pos - arrow_dir * (size * 0.5);
    let wing = edge_dir * (size * 0.5);
    Glyph::Triangle([tip, base + wing, base - wing])
}

/// X-shaped cross in the cell plane.
pub fn delete_glyph(handle: &CenterHandle) -> Glyph {
    let reach = handle.size * 0.15;
    let x = handle.rot.x_axis * reach;
    let y = handle.rot.y_axis * reach;
    let c = handle.pos;
    Glyph::Lines(vec![[c - x - y, c + x + y], [c - x + y, c + x - y]])
}

/// Circle in the cell plane.
pub fn move_glyph(handle: &CenterHandle) -> Glyph {
    let radius = handle.size * 0.12;
    let points: Vec<Vec3> = (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let angle = std::f32::consts::TAU * i as f32 / CIRCLE_SEGMENTS as f32;
            handle.pos + handle.rot * Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0)
        })
        .collect();
    Glyph::Lines(closed_loop(&points))
}

/// Diamond in the surface tangent plane.
pub fn connect_glyph<S: SurfaceQuery + ?Sized>(handle: &ConnectionHandle, surface: &S) -> Glyph {
    let size = handle.distance * 0.2;
    let rot = solve_surface_transform(surface, handle.pos, Mat3::IDENTITY, PreserveAxis::Y)
        .map_or(Mat3::IDENTITY, |(_, rot)| rot);
    let x = rot.x_axis * size;
    let y = rot.y_axis * size;
    let c = handle.pos;
    Glyph::Lines(closed_loop(&[c + x, c + y, c - x, c - y]))
}

/// Indicator for whichever hover slot `handle` came from. Center handles get
/// the move circle unless `deleting` is set.
pub fn hover_glyph<S: SurfaceQuery + ?Sized>(handle: &Handle, deleting: bool, surface: &S) -> Glyph {
    match handle {
        Handle::Arrow(h) => arrow_glyph(h.pos, h.arrow_dir, h.edge_dir, h.edge_length),
        Handle::Reference(h) => arrow_glyph(h.pos, h.arrow_dir, h.edge_dir, h.edge_length),
        Handle::Center(h) if deleting => delete_glyph(h),
        Handle::Center(h) => move_glyph(h),
        Handle::Vertex(h) => Glyph::Point(h.pos),
        Handle::Connection(h) => connect_glyph(h, surface),
    }
}

fn closed_loop(points: &[Vec3]) -> Vec<[Vec3; 2]> {
    (0..points.len())
        .map(|i| [points[i], points[(i + 1) % points.len()]])
        .collect()
}
