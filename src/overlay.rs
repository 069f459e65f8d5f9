use bevy::prelude::*;
use retopo_grid::{
    Glyph, Handle as GridHandle, InteractionState, ScreenProjector, overlay::hover_glyph,
};

use crate::{
    AlignReference, RetopoSystems,
    bake::FaceSelection,
    session::{ActiveSession, modifiers_from},
    settings::RetopoSettings,
    surface::{MeshSurface, collect_containers},
    viewport_util::{CameraProjector, window_to_viewport_cursor},
};

pub struct RetopoOverlayPlugin;

impl Plugin for RetopoOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_gizmo_group::<RetopoGizmos>().add_systems(
            Update,
            (
                sync_gizmo_config,
                draw_grid_overlay,
                draw_container_wires,
                draw_face_selection,
            )
                .chain()
                .in_set(RetopoSystems::Feedback),
        );
    }
}

/// Gizmo group for everything the retopology overlay draws.
#[derive(Default, Reflect, GizmoConfigGroup)]
pub struct RetopoGizmos;

const CONTAINER_COLOR: Color = Color::srgba(0.2, 0.5, 1.0, 0.9);
const LINE_COLOR: Color = Color::srgb(0.2, 0.9, 0.9);
const GRID_COLOR: Color = Color::srgb(0.9, 0.7, 0.1);
const GRID_COLOR_XRAY: Color = Color::srgba(0.9, 0.7, 0.1, 0.8);
const PINNED_COLOR: Color = Color::srgb(0.8, 0.1, 0.8);
const VERTEX_COLOR: Color = Color::srgba(1.0, 0.5, 0.0, 0.8);
const SELECTION_COLOR: Color = Color::srgb(1.0, 0.5, 0.0);

fn sync_gizmo_config(settings: Res<RetopoSettings>, mut config_store: ResMut<GizmoConfigStore>) {
    if !settings.is_changed() {
        return;
    }
    let (config, _) = config_store.config_mut::<RetopoGizmos>();
    // Negative bias draws the overlay on top of the surface.
    config.depth_bias = if settings.grid.x_ray { -1.0 } else { 0.0 };
    config.line.width = 2.0;
}

/// Line segments of a hover glyph. Points have none.
pub fn glyph_segments(glyph: &Glyph) -> Vec<[Vec3; 2]> {
    match glyph {
        Glyph::Triangle([a, b, c]) => vec![[*a, *b], [*b, *c], [*c, *a]],
        Glyph::Lines(lines) => lines.clone(),
        Glyph::Point(_) => Vec::new(),
    }
}

/// Hover color, full strength when the handle is close enough to click.
fn hover_color(handle: &GridHandle, deleting: bool, alt: bool, clickable: bool) -> Color {
    let (rgb, dim) = match handle {
        GridHandle::Arrow(_) | GridHandle::Reference(_) => ([0.1, 0.9, 0.2], 0.4),
        GridHandle::Center(_) if deleting => ([1.0, 0.2, 0.1], 0.4),
        GridHandle::Center(_) => ([0.2, 0.9, 0.9], 0.5),
        GridHandle::Vertex(_) if alt => ([0.5, 1.0, 1.0], 1.0),
        GridHandle::Vertex(_) => ([1.0, 1.0, 0.0], 1.0),
        GridHandle::Connection(_) => ([0.2, 0.5, 1.0], 0.5),
    };
    let alpha = if clickable { 1.0 } else { dim };
    Color::srgba(rgb[0], rgb[1], rgb[2], alpha)
}

fn draw_point(gizmos: &mut Gizmos<RetopoGizmos>, pos: Vec3, radius: f32, color: Color) {
    gizmos.sphere(Isometry3d::from_translation(pos), radius, color);
}

fn draw_grid_overlay(
    mut gizmos: Gizmos<RetopoGizmos>,
    mut active: ResMut<ActiveSession>,
    settings: Res<RetopoSettings>,
    surface: Res<MeshSurface>,
    keyboard: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window>,
    cameras: Query<(&Camera, &GlobalTransform), With<Camera3d>>,
) {
    let Some(session) = active.session.as_mut() else {
        return;
    };
    let Some(target_surface) = surface.get() else {
        return;
    };
    // Operators mark the grid dirty after the session already ran this frame.
    session.rebuild_if_dirty(target_surface, &settings.grid);

    let config = &settings.grid;
    let point_radius = config.segment_size * 0.03;

    if let Some((start, end)) = session.line() {
        gizmos.line(start, end, LINE_COLOR);
    }

    let overlay = &session.derived().overlay;
    let grid_color = if config.x_ray { GRID_COLOR_XRAY } else { GRID_COLOR };
    for [a, b] in &overlay.edges {
        gizmos.line(*a, *b, grid_color);
    }
    for pos in &overlay.pinned {
        draw_point(&mut gizmos, *pos, point_radius * 1.5, PINNED_COLOR);
    }

    let modifiers = modifiers_from(&keyboard);
    if modifiers.targets_vertices() {
        for pos in &overlay.points {
            draw_point(&mut gizmos, *pos, point_radius, VERTEX_COLOR);
        }
    }

    let cursor = windows.single().ok().and_then(|w| w.cursor_position());
    let camera = cameras.single().ok();
    let clickable = |pos: Vec3| -> bool {
        let (Some(cursor), Some((camera, cam_tf))) = (cursor, camera) else {
            return false;
        };
        let Some(mouse) = window_to_viewport_cursor(cursor, camera) else {
            return false;
        };
        CameraProjector::new(camera, cam_tf)
            .world_to_screen(pos)
            .is_some_and(|screen| screen.distance(mouse) < config.click_radius)
    };

    let deleting =
        modifiers.shift || matches!(session.state(), InteractionState::Deleting { .. });
    for handle in session.hover().handles() {
        let color = hover_color(&handle, deleting, modifiers.alt, clickable(handle.position()));
        match hover_glyph(&handle, deleting, target_surface) {
            Glyph::Point(pos) => draw_point(&mut gizmos, pos, point_radius * 2.0, color),
            other => {
                for [a, b] in glyph_segments(&other) {
                    gizmos.line(a, b, color);
                }
            }
        }
    }
}

fn draw_container_wires(
    mut gizmos: Gizmos<RetopoGizmos>,
    active: Res<ActiveSession>,
    references: Query<(&Mesh3d, &GlobalTransform), With<AlignReference>>,
    meshes: Res<Assets<Mesh>>,
) {
    let Some(session) = active.session.as_ref() else {
        return;
    };
    if !session.is_reference_mode() {
        return;
    }
    for container in collect_containers(&references, &meshes) {
        for [a, b] in container.wire_edges() {
            gizmos.line(a, b, CONTAINER_COLOR);
        }
    }
}

fn draw_face_selection(
    mut gizmos: Gizmos<RetopoGizmos>,
    selection: Res<FaceSelection>,
    surface: Res<MeshSurface>,
    settings: Res<RetopoSettings>,
) {
    if selection.target.is_none() || selection.target != surface.target() {
        return;
    }
    let radius = settings.grid.segment_size * 0.05;
    for center in &selection.centers {
        draw_point(&mut gizmos, *center, radius, SELECTION_COLOR);
    }
}
