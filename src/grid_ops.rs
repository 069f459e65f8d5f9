use bevy::prelude::*;
use retopo_grid::{
    ContainerMesh, GridConfig, PinAll, RetopoError, RetopoSession, StatusLevel, SurfaceQuery,
    grid_ops::{align_to_container, flatten, straighten, toggle_pin_all},
};

use crate::{
    AlignReference, RetopoSystems,
    session::ActiveSession,
    settings::RetopoSettings,
    status::RetopoStatus,
    surface::{MeshSurface, collect_containers},
};

pub struct GridOpsPlugin;

impl Plugin for GridOpsPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<GridOp>().add_systems(
            Update,
            (handle_grid_op_keys, apply_grid_ops)
                .chain()
                .in_set(RetopoSystems::Operators),
        );
    }
}

/// Whole-grid operations on the running session.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridOp {
    /// Snap boundary vertices to the nearest align reference vertices.
    Align { pin: bool },
    Straighten,
    Flatten,
    TogglePinAll,
}

fn handle_grid_op_keys(
    keyboard: Res<ButtonInput<KeyCode>>,
    active: Res<ActiveSession>,
    mut ops: MessageWriter<GridOp>,
) {
    if !active.is_running() {
        return;
    }
    if keyboard.just_pressed(KeyCode::Digit1) {
        ops.write(GridOp::Align { pin: false });
    } else if keyboard.just_pressed(KeyCode::Digit2) {
        ops.write(GridOp::Align { pin: true });
    } else if keyboard.just_pressed(KeyCode::Digit3) {
        ops.write(GridOp::Straighten);
    } else if keyboard.just_pressed(KeyCode::Digit4) {
        ops.write(GridOp::Flatten);
    } else if keyboard.just_pressed(KeyCode::Digit5) {
        ops.write(GridOp::TogglePinAll);
    }
}

fn apply_grid_ops(
    mut ops: MessageReader<GridOp>,
    mut active: ResMut<ActiveSession>,
    mut status: ResMut<RetopoStatus>,
    settings: Res<RetopoSettings>,
    surface: Res<MeshSurface>,
    references: Query<(&Mesh3d, &GlobalTransform), With<AlignReference>>,
    meshes: Res<Assets<Mesh>>,
) {
    for op in ops.read() {
        let Some(session) = active.session.as_mut() else {
            status.error(&RetopoError::NoSession);
            continue;
        };
        let Some(target) = surface.get() else {
            status.error(&RetopoError::SurfaceMiss);
            continue;
        };
        let containers = match op {
            GridOp::Align { .. } => collect_containers(&references, &meshes),
            _ => Vec::new(),
        };
        match run_grid_op(session, *op, target, &containers, &settings.grid) {
            Ok(text) => session.report(StatusLevel::Info, text),
            Err(err) => session.report(StatusLevel::Warning, err.sentence()),
        }
    }
}

/// Applies `op` to the session's grid and describes the outcome.
pub fn run_grid_op<S: SurfaceQuery + ?Sized>(
    session: &mut RetopoSession,
    op: GridOp,
    surface: &S,
    containers: &[ContainerMesh],
    config: &GridConfig,
) -> Result<String, RetopoError> {
    let store = session.store_mut();
    let text = match op {
        GridOp::Align { pin } => {
            let count = align_to_container(store, containers, config.align_distance, pin)?;
            if pin {
                format!("Snapped and pinned {count} vertices.")
            } else {
                format!("Snapped {count} vertices.")
            }
        }
        GridOp::Straighten => {
            let fallback = straighten(store, surface, config.segment_size)?;
            with_fallback_note("Grid straightened.", fallback)
        }
        GridOp::Flatten => {
            let fallback = flatten(store, surface)?;
            with_fallback_note("Grid flattened.", fallback)
        }
        GridOp::TogglePinAll => match toggle_pin_all(store)? {
            PinAll::Pinned(count) => format!("Pinned {count} vertices."),
            PinAll::Unpinned(count) => format!("Unpinned {count} vertices."),
        },
    };
    Ok(text)
}

fn with_fallback_note(text: &str, fallback: bool) -> String {
    if fallback {
        format!("{text} Cells disagree on direction, so the first cell's frame was used.")
    } else {
        text.to_string()
    }
}
