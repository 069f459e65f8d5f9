use bevy::{
    input::mouse::MouseWheel,
    picking::mesh_picking::ray_cast::MeshRayCast,
    prelude::*,
};
use retopo_grid::{
    Modifiers, PointerEvent, PointerKind, RetopoError, RetopoSession, SessionFlow, Viewport,
};

use crate::{
    AlignReference, RetopoSystems,
    settings::RetopoSettings,
    status::RetopoStatus,
    surface::{MeshSurface, PickedSurface, collect_containers},
    viewport_util::{CameraProjector, window_to_viewport_cursor},
};

pub struct RetopoSessionPlugin;

impl Plugin for RetopoSessionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ActiveSession>()
            .add_message::<SessionCommand>()
            .add_systems(
                Update,
                (handle_session_keys, apply_session_commands, drive_session)
                    .chain()
                    .in_set(RetopoSystems::Input),
            );
    }
}

/// The running retopology session, if any.
#[derive(Resource, Default)]
pub struct ActiveSession {
    pub session: Option<RetopoSession>,
    /// The target entity the session was started on.
    pub target: Option<Entity>,
    /// Whether the last pointer event was used by the session. Camera
    /// controls should ignore the pointer while this is set.
    pub captured: bool,
    last_cursor: Option<Vec2>,
    last_modifiers: Modifiers,
}

impl ActiveSession {
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    fn begin(&mut self, session: RetopoSession, target: Entity) {
        self.session = Some(session);
        self.target = Some(target);
        self.captured = false;
        self.last_cursor = None;
        self.last_modifiers = Modifiers::NONE;
    }

    /// Drops a finished session, keeping its last message.
    pub(crate) fn end(&mut self, status: &mut RetopoStatus) {
        if let Some(mut session) = self.session.take()
            && let Some(last) = session.drain_messages().pop()
        {
            status.message = Some(last);
        }
        self.target = None;
        self.captured = false;
    }
}

#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start drawing a grid on the target, or stop the running session.
    Start,
    /// Start a session that grows cells out of the align references.
    StartFromContainer,
    Stop,
    /// Clear the grid and keep the session running.
    DeleteGrid,
}

fn handle_session_keys(
    keyboard: Res<ButtonInput<KeyCode>>,
    active: Res<ActiveSession>,
    mut commands: MessageWriter<SessionCommand>,
) {
    let shift = keyboard.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]);
    if keyboard.just_pressed(KeyCode::F2) {
        if active.is_running() {
            commands.write(SessionCommand::Stop);
        } else if shift {
            commands.write(SessionCommand::StartFromContainer);
        } else {
            commands.write(SessionCommand::Start);
        }
    }
    if keyboard.just_pressed(KeyCode::Delete) && active.is_running() {
        commands.write(SessionCommand::DeleteGrid);
    }
}

fn apply_session_commands(
    mut commands: MessageReader<SessionCommand>,
    mut active: ResMut<ActiveSession>,
    mut status: ResMut<RetopoStatus>,
    settings: Res<RetopoSettings>,
    surface: Res<MeshSurface>,
    references: Query<(&Mesh3d, &GlobalTransform), With<AlignReference>>,
    meshes: Res<Assets<Mesh>>,
) {
    for command in commands.read() {
        debug!("Session command: {command:?}");
        match command {
            SessionCommand::Start if active.is_running() => {
                if let Some(session) = active.session.as_mut() {
                    session.request_stop();
                }
            }
            SessionCommand::Start => {
                let Some(target) = surface.target() else {
                    status.warn("Add a RetopoTarget mesh to start retopology.");
                    continue;
                };
                active.begin(RetopoSession::start(), target);
            }
            SessionCommand::StartFromContainer => {
                if active.is_running() {
                    status.warn("A retopology session is already running.");
                    continue;
                }
                let Some(target) = surface.target() else {
                    status.warn("Add a RetopoTarget mesh to start retopology.");
                    continue;
                };
                let containers = collect_containers(&references, &meshes);
                match RetopoSession::start_from_container(&containers, &settings.grid) {
                    Ok(session) => active.begin(session, target),
                    Err(err) => status.error(&err),
                }
            }
            SessionCommand::Stop => match active.session.as_mut() {
                Some(session) => session.request_stop(),
                None => status.error(&RetopoError::NoSession),
            },
            SessionCommand::DeleteGrid => match active.session.as_mut() {
                Some(session) => session.discard_grid(),
                None => status.error(&RetopoError::NoSession),
            },
        }
    }
}

pub(crate) fn modifiers_from(keyboard: &ButtonInput<KeyCode>) -> Modifiers {
    Modifiers {
        shift: keyboard.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]),
        ctrl: keyboard.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]),
        alt: keyboard.any_pressed([KeyCode::AltLeft, KeyCode::AltRight]),
    }
}

/// Pointer events for one frame, in the order the session should see them.
///
/// `moved` also covers a pending stop, which the session only notices when
/// it receives an event.
fn pointer_events(
    keyboard: &ButtonInput<KeyCode>,
    mouse: &ButtonInput<MouseButton>,
    wheel: &[f32],
    cursor: Vec2,
    modifiers: Modifiers,
    moved: bool,
) -> Vec<PointerEvent> {
    let event = |kind| PointerEvent::new(kind, cursor, modifiers);
    if keyboard.just_pressed(KeyCode::Escape) {
        return vec![event(PointerKind::Cancel)];
    }
    let mut events = Vec::new();
    if moved {
        events.push(event(PointerKind::Move));
    }
    if mouse.just_pressed(MouseButton::Left) {
        events.push(event(PointerKind::Press));
    }
    if mouse.just_released(MouseButton::Left) {
        events.push(event(PointerKind::Release));
    }
    for delta in wheel {
        if *delta > 0.0 {
            events.push(event(PointerKind::WheelUp));
        } else if *delta < 0.0 {
            events.push(event(PointerKind::WheelDown));
        }
    }
    events
}

fn drive_session(
    mut active: ResMut<ActiveSession>,
    mut settings: ResMut<RetopoSettings>,
    mut status: ResMut<RetopoStatus>,
    surface: Res<MeshSurface>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut wheel_events: MessageReader<MouseWheel>,
    windows: Query<&Window>,
    cameras: Query<(&Camera, &GlobalTransform), With<Camera3d>>,
    mut ray_cast: MeshRayCast,
) {
    let wheel: Vec<f32> = wheel_events.read().map(|ev| ev.y).collect();
    if !active.is_running() {
        return;
    }

    let target = active.target.filter(|t| surface.target() == Some(*t));
    let Some((target, target_surface)) = target.zip(surface.get()) else {
        if let Some(session) = active.session.as_mut() {
            session.teardown();
        }
        active.end(&mut status);
        status.warn("Retopology target is gone. Session ended.");
        return;
    };

    let Ok(window) = windows.single() else {
        return;
    };
    let Ok((camera, cam_tf)) = cameras.single() else {
        return;
    };
    let cursor = window
        .cursor_position()
        .and_then(|pos| window_to_viewport_cursor(pos, camera));
    let Some(cursor) = cursor.or(active.last_cursor) else {
        return;
    };

    let modifiers = modifiers_from(&keyboard);
    let stop_pending = active
        .session
        .as_ref()
        .is_some_and(RetopoSession::is_stop_requested);
    let moved = active.last_cursor != Some(cursor)
        || active.last_modifiers != modifiers
        || stop_pending;
    active.last_cursor = Some(cursor);
    active.last_modifiers = modifiers;

    let events = pointer_events(&keyboard, &mouse, &wheel, cursor, modifiers, moved);
    if events.is_empty() {
        return;
    }

    let projector = CameraProjector::new(camera, cam_tf);
    let picked = PickedSurface::new(target_surface, target, &mut ray_cast);
    let viewport = Viewport::new(&picked, &projector);
    let mut finished = false;
    let mut captured = active.captured;
    if let Some(session) = active.session.as_mut() {
        for event in events {
            match session.handle_event(event, &viewport, &mut settings.grid) {
                SessionFlow::Finished => {
                    finished = true;
                    break;
                }
                SessionFlow::Running => captured = true,
                SessionFlow::PassThrough => captured = false,
            }
        }
    }
    active.captured = captured;
    if finished {
        active.end(&mut status);
    }
}
