//! The interactive retopology session.
//!
//! A [`RetopoSession`] owns the grid for as long as the user is editing it and
//! turns pointer events into grid edits. Handles, vertex positions and
//! overlay geometry are rebuilt from scratch whenever the grid changes.

use bevy::log::{debug, info, warn};
use bevy::math::{Vec2, Vec3};

use crate::container::{ContainerMesh, reference_handles};
use crate::edit::{
    PinToggle, SegmentDrag, connect_vertices, delete_cell, extend_from, generate_strip,
    insert_reference_cell, resize_cell, toggle_pin,
};
use crate::error::Result;
use crate::handles::{Derived, Handle, ReferenceHandle, derive};
use crate::hover::{HoverState, Modifiers, Viewport, pick};
use crate::overlay::{Glyph, hover_glyph};
use crate::surface::SurfaceQuery;
use crate::{GridConfig, GridCoord, GridDir, GridStore, RetopoError};

/// How far the pointer has to leave the active cell, relative to its size,
/// before dragging out another cell.
const ADD_THRESHOLD: f32 = 0.7;

/// Where the session is in its modal flow.
#[derive(Clone, Debug, PartialEq)]
pub enum InteractionState {
    /// Waiting for the press that starts the initial line.
    DrawingLineStart,
    /// Dragging out the initial line; the strip is previewed live.
    DrawingLineEnd { start: Vec3, end: Vec3 },
    Idle,
    /// Dragging new cells out of `active`.
    Adding { active: GridCoord },
    /// Deleting every cell the pointer passes over.
    Deleting { last: Option<GridCoord> },
    MovingSegment(SegmentDrag),
    MovingVertex { vertex: GridCoord },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    Press,
    Release,
    WheelUp,
    WheelDown,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    /// Pixel position in the viewport.
    pub position: Vec2,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, position: Vec2, modifiers: Modifiers) -> Self {
        Self {
            kind,
            position,
            modifiers,
        }
    }
}

/// What the host should do with an event after the session saw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionFlow {
    /// Consumed.
    Running,
    /// Not used by the session; the host may handle it (camera controls).
    PassThrough,
    /// The session ended and should be dropped.
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

/// A line of feedback for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

pub struct RetopoSession {
    store: GridStore,
    state: InteractionState,
    modifiers: Modifiers,
    mouse: Vec2,
    hover: HoverState,
    derived: Derived,
    references: Vec<ReferenceHandle>,
    dirty: bool,
    rebuilds: usize,
    stop_requested: bool,
    finished: bool,
    messages: Vec<StatusMessage>,
}

impl RetopoSession {
    /// Starts a session that begins by drawing a line on the surface.
    pub fn start() -> Self {
        let mut session = Self::with_state(InteractionState::DrawingLineStart);
        session.info("Draw a line on the surface by holding the left mouse button.");
        session
    }

    /// Starts a session that grows the grid out of the boundary edges of the
    /// given reference meshes.
    pub fn start_from_container(containers: &[ContainerMesh], config: &GridConfig) -> Result<Self> {
        if containers.is_empty() {
            return Err(RetopoError::EmptyContainer);
        }
        let mut session = Self::with_state(InteractionState::Idle);
        session.references = reference_handles(containers, config.draw_offset);
        session.info("Click a boundary edge of a reference mesh to add a cell.");
        Ok(session)
    }

    fn with_state(state: InteractionState) -> Self {
        Self {
            store: GridStore::new(),
            state,
            modifiers: Modifiers::NONE,
            mouse: Vec2::ZERO,
            hover: HoverState::default(),
            derived: Derived::default(),
            references: Vec::new(),
            dirty: true,
            rebuilds: 0,
            stop_requested: false,
            finished: false,
            messages: Vec::new(),
        }
    }

    pub fn store(&self) -> &GridStore {
        &self.store
    }

    /// Mutable grid access for batch operators. Marks derived state stale.
    pub fn store_mut(&mut self) -> &mut GridStore {
        self.dirty = true;
        &mut self.store
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn hover(&self) -> &HoverState {
        &self.hover
    }

    pub fn derived(&self) -> &Derived {
        &self.derived
    }

    pub fn is_reference_mode(&self) -> bool {
        !self.references.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The line being drawn, if any.
    pub fn line(&self) -> Option<(Vec3, Vec3)> {
        match self.state {
            InteractionState::DrawingLineEnd { start, end } => Some((start, end)),
            _ => None,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of full rebuilds of derived state so far.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Asks the session to end on the next event it sees.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Drops the grid but keeps the session running. A line-drawing session
    /// goes back to waiting for a new line.
    pub fn discard_grid(&mut self) {
        self.store.clear();
        self.state = if self.is_reference_mode() {
            InteractionState::Idle
        } else {
            InteractionState::DrawingLineStart
        };
        self.hover = HoverState::default();
        self.dirty = true;
        self.info("Grid deleted.");
    }

    /// Queues a status line produced outside the event loop.
    pub fn report(&mut self, level: StatusLevel, text: impl Into<String>) {
        match level {
            StatusLevel::Info => self.info(text),
            StatusLevel::Warning => self.warn(text),
        }
    }

    /// Ends the session and drops all grid state.
    pub fn teardown(&mut self) {
        self.store.clear();
        self.derived = Derived::default();
        self.hover = HoverState::default();
        self.references.clear();
        self.state = InteractionState::Idle;
        self.stop_requested = false;
        self.dirty = false;
        self.finished = true;
        debug!("retopology session torn down");
    }

    pub fn drain_messages(&mut self) -> Vec<StatusMessage> {
        std::mem::take(&mut self.messages)
    }

    fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{text}");
        self.messages.push(StatusMessage {
            level: StatusLevel::Info,
            text,
        });
    }

    fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!("{text}");
        self.messages.push(StatusMessage {
            level: StatusLevel::Warning,
            text,
        });
    }

    /// Rebuilds handles, vertex positions and overlay geometry.
    pub fn rebuild<S: SurfaceQuery + ?Sized>(&mut self, surface: &S, config: &GridConfig) {
        self.derived = derive(&self.store, config, surface, &self.references);
        self.dirty = false;
        self.rebuilds += 1;
    }

    pub fn rebuild_if_dirty<S: SurfaceQuery + ?Sized>(&mut self, surface: &S, config: &GridConfig) {
        if self.dirty {
            self.rebuild(surface, config);
        }
    }

    /// Rebuilds after a structural change and picks again under the pointer.
    fn refresh(&mut self, viewport: &Viewport, config: &GridConfig) {
        self.rebuild(viewport.surface, config);
        self.repick(viewport, config);
    }

    fn repick(&mut self, viewport: &Viewport, config: &GridConfig) {
        self.hover = pick(
            &self.derived.handles,
            self.mouse,
            self.modifiers,
            viewport,
            config,
        );
    }

    /// Hover indicators for the current hover state.
    pub fn hover_glyphs<S: SurfaceQuery + ?Sized>(&self, surface: &S) -> Vec<Glyph> {
        let deleting =
            self.modifiers.shift || matches!(self.state, InteractionState::Deleting { .. });
        self.hover
            .handles()
            .map(|handle| hover_glyph(&handle, deleting, surface))
            .collect()
    }

    /// Feeds one pointer event through the state machine.
    pub fn handle_event(
        &mut self,
        event: PointerEvent,
        viewport: &Viewport,
        config: &mut GridConfig,
    ) -> SessionFlow {
        if self.finished {
            return SessionFlow::Finished;
        }
        if self.stop_requested {
            self.teardown();
            return SessionFlow::Finished;
        }
        self.rebuild_if_dirty(viewport.surface, config);

        self.mouse = event.position;
        if event.modifiers != self.modifiers {
            self.modifiers = event.modifiers;
            self.repick(viewport, config);
        }

        if event.kind == PointerKind::Cancel {
            self.info("Retopology session cancelled.");
            self.teardown();
            return SessionFlow::Finished;
        }

        match self.state {
            InteractionState::DrawingLineStart => self.line_start(event, viewport, config),
            InteractionState::DrawingLineEnd { .. } => self.line_end(event, viewport, config),
            InteractionState::Idle => self.idle(event, viewport, config),
            InteractionState::Adding { active } => self.adding(active, event, viewport, config),
            InteractionState::Deleting { last } => self.deleting(last, event, viewport, config),
            InteractionState::MovingSegment(_) => self.moving_segment(event, viewport, config),
            InteractionState::MovingVertex { vertex } => self.moving_vertex(vertex, event, viewport),
        }
    }

    fn line_start(&mut self, event: PointerEvent, viewport: &Viewport, config: &GridConfig) -> SessionFlow {
        if event.kind != PointerKind::Press {
            return SessionFlow::Running;
        }
        let Some(point) = viewport.surface_point(event.position) else {
            self.info("Could not find a surface under the cursor.");
            return SessionFlow::Running;
        };
        self.state = InteractionState::DrawingLineEnd {
            start: point,
            end: point,
        };
        self.preview_strip(viewport, config);
        self.info("Release to finish the line. Scroll to change the cell size.");
        SessionFlow::Running
    }

    fn line_end(&mut self, event: PointerEvent, viewport: &Viewport, config: &mut GridConfig) -> SessionFlow {
        let InteractionState::DrawingLineEnd { start, end } = self.state else {
            return SessionFlow::Running;
        };
        match event.kind {
            PointerKind::Move => {
                if let Some(point) = viewport.surface_point(event.position) {
                    self.state = InteractionState::DrawingLineEnd { start, end: point };
                    self.preview_strip(viewport, config);
                }
            }
            PointerKind::WheelUp | PointerKind::WheelDown => {
                config.nudge_segment_size(event.kind == PointerKind::WheelUp, event.modifiers.shift);
                self.preview_strip(viewport, config);
            }
            PointerKind::Release => match generate_strip(
                &mut self.store,
                start,
                end,
                config.segment_size,
                viewport.surface,
            ) {
                Ok(count) => {
                    self.state = InteractionState::Idle;
                    self.refresh(viewport, config);
                    self.info(format!("Grid created with {count} cells."));
                }
                Err(err) => {
                    self.state = InteractionState::DrawingLineStart;
                    self.store.clear();
                    self.refresh(viewport, config);
                    if err == RetopoError::LineTooShort {
                        self.info("Line is too short. Draw a line on the surface.");
                    } else {
                        self.warn("No cells were placed. Draw a line on the surface.");
                    }
                }
            },
            _ => {}
        }
        SessionFlow::Running
    }

    fn preview_strip(&mut self, viewport: &Viewport, config: &GridConfig) {
        let Some((start, end)) = self.line() else {
            return;
        };
        // Too short while the drag is starting out; the store is left empty.
        let _ = generate_strip(&mut self.store, start, end, config.segment_size, viewport.surface);
        self.refresh(viewport, config);
    }

    fn idle(&mut self, event: PointerEvent, viewport: &Viewport, config: &GridConfig) -> SessionFlow {
        self.repick(viewport, config);
        let modifiers = event.modifiers;
        match event.kind {
            PointerKind::WheelUp | PointerKind::WheelDown if modifiers.shift && !modifiers.ctrl => {
                if let Some(center) = self.hover.center {
                    let grow = event.kind == PointerKind::WheelUp;
                    match resize_cell(&mut self.store, center.cell, grow, config.resize_ratio) {
                        Ok(_) => self.refresh(viewport, config),
                        Err(err) => debug!("resize refused: {err}"),
                    }
                }
                SessionFlow::Running
            }
            PointerKind::Press => self.idle_press(event, viewport, config),
            _ => SessionFlow::PassThrough,
        }
    }

    fn idle_press(&mut self, event: PointerEvent, viewport: &Viewport, config: &GridConfig) -> SessionFlow {
        let modifiers = event.modifiers;
        let mouse = event.position;
        let hover = self.hover;

        if modifiers.alt
            && !modifiers.shift
            && !modifiers.ctrl
            && let Some(vertex) = hover.vertex
        {
            match toggle_pin(&mut self.store, vertex.vertex) {
                Ok(PinToggle::Pinned(v)) => self.info(format!("Vertex {v} pinned.")),
                Ok(PinToggle::Unpinned(v)) => self.info(format!("Vertex {v} unpinned.")),
                Err(err) => self.warn(err.to_string()),
            }
            self.refresh(viewport, config);
            return SessionFlow::Running;
        }

        if modifiers.ctrl
            && let Some(vertex) = hover.vertex
        {
            self.state = InteractionState::MovingVertex {
                vertex: vertex.vertex,
            };
            return SessionFlow::Running;
        }

        if modifiers.shift
            && let Some(center) = hover.center
            && viewport.within_click_radius(center.pos, mouse, config)
        {
            match delete_cell(&mut self.store, center.cell) {
                Ok(_) => {
                    self.state = InteractionState::Deleting {
                        last: Some(center.cell),
                    };
                    self.refresh(viewport, config);
                }
                Err(err) => self.info(err.sentence()),
            }
            return SessionFlow::Running;
        }

        if modifiers.is_empty()
            && let Some(center) = hover.center
            && viewport.within_click_radius(center.pos, mouse, config)
        {
            if let Some(start) = viewport.surface_point(mouse) {
                let drag = SegmentDrag::begin(&self.store, center.cell, start, config.falloff_depth());
                debug!("moving cell {} with {} rings", center.cell, drag.rings().len());
                self.state = InteractionState::MovingSegment(drag);
            }
            return SessionFlow::Running;
        }

        if let Some(edge) = hover.edge
            && viewport.within_click_radius(edge.position(), mouse, config)
        {
            let added = match edge {
                Handle::Arrow(arrow) => extend_from(&mut self.store, &arrow, viewport.surface),
                Handle::Reference(reference) => insert_reference_cell(&mut self.store, &reference),
                _ => return SessionFlow::Running,
            };
            match added {
                Ok(active) => {
                    self.state = InteractionState::Adding { active };
                    self.refresh(viewport, config);
                }
                Err(err) => debug!("add refused: {err}"),
            }
            return SessionFlow::Running;
        }

        if modifiers.alt
            && let Some(connection) = hover.connection
            && viewport.within_click_radius(connection.pos, mouse, config)
        {
            match connect_vertices(&mut self.store, connection.v1, connection.v2) {
                Ok(_) => self.info("Vertices connected."),
                Err(err) => self.warn(err.sentence()),
            }
            self.refresh(viewport, config);
            return SessionFlow::Running;
        }

        SessionFlow::PassThrough
    }

    fn adding(
        &mut self,
        active: GridCoord,
        event: PointerEvent,
        viewport: &Viewport,
        config: &GridConfig,
    ) -> SessionFlow {
        match event.kind {
            PointerKind::Release => {
                self.state = InteractionState::Idle;
            }
            PointerKind::Move => {
                let Some(point) = viewport.surface_point(event.position) else {
                    return SessionFlow::Running;
                };
                let Some(cell) = self.store.cell(active).copied() else {
                    self.state = InteractionState::Idle;
                    return SessionFlow::Running;
                };
                let offset = point - cell.loc;
                if offset.length() < cell.mean_size() * ADD_THRESHOLD {
                    return SessionFlow::Running;
                }
                let direction = offset.normalize();
                let dir = dominant_direction(
                    direction.dot(cell.rot.x_axis),
                    direction.dot(cell.rot.y_axis),
                );

                let neighbor = active.step(dir);
                if self.store.contains_cell(neighbor) {
                    self.state = InteractionState::Adding { active: neighbor };
                    return SessionFlow::Running;
                }
                let Some(arrow) = self.derived.handles.arrow_for(active, dir).copied() else {
                    return SessionFlow::Running;
                };
                if let Ok(added) = extend_from(&mut self.store, &arrow, viewport.surface) {
                    self.state = InteractionState::Adding { active: added };
                    self.refresh(viewport, config);
                }
            }
            _ => {}
        }
        SessionFlow::Running
    }

    fn deleting(
        &mut self,
        last: Option<GridCoord>,
        event: PointerEvent,
        viewport: &Viewport,
        config: &GridConfig,
    ) -> SessionFlow {
        match event.kind {
            PointerKind::Release => {
                self.state = InteractionState::Idle;
            }
            PointerKind::Move => {
                self.repick(viewport, config);
                let Some(center) = self.hover.center else {
                    return SessionFlow::Running;
                };
                if Some(center.cell) == last {
                    return SessionFlow::Running;
                }
                if delete_cell(&mut self.store, center.cell).is_ok() {
                    self.state = InteractionState::Deleting {
                        last: Some(center.cell),
                    };
                    self.refresh(viewport, config);
                }
            }
            _ => {}
        }
        SessionFlow::Running
    }

    fn moving_segment(&mut self, event: PointerEvent, viewport: &Viewport, config: &GridConfig) -> SessionFlow {
        match event.kind {
            PointerKind::Release => {
                self.state = InteractionState::Idle;
                self.dirty = true;
            }
            PointerKind::Move => {
                let InteractionState::MovingSegment(drag) = &self.state else {
                    return SessionFlow::Running;
                };
                if let Some(point) = viewport.surface_point(event.position) {
                    drag.apply(&mut self.store, point, &config.falloff_weights, viewport.surface);
                    self.dirty = true;
                }
            }
            _ => {}
        }
        SessionFlow::Running
    }

    fn moving_vertex(&mut self, vertex: GridCoord, event: PointerEvent, viewport: &Viewport) -> SessionFlow {
        match event.kind {
            PointerKind::Release => {
                // A pinned vertex keeps following the drag once released.
                if let Ok(root) = self.store.resolve(vertex)
                    && self.store.is_pinned(root)
                    && let Some(pos) = self.store.overrides().get(&root).copied()
                {
                    self.store.set_pin(root, pos);
                }
                self.state = InteractionState::Idle;
                self.dirty = true;
            }
            PointerKind::Move => {
                if let Some(point) = viewport.surface_point(event.position) {
                    self.store.set_vertex_override(vertex, point);
                    self.dirty = true;
                }
            }
            _ => {}
        }
        SessionFlow::Running
    }
}

/// Grid step for a pointer offset expressed in the cell's X and Y axes.
fn dominant_direction(along_x: f32, along_y: f32) -> GridDir {
    if along_x.abs() > along_y.abs() {
        if along_x > 0.0 {
            GridDir::PosX
        } else {
            GridDir::NegX
        }
    } else if along_y > 0.0 {
        GridDir::PosY
    } else {
        GridDir::NegY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriangleSurface;
    use crate::testing::{TopDown, flat_plane};

    const VIEW: TopDown = TopDown { scale: 100.0 };

    fn event(kind: PointerKind, x: f32, y: f32) -> PointerEvent {
        PointerEvent::new(kind, Vec2::new(x, y), Modifiers::NONE)
    }

    fn with(kind: PointerKind, x: f32, y: f32, modifiers: Modifiers) -> PointerEvent {
        PointerEvent::new(kind, Vec2::new(x, y), modifiers)
    }

    const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
    };
    const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        alt: false,
    };
    const ALT: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: true,
    };

    /// Session with a strip of `cells` half-unit cells along +X from the origin.
    fn drawn(cells: usize, config: &mut GridConfig) -> RetopoSession {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut session = RetopoSession::start();
        // A little past the last cell so the strip length never rounds down.
        let end = cells as f32 * 50.0 + 10.0;
        session.handle_event(event(PointerKind::Press, 0.0, 0.0), &viewport, config);
        session.handle_event(event(PointerKind::Move, end, 0.0), &viewport, config);
        session.handle_event(event(PointerKind::Release, end, 0.0), &viewport, config);
        session
    }

    #[test]
    fn drawing_a_line_creates_a_strip() {
        let mut config = GridConfig::default();
        let mut session = drawn(4, &mut config);
        assert_eq!(session.state(), &InteractionState::Idle);
        assert_eq!(session.store().cell_count(), 4);
        assert!(
            session
                .drain_messages()
                .iter()
                .any(|m| m.text == "Grid created with 4 cells.")
        );
    }

    #[test]
    fn short_line_starts_over() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = RetopoSession::start();
        session.handle_event(event(PointerKind::Press, 0.0, 0.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Release, 0.5, 0.0), &viewport, &mut config);
        assert_eq!(session.state(), &InteractionState::DrawingLineStart);
        assert!(session.store().is_empty());
    }

    /// Ray casts land on the plane but closest-point queries always miss.
    struct RaysOnly(TriangleSurface);

    impl SurfaceQuery for RaysOnly {
        fn project(&self, _: Vec3) -> Option<crate::surface::SurfaceHit> {
            None
        }

        fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<crate::surface::RayHit> {
            self.0.raycast(origin, direction)
        }
    }

    #[test]
    fn strip_without_cells_starts_over() {
        let surface = RaysOnly(flat_plane());
        let viewport = Viewport::new(&surface, &VIEW);
        let mut config = GridConfig::default();
        let mut session = RetopoSession::start();
        session.handle_event(event(PointerKind::Press, 0.0, 0.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Move, 210.0, 0.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Release, 210.0, 0.0), &viewport, &mut config);
        assert_eq!(session.state(), &InteractionState::DrawingLineStart);
        assert!(session.store().is_empty());
        let messages = session.drain_messages();
        let last = messages.last().unwrap();
        assert_eq!(last.level, StatusLevel::Warning);
        assert_eq!(last.text, "No cells were placed. Draw a line on the surface.");
    }

    #[test]
    fn wheel_resizes_segments_while_drawing() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = RetopoSession::start();
        session.handle_event(event(PointerKind::Press, 0.0, 0.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Move, 210.0, 0.0), &viewport, &mut config);
        assert_eq!(session.store().cell_count(), 4);
        for _ in 0..5 {
            session.handle_event(event(PointerKind::WheelDown, 210.0, 0.0), &viewport, &mut config);
        }
        assert!((config.segment_size - 0.25).abs() < 1e-5);
        assert_eq!(session.store().cell_count(), 8);
        session.handle_event(with(PointerKind::WheelUp, 210.0, 0.0, SHIFT), &viewport, &mut config);
        assert!((config.segment_size - 0.26).abs() < 1e-5);
        assert_eq!(session.store().cell_count(), 8);
    }

    #[test]
    fn discarding_returns_to_line_drawing() {
        let mut config = GridConfig::default();
        let mut session = drawn(3, &mut config);
        session.discard_grid();
        assert!(session.store().is_empty());
        assert_eq!(session.state(), &InteractionState::DrawingLineStart);
        assert!(session.is_dirty());
        assert!(!session.is_finished());
    }

    #[test]
    fn stop_request_ends_on_next_event() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        session.request_stop();
        let flow = session.handle_event(event(PointerKind::Move, 0.0, 0.0), &viewport, &mut config);
        assert_eq!(flow, SessionFlow::Finished);
        assert!(session.store().is_empty());
        assert!(session.is_finished());
    }

    #[test]
    fn cancel_tears_down() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        let flow = session.handle_event(event(PointerKind::Cancel, 0.0, 0.0), &viewport, &mut config);
        assert_eq!(flow, SessionFlow::Finished);
        assert!(session.derived().handles.centers.is_empty());
    }

    #[test]
    fn rebuilds_only_when_dirty() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        let before = session.rebuild_count();
        session.handle_event(event(PointerKind::Move, 500.0, 500.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Move, 510.0, 500.0), &viewport, &mut config);
        assert_eq!(session.rebuild_count(), before);
        session.store_mut();
        session.handle_event(event(PointerKind::Move, 510.0, 500.0), &viewport, &mut config);
        assert_eq!(session.rebuild_count(), before + 1);
    }

    #[test]
    fn empty_click_passes_through() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        let flow = session.handle_event(event(PointerKind::Press, 800.0, 800.0), &viewport, &mut config);
        assert_eq!(flow, SessionFlow::PassThrough);
    }

    #[test]
    fn shift_drag_deletes_cells_but_not_the_last() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(3, &mut config);
        session.handle_event(with(PointerKind::Press, 25.0, 0.0, SHIFT), &viewport, &mut config);
        assert_eq!(session.store().cell_count(), 2);
        session.handle_event(with(PointerKind::Move, 75.0, 0.0, SHIFT), &viewport, &mut config);
        assert_eq!(session.store().cell_count(), 1);
        session.handle_event(with(PointerKind::Move, 125.0, 0.0, SHIFT), &viewport, &mut config);
        assert_eq!(session.store().cell_count(), 1);
        session.handle_event(with(PointerKind::Release, 125.0, 0.0, SHIFT), &viewport, &mut config);
        assert_eq!(session.state(), &InteractionState::Idle);

        session.drain_messages();
        session.handle_event(with(PointerKind::Press, 125.0, 0.0, SHIFT), &viewport, &mut config);
        assert_eq!(session.store().cell_count(), 1);
        assert_eq!(
            session.drain_messages().last().map(|m| m.text.as_str()),
            Some("Cannot delete the last cell.")
        );
    }

    #[test]
    fn modifier_change_switches_hover_to_vertices() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        session.handle_event(event(PointerKind::Move, 48.0, 24.0), &viewport, &mut config);
        assert!(session.hover().vertex.is_none());
        // Pressing Ctrl arrives with the next event, without moving the pointer.
        session.handle_event(with(PointerKind::Move, 48.0, 24.0, CTRL), &viewport, &mut config);
        assert_eq!(
            session.hover().vertex.map(|v| v.vertex),
            Some(GridCoord::new(1, 1))
        );
    }

    #[test]
    fn ctrl_drag_moves_a_single_vertex() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        session.handle_event(with(PointerKind::Move, 50.0, 25.0, CTRL), &viewport, &mut config);
        session.handle_event(with(PointerKind::Press, 50.0, 25.0, CTRL), &viewport, &mut config);
        assert_eq!(
            session.state(),
            &InteractionState::MovingVertex {
                vertex: GridCoord::new(1, 1)
            }
        );
        session.handle_event(with(PointerKind::Move, 60.0, 40.0, CTRL), &viewport, &mut config);
        session.handle_event(with(PointerKind::Release, 60.0, 40.0, CTRL), &viewport, &mut config);
        let pos = session.store().final_verts()[&GridCoord::new(1, 1)];
        assert!(pos.abs_diff_eq(Vec3::new(0.6, 0.4, 0.0), 1e-4));
        assert_eq!(session.store().cell_count(), 2);
    }

    #[test]
    fn moved_pin_follows_the_drag() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(2, &mut config);
        let vertex = GridCoord::new(1, 1);
        session.handle_event(with(PointerKind::Move, 50.0, 25.0, ALT), &viewport, &mut config);
        session.handle_event(with(PointerKind::Press, 50.0, 25.0, ALT), &viewport, &mut config);
        assert!(session.store().is_pinned(vertex));

        session.handle_event(with(PointerKind::Press, 50.0, 25.0, CTRL), &viewport, &mut config);
        session.handle_event(with(PointerKind::Move, 50.0, 45.0, CTRL), &viewport, &mut config);
        session.handle_event(with(PointerKind::Release, 50.0, 45.0, CTRL), &viewport, &mut config);
        let pin = session.store().pin(vertex).unwrap();
        assert!(pin.abs_diff_eq(Vec3::new(0.5, 0.45, 0.0), 1e-4));
    }

    #[test]
    fn dragging_from_an_arrow_adds_cells() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let mut session = drawn(4, &mut config);
        session.handle_event(event(PointerKind::Move, 200.0, 0.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Press, 200.0, 0.0), &viewport, &mut config);
        assert_eq!(
            session.state(),
            &InteractionState::Adding {
                active: GridCoord::new(4, 0)
            }
        );
        session.handle_event(event(PointerKind::Move, 300.0, 0.0), &viewport, &mut config);
        assert!(session.store().contains_cell(GridCoord::new(5, 0)));
        session.handle_event(event(PointerKind::Release, 300.0, 0.0), &viewport, &mut config);
        assert_eq!(session.store().cell_count(), 6);
        assert_eq!(session.state(), &InteractionState::Idle);
    }

    #[test]
    fn container_session_docks_a_cell() {
        let plane = flat_plane();
        let viewport = Viewport::new(&plane, &VIEW);
        let mut config = GridConfig::default();
        let quad = ContainerMesh::new(
            vec![
                Vec3::new(-1.0, -0.5, 0.0),
                Vec3::new(0.0, -0.5, 0.0),
                Vec3::new(0.0, 0.5, 0.0),
                Vec3::new(-1.0, 0.5, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        );
        let mut session = RetopoSession::start_from_container(&[quad], &config).unwrap();
        assert!(session.is_reference_mode());
        // Right-hand edge of the quad sits at x = 0.
        session.handle_event(event(PointerKind::Move, 0.0, 0.0), &viewport, &mut config);
        session.handle_event(event(PointerKind::Press, 0.0, 0.0), &viewport, &mut config);
        let cell = session.store().cell(GridCoord::new(0, 0)).copied().unwrap();
        assert!(cell.loc.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-5));
        assert_eq!(cell.size, Vec2::ONE);
    }

    #[test]
    fn empty_container_is_refused() {
        assert!(matches!(
            RetopoSession::start_from_container(&[], &GridConfig::default()),
            Err(RetopoError::EmptyContainer)
        ));
    }

    #[test]
    fn dominant_axis_picks_direction() {
        assert_eq!(dominant_direction(0.9, 0.1), GridDir::PosX);
        assert_eq!(dominant_direction(-0.9, 0.1), GridDir::NegX);
        assert_eq!(dominant_direction(0.1, 0.9), GridDir::PosY);
        assert_eq!(dominant_direction(0.3, -0.9), GridDir::NegY);
    }
}
