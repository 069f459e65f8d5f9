use bevy::prelude::*;

/// Inserts [`CommandHistory`] and binds Ctrl+Z / Ctrl+Shift+Z.
pub struct CommandHistoryPlugin;

impl Plugin for CommandHistoryPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CommandHistory>()
            .add_systems(Update, handle_undo_redo_keys);
    }
}

// ---------------------------------------------------------------------------
// RetopoCommand trait
// ---------------------------------------------------------------------------

pub trait RetopoCommand: Send + Sync + 'static {
    fn execute(&self, world: &mut World);
    fn undo(&self, world: &mut World);
    fn description(&self) -> &str;
}

// ---------------------------------------------------------------------------
// CommandHistory resource
// ---------------------------------------------------------------------------

/// Undo and redo stacks. The undo stack keeps at most [`HISTORY_LIMIT`]
/// entries; the oldest are dropped first.
#[derive(Resource, Default)]
pub struct CommandHistory {
    pub undo_stack: Vec<Box<dyn RetopoCommand>>,
    pub redo_stack: Vec<Box<dyn RetopoCommand>>,
}

pub const HISTORY_LIMIT: usize = 64;

impl CommandHistory {
    pub fn execute(&mut self, command: Box<dyn RetopoCommand>, world: &mut World) {
        command.execute(world);
        self.record(command);
    }

    /// Pushes an already executed command and forgets the redo stack.
    pub fn record(&mut self, command: Box<dyn RetopoCommand>) {
        self.undo_stack.push(command);
        self.redo_stack.clear();
        if self.undo_stack.len() > HISTORY_LIMIT {
            let excess = self.undo_stack.len() - HISTORY_LIMIT;
            self.undo_stack.drain(..excess);
        }
    }

    pub fn undo(&mut self, world: &mut World) {
        if let Some(command) = self.undo_stack.pop() {
            command.undo(world);
            self.redo_stack.push(command);
        }
    }

    pub fn redo(&mut self, world: &mut World) {
        if let Some(command) = self.redo_stack.pop() {
            command.execute(world);
            self.undo_stack.push(command);
        }
    }

    /// Description of the command the next undo would revert.
    pub fn last_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|command| command.description())
    }
}

/// Executes `command` and records it, for callers holding the whole world.
pub fn run_command(world: &mut World, command: Box<dyn RetopoCommand>) {
    info!("{}", command.description());
    command.execute(world);
    world.get_resource_or_init::<CommandHistory>().record(command);
}

// ---------------------------------------------------------------------------
// CommandGroup: atomic multi-step command
// ---------------------------------------------------------------------------

pub struct CommandGroup {
    pub commands: Vec<Box<dyn RetopoCommand>>,
    pub label: String,
}

impl RetopoCommand for CommandGroup {
    fn execute(&self, world: &mut World) {
        for cmd in &self.commands {
            cmd.execute(world);
        }
    }

    fn undo(&self, world: &mut World) {
        for cmd in self.commands.iter().rev() {
            cmd.undo(world);
        }
    }

    fn description(&self) -> &str {
        &self.label
    }
}

fn handle_undo_redo_keys(world: &mut World) {
    let Some(keyboard) = world.get_resource::<ButtonInput<KeyCode>>() else {
        return;
    };
    let ctrl = keyboard.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]);
    let shift = keyboard.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]);
    if !ctrl || !keyboard.just_pressed(KeyCode::KeyZ) {
        return;
    }

    // Commands get the world without the history in it.
    world.resource_scope(|world, mut history: Mut<CommandHistory>| {
        if shift {
            history.redo(world);
            if let Some(label) = history.last_description() {
                debug!("Redo: {label}");
            }
        } else {
            history.undo(world);
            if let Some(label) = history.redo_stack.last().map(|c| c.description()) {
                debug!("Undo: {label}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Resource, Default)]
    struct Counter(i32);

    struct Add(i32);

    impl RetopoCommand for Add {
        fn execute(&self, world: &mut World) {
            world.resource_mut::<Counter>().0 += self.0;
        }

        fn undo(&self, world: &mut World) {
            world.resource_mut::<Counter>().0 -= self.0;
        }

        fn description(&self) -> &str {
            "Add"
        }
    }

    fn world() -> World {
        let mut world = World::new();
        world.init_resource::<Counter>();
        world.init_resource::<CommandHistory>();
        world
    }

    #[test]
    fn undo_then_redo() {
        let mut world = world();
        run_command(&mut world, Box::new(Add(2)));
        run_command(&mut world, Box::new(Add(3)));
        assert_eq!(world.resource::<Counter>().0, 5);

        world.resource_scope(|world, mut history: Mut<CommandHistory>| {
            history.undo(world);
            assert_eq!(world.resource::<Counter>().0, 2);
            history.redo(world);
        });
        assert_eq!(world.resource::<Counter>().0, 5);
        assert_eq!(world.resource::<CommandHistory>().redo_stack.len(), 0);
    }

    #[test]
    fn new_command_clears_redo() {
        let mut world = world();
        run_command(&mut world, Box::new(Add(1)));
        world.resource_scope(|world, mut history: Mut<CommandHistory>| history.undo(world));
        assert_eq!(world.resource::<CommandHistory>().redo_stack.len(), 1);

        run_command(&mut world, Box::new(Add(4)));
        let history = world.resource::<CommandHistory>();
        assert!(history.redo_stack.is_empty());
        assert_eq!(history.last_description(), Some("Add"));
        assert_eq!(world.resource::<Counter>().0, 4);
    }

    #[test]
    fn history_drops_the_oldest() {
        let mut world = world();
        for _ in 0..HISTORY_LIMIT + 3 {
            run_command(&mut world, Box::new(Add(1)));
        }
        world.resource_scope(|world, mut history: Mut<CommandHistory>| {
            assert_eq!(history.undo_stack.len(), HISTORY_LIMIT);
            while !history.undo_stack.is_empty() {
                history.undo(world);
            }
        });
        assert_eq!(world.resource::<Counter>().0, 3);
    }

    #[test]
    fn ctrl_z_undoes() {
        let mut app = App::new();
        app.add_plugins(CommandHistoryPlugin)
            .init_resource::<Counter>()
            .init_resource::<ButtonInput<KeyCode>>();
        run_command(app.world_mut(), Box::new(Add(7)));

        let mut keys = app.world_mut().resource_mut::<ButtonInput<KeyCode>>();
        keys.press(KeyCode::ControlLeft);
        keys.press(KeyCode::KeyZ);
        app.update();
        assert_eq!(app.world().resource::<Counter>().0, 0);
        assert_eq!(app.world().resource::<CommandHistory>().redo_stack.len(), 1);
    }

    #[test]
    fn group_undoes_in_reverse() {
        let mut world = world();
        let group = CommandGroup {
            commands: vec![Box::new(Add(1)), Box::new(Add(10))],
            label: "Both".into(),
        };
        run_command(&mut world, Box::new(group));
        assert_eq!(world.resource::<Counter>().0, 11);
        world.resource_scope(|world, mut history: Mut<CommandHistory>| history.undo(world));
        assert_eq!(world.resource::<Counter>().0, 0);
    }
}
