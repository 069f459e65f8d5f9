use bevy::prelude::*;
use retopo_grid::{InteractionState, RetopoError, StatusLevel, StatusMessage};

use crate::{RetopoSystems, session::ActiveSession, settings::RetopoSettings};

pub struct StatusPlugin;

impl Plugin for StatusPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RetopoStatus>()
            .add_systems(Startup, spawn_status_bar)
            .add_systems(
                Update,
                (publish_session_messages, update_status_text, update_hint_text)
                    .chain()
                    .in_set(RetopoSystems::Feedback),
            );
    }
}

/// The latest feedback line shown to the user.
#[derive(Resource, Default)]
pub struct RetopoStatus {
    pub message: Option<StatusMessage>,
}

impl RetopoStatus {
    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{text}");
        self.message = Some(StatusMessage {
            level: StatusLevel::Info,
            text,
        });
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!("{text}");
        self.message = Some(StatusMessage {
            level: StatusLevel::Warning,
            text,
        });
    }

    pub fn error(&mut self, err: &RetopoError) {
        self.warn(err.sentence());
    }

    pub fn text(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.text.as_str())
    }
}

#[derive(Component)]
pub struct StatusText;

/// Current mode and segment size.
#[derive(Component)]
pub struct HintText;

fn spawn_status_bar(mut commands: Commands) {
    commands
        .spawn(Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            bottom: Val::Px(8.0),
            flex_direction: FlexDirection::Column,
            row_gap: Val::Px(2.0),
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                HintText,
                Text::new("F2: draw grid  Shift+F2: grow from reference"),
                TextFont {
                    font_size: 13.0,
                    ..default()
                },
                TextColor(Color::srgba(1.0, 1.0, 1.0, 0.6)),
            ));
            parent.spawn((
                StatusText,
                Text::new(""),
                TextFont {
                    font_size: 15.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
        });
}

fn publish_session_messages(mut active: ResMut<ActiveSession>, mut status: ResMut<RetopoStatus>) {
    let Some(session) = active.session.as_mut() else {
        return;
    };
    // Messages are already logged by the session.
    if let Some(last) = session.drain_messages().pop() {
        status.message = Some(last);
    }
}

fn update_status_text(
    status: Res<RetopoStatus>,
    mut text_query: Query<(&mut Text, &mut TextColor), With<StatusText>>,
) {
    if !status.is_changed() {
        return;
    }
    let Ok((mut text, mut color)) = text_query.single_mut() else {
        return;
    };
    let new_text = status.text();
    if text.0 != new_text {
        text.0 = new_text.to_string();
    }
    color.0 = match status.message.as_ref().map(|m| m.level) {
        Some(StatusLevel::Warning) => Color::srgb(1.0, 0.75, 0.3),
        _ => Color::WHITE,
    };
}

fn update_hint_text(
    active: Res<ActiveSession>,
    settings: Res<RetopoSettings>,
    mut text_query: Query<&mut Text, With<HintText>>,
) {
    let Ok(mut text) = text_query.single_mut() else {
        return;
    };
    let new_text = match active.session.as_ref() {
        None => "F2: draw grid  Shift+F2: grow from reference".to_string(),
        Some(session) => {
            let mode = match session.state() {
                InteractionState::DrawingLineStart | InteractionState::DrawingLineEnd { .. } => {
                    "Drawing"
                }
                InteractionState::Idle => "Editing",
                InteractionState::Adding { .. } => "Adding",
                InteractionState::Deleting { .. } => "Deleting",
                InteractionState::MovingSegment(_) => "Moving cell",
                InteractionState::MovingVertex { .. } => "Moving vertex",
            };
            format!(
                "{mode}  Segment: {:.2}  Cells: {}  Enter: bake  Esc: cancel",
                settings.grid.segment_size,
                session.store().cell_count()
            )
        }
    };
    if text.0 != new_text {
        text.0 = new_text;
    }
}
