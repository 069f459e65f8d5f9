//! Interactive quad-grid retopology for Bevy.
//!
//! Mark a mesh entity with [`RetopoTarget`], add [`RetopoPlugin`] and press F2
//! to start drawing a grid on it. The grid itself lives in [`retopo_grid`];
//! this crate feeds it window input, supplies the target as a surface and
//! draws the result with gizmos.

pub mod bake;
pub mod grid_ops;
pub mod overlay;
pub mod session;
pub mod settings;
pub mod status;
pub mod surface;
pub mod viewport_util;

use std::path::PathBuf;

use bevy::prelude::*;
use retopo_commands::CommandHistoryPlugin;

/// The mesh being retopologized. Only the first one found is used.
#[derive(Component, Default)]
pub struct RetopoTarget;

/// A finished mesh whose boundary the grid can be aligned to or grown from.
#[derive(Component, Default)]
pub struct AlignReference;

/// A mesh baked from a grid.
#[derive(Component, Clone, Copy, Debug)]
pub struct RetopoMesh {
    /// The target the grid was drawn on.
    pub target: Entity,
}

#[derive(SystemSet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetopoSystems {
    /// Session lifecycle and pointer input.
    Input,
    /// Keyboard operators on the grid and baked meshes.
    Operators,
    /// Status line and overlay drawing.
    Feedback,
}

pub struct RetopoPlugin {
    pub settings_path: PathBuf,
}

impl Default for RetopoPlugin {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from(settings::SETTINGS_FILE),
        }
    }
}

impl Plugin for RetopoPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (
                RetopoSystems::Input,
                RetopoSystems::Operators,
                RetopoSystems::Feedback,
            )
                .chain(),
        )
        .add_plugins((
            settings::RetopoSettingsPlugin {
                path: self.settings_path.clone(),
            },
            CommandHistoryPlugin,
            surface::RetopoSurfacePlugin,
            session::RetopoSessionPlugin,
            grid_ops::GridOpsPlugin,
            bake::BakePlugin,
            status::StatusPlugin,
            overlay::RetopoOverlayPlugin,
        ));
    }
}
