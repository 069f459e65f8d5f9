use std::path::{Path, PathBuf};

use anyhow::Context;
use bevy::prelude::*;
use retopo_grid::GridConfig;

pub const SETTINGS_FILE: &str = "retopo_settings.json";

/// Grid settings shared by every system of the plugin.
#[derive(Resource, Clone, Debug, Default)]
pub struct RetopoSettings {
    pub grid: GridConfig,
    /// Where the settings were read from, if anywhere.
    pub source: Option<PathBuf>,
}

pub struct RetopoSettingsPlugin {
    pub path: PathBuf,
}

impl Default for RetopoSettingsPlugin {
    fn default() -> Self {
        Self {
            path: PathBuf::from(SETTINGS_FILE),
        }
    }
}

impl Plugin for RetopoSettingsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(load_settings_or_default(&self.path));
    }
}

/// Reads a settings file. `Ok(None)` when the file does not exist.
pub fn load_settings(path: &Path) -> anyhow::Result<Option<GridConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: GridConfig = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config.sanitized()))
}

pub fn load_settings_or_default(path: &Path) -> RetopoSettings {
    match load_settings(path) {
        Ok(Some(grid)) => {
            info!("Retopology settings loaded from {}", path.display());
            RetopoSettings {
                grid,
                source: Some(path.to_path_buf()),
            }
        }
        Ok(None) => {
            debug!("No settings at {}, using defaults", path.display());
            RetopoSettings::default()
        }
        Err(err) => {
            warn!("Failed to load retopology settings: {err:#}");
            RetopoSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, config: &GridConfig) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
