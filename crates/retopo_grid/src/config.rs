use serde::{Deserialize, Serialize};

pub const MIN_SEGMENT_SIZE: f32 = 0.01;
pub const MAX_SEGMENT_SIZE: f32 = 10.0;
/// Smallest edge length a single cell can be resized down to.
pub const MIN_CELL_SIZE: f32 = 0.001;

/// What baking the grid produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditMode {
    /// Build a new quad mesh from the grid.
    #[default]
    Create,
    /// Select the reference faces lying under the grid.
    SelectFaces,
}

/// Tunables for a retopology session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Edge length of newly created cells.
    pub segment_size: f32,
    /// Search radius for snapping boundary vertices onto the align reference.
    pub align_distance: f32,
    /// Screen-space pixel radius within which handles are shown.
    pub hover_radius: f32,
    /// Screen-space pixel radius within which a hovered handle can be clicked.
    pub click_radius: f32,
    /// Distance handles and overlay points are pushed off the surface.
    pub draw_offset: f32,
    /// Multiplicative step used when resizing a single cell.
    pub resize_ratio: f32,
    /// Draw the overlay on top of the surface.
    pub x_ray: bool,
    /// Ignore handles hidden behind the surface.
    pub prevent_click_through: bool,
    /// Displacement weight per neighbour ring when dragging a cell.
    pub falloff_weights: Vec<f32>,
    /// Vertex pairs closer than `segment_size * factor` get a connection handle.
    pub connect_threshold_factor: f32,
    pub edit_mode: EditMode,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            segment_size: 0.5,
            align_distance: 0.5,
            hover_radius: 35.0,
            click_radius: 15.0,
            draw_offset: 0.005,
            resize_ratio: 1.1,
            x_ray: true,
            prevent_click_through: true,
            falloff_weights: vec![1.0, 0.6, 0.3],
            connect_threshold_factor: 0.75,
            edit_mode: EditMode::Create,
        }
    }
}

impl GridConfig {
    /// Clamps every field into its usable range.
    pub fn sanitized(mut self) -> Self {
        self.segment_size = self.segment_size.clamp(MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE);
        self.align_distance = self.align_distance.max(0.001);
        self.hover_radius = self.hover_radius.clamp(5.0, 100.0);
        self.click_radius = self.click_radius.clamp(2.0, 50.0);
        self.draw_offset = self.draw_offset.max(0.0);
        self.resize_ratio = self.resize_ratio.max(1.01);
        self.connect_threshold_factor = self.connect_threshold_factor.max(0.0);
        if self.falloff_weights.is_empty() {
            self.falloff_weights.push(1.0);
        }
        self
    }

    /// Steps the segment size used for new strips. `fine` uses a smaller step.
    pub fn nudge_segment_size(&mut self, grow: bool, fine: bool) {
        let step = if fine { 0.01 } else { 0.05 };
        let delta = if grow { step } else { -step };
        self.segment_size = (self.segment_size + delta).clamp(MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE);
    }

    pub fn connect_threshold(&self) -> f32 {
        self.segment_size * self.connect_threshold_factor
    }

    /// Deepest neighbour ring affected by a segment drag.
    pub fn falloff_depth(&self) -> usize {
        self.falloff_weights.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_clamps_ranges() {
        let config = GridConfig {
            segment_size: 50.0,
            hover_radius: 1.0,
            click_radius: 500.0,
            resize_ratio: 0.5,
            falloff_weights: Vec::new(),
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.segment_size, MAX_SEGMENT_SIZE);
        assert_eq!(config.hover_radius, 5.0);
        assert_eq!(config.click_radius, 50.0);
        assert_eq!(config.resize_ratio, 1.01);
        assert_eq!(config.falloff_weights, vec![1.0]);
    }

    #[test]
    fn nudge_stays_in_range() {
        let mut config = GridConfig {
            segment_size: 0.02,
            ..Default::default()
        };
        config.nudge_segment_size(false, false);
        assert_eq!(config.segment_size, MIN_SEGMENT_SIZE);
        config.nudge_segment_size(true, true);
        assert!((config.segment_size - 0.02).abs() < 1e-6);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: GridConfig = serde_json::from_str(r#"{ "segment_size": 0.25 }"#).unwrap();
        assert_eq!(config.segment_size, 0.25);
        assert_eq!(config.falloff_weights, vec![1.0, 0.6, 0.3]);
    }
}
