use serde::{Deserialize, Serialize};

/// Global legacy direction filter applied to trunk routes shown in both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrunkFilter {
    /// Draw both backbones
    #[default]
    Both,
    /// Only the north→south backbone
    NorthSouth,
    /// Only the south→north backbone
    SouthNorth,
}

impl TrunkFilter {
    pub fn allows_north_south(self) -> bool {
        matches!(self, TrunkFilter::Both | TrunkFilter::NorthSouth)
    }

    pub fn allows_south_north(self) -> bool {
        matches!(self, TrunkFilter::Both | TrunkFilter::SouthNorth)
    }
}

/// Configuration for rendering and camera behavior
///
/// Values mirror what a user can change at runtime in the settings panel; the
/// engine reads them on every render call so changes apply to the next redraw.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Draw stop markers alongside route lines
    pub show_stops: bool,
    /// Move the camera to newly shown routes (non-silent toggles only)
    pub auto_fit: bool,
    /// Sidebar width in pixels, reserved on the left when fitting the camera
    pub sidebar_width_px: f32,
    /// Relative padding added around fitted bounds
    pub fit_pad_ratio: f64,
    /// Line width for trunk, feeder, corridor and metro routes
    pub line_weight: f32,
    /// Line opacity for trunk, feeder, corridor and metro routes
    pub line_opacity: f32,
    /// Line width for traditional routes
    pub traditional_line_weight: f32,
    /// Line opacity for traditional routes
    pub traditional_line_opacity: f32,
    /// Trunk routes drawn above every other trunk route
    pub priority_trunk_routes: Vec<String>,
    /// Global backbone filter for trunk routes shown in both directions
    pub trunk_filter: TrunkFilter,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            show_stops: true,
            auto_fit: true,
            sidebar_width_px: 380.0,
            fit_pad_ratio: 0.04,
            line_weight: 4.0,
            line_opacity: 0.95,
            traditional_line_weight: 5.0,
            traditional_line_opacity: 0.9,
            priority_trunk_routes: vec!["A".to_string(), "C".to_string()],
            trunk_filter: TrunkFilter::Both,
        }
    }
}

impl RenderConfig {
    /// Whether a trunk route id is drawn on the priority pane
    pub fn is_priority_trunk(&self, id: &str) -> bool {
        self.priority_trunk_routes
            .iter()
            .any(|p| p.eq_ignore_ascii_case(id.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert!(config.show_stops);
        assert!(config.auto_fit);
        assert_eq!(config.sidebar_width_px, 380.0);
        assert!(config.is_priority_trunk("a"));
        assert!(config.is_priority_trunk("C"));
        assert!(!config.is_priority_trunk("B"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{"show_stops": false}"#).unwrap();
        assert!(!config.show_stops);
        assert_eq!(config.line_weight, 4.0);
        assert_eq!(config.trunk_filter, TrunkFilter::Both);
    }

    #[test]
    fn test_trunk_filter() {
        assert!(TrunkFilter::Both.allows_north_south());
        assert!(TrunkFilter::Both.allows_south_north());
        assert!(!TrunkFilter::NorthSouth.allows_south_north());
        assert!(!TrunkFilter::SouthNorth.allows_north_south());
    }
}
