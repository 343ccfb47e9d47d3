use crate::app::state::TilesProvider;
use clap::Parser;
use std::path::PathBuf;
use transit_map_lib::RenderConfig;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Transit Map Viewer - Interactive map of Lima's public transit systems
pub struct Settings {
    /// Directory holding the static transit datasets
    #[clap(short, long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Start with stop markers hidden
    #[clap(long, default_value = "false")]
    pub hide_stops: bool,

    /// Do not move the camera when a route is checked
    #[clap(long, default_value = "false")]
    pub no_auto_fit: bool,

    /// Route line width in pixels
    #[clap(long, default_value = "4.0")]
    pub line_width: f32,

    /// Sidebar width in pixels
    #[clap(long, default_value = "380")]
    pub sidebar_width: f32,

    /// Map tiles provider
    #[clap(long, value_enum, default_value = "open-street-map")]
    pub tiles: TilesProvider,
}

impl Settings {
    /// Engine render settings derived from the command line
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            show_stops: !self.hide_stops,
            auto_fit: !self.no_auto_fit,
            sidebar_width_px: self.sidebar_width.max(0.0),
            line_weight: self.line_width.clamp(0.5, 20.0),
            ..RenderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_render_config() {
        let settings = Settings::parse_from(["transit-map-viewer"]);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.tiles, TilesProvider::OpenStreetMap);

        let config = settings.render_config();
        let defaults = RenderConfig::default();
        assert_eq!(config.show_stops, defaults.show_stops);
        assert_eq!(config.auto_fit, defaults.auto_fit);
        assert_eq!(config.sidebar_width_px, defaults.sidebar_width_px);
        assert_eq!(config.line_weight, defaults.line_weight);
    }

    #[test]
    fn test_flags_map_onto_render_config() {
        let settings = Settings::parse_from([
            "transit-map-viewer",
            "--data-dir",
            "/srv/lima",
            "--hide-stops",
            "--no-auto-fit",
            "--line-width",
            "100",
            "--sidebar-width",
            "300",
            "--tiles",
            "open-topo-map",
        ]);
        assert_eq!(settings.data_dir, PathBuf::from("/srv/lima"));
        assert_eq!(settings.tiles, TilesProvider::OpenTopoMap);

        let config = settings.render_config();
        assert!(!config.show_stops);
        assert!(!config.auto_fit);
        assert_eq!(config.sidebar_width_px, 300.0);
        assert_eq!(config.line_weight, 20.0);
    }
}
