//! Application module
//!
//! This module provides the main application structure:
//! - Full-screen map view drawing the checked transit layers
//! - Toggleable left sidebar with tabs (Routes and Settings)
//! - Background dataset loading and lazy traditional route builds on tokio

mod plugin;
pub(crate) mod settings;
pub(crate) mod state;
mod ui_panels;

use crate::app::plugin::TransitPlugin;
use crate::app::settings::Settings;
use crate::app::state::{AppState, TilesProvider};
use crate::data::DataDir;
use eframe::egui;
use geo::Rect;
use std::f64::consts::PI;
use std::sync::Arc;
use tokio::runtime::Handle;
use transit_map_lib::{FitPadding, FitRequest, GeometrySource, LoadedData, load_systems};
use walkers::{
    HttpTiles, Map, MapMemory, TileId,
    sources::{Attribution, OpenStreetMap, TileSource},
};

/// Initial camera: central Lima
const START_LAT: f64 = -12.0464;
const START_LON: f64 = -77.0428;
const START_ZOOM: f64 = 12.0;

/// Walkers tile edge in pixels
const TILE_SIZE: f64 = 256.0;

/// Custom OpenTopoMap tile source
pub struct OpenTopoMap;

impl TileSource for OpenTopoMap {
    fn tile_url(&self, tile_id: TileId) -> String {
        format!(
            "https://tile.opentopomap.org/{}/{}/{}.png",
            tile_id.zoom, tile_id.x, tile_id.y
        )
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "© OpenTopoMap (CC-BY-SA)",
            url: "https://opentopomap.org/",
            logo_light: None,
            logo_dark: None,
        }
    }

    fn max_zoom(&self) -> u8 {
        17 // OpenTopoMap has max zoom of 17
    }
}

/// Camera that shows `bounds` inside the padded part of `map_rect`
#[derive(Debug, Clone, Copy, PartialEq)]
struct CameraFit {
    lat: f64,
    lon: f64,
    zoom: f64,
}

fn mercator_y(lat: f64) -> f64 {
    (PI / 4.0 + lat.to_radians() / 2.0).tan().ln()
}

fn mercator_lat(y: f64) -> f64 {
    (2.0 * y.exp().atan() - PI / 2.0).to_degrees()
}

/// Zoom and center for a fit request
///
/// The padding is measured from the window edges, so the left pad shrinks by
/// however much of it the sidebar already covers.
fn camera_fit(bounds: Rect<f64>, padding: FitPadding, map_rect: egui::Rect) -> CameraFit {
    let left = (padding.top_left[0] - map_rect.min.x).max(0.0) as f64;
    let top = (padding.top_left[1] - map_rect.min.y).max(0.0) as f64;
    let right = padding.bottom_right[0] as f64;
    let bottom = padding.bottom_right[1] as f64;
    let width = (map_rect.width() as f64 - left - right).max(64.0);
    let height = (map_rect.height() as f64 - top - bottom).max(64.0);

    let lon_span = bounds.width();
    let (y_min, y_max) = (mercator_y(bounds.min().y), mercator_y(bounds.max().y));
    let y_span = (y_max - y_min).abs();

    let zoom_x = if lon_span > 0.0 {
        (width * 360.0 / (TILE_SIZE * lon_span)).log2()
    } else {
        f64::INFINITY
    };
    let zoom_y = if y_span > 0.0 {
        (height * 2.0 * PI / (TILE_SIZE * y_span)).log2()
    } else {
        f64::INFINITY
    };
    let zoom = zoom_x.min(zoom_y);
    let zoom = if zoom.is_finite() { zoom.clamp(1.0, 18.0) } else { 16.0 };

    let world = TILE_SIZE * zoom.exp2();
    let dx = (left - right) / 2.0;
    let dy = (top - bottom) / 2.0;
    let lon = bounds.center().x - dx * 360.0 / world;
    let lat = mercator_lat((y_min + y_max) / 2.0 + dy * 2.0 * PI / world);
    CameraFit { lat, lon, zoom }
}

/// Read every dataset, then normalize them off the async workers
async fn load_data(dir: DataDir) -> Result<LoadedData, String> {
    let inputs = dir
        .read_inputs()
        .await
        .map_err(|e| format!("{}: {}", dir.root().display(), e))?;
    tokio::task::spawn_blocking(move || load_systems(&inputs))
        .await
        .map_err(|e| e.to_string())
}

/// Main application structure
pub struct TransitMapViewerApp {
    /// Application state (engine, UI settings, etc.)
    state: AppState,

    /// Map tiles provider (OpenStreetMap)
    tiles_osm: HttpTiles,

    /// Map tiles provider (OpenTopoMap)
    tiles_otm: HttpTiles,

    /// Map state (camera position, zoom, etc.)
    map_memory: MapMemory,

    /// Runtime driving dataset reads and lazy builds
    runtime: Handle,
}

impl TransitMapViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: Settings, runtime: Handle) -> Self {
        let data_dir = DataDir::new(&settings.data_dir);
        let source: Arc<dyn GeometrySource> = Arc::new(data_dir.geometry_source());
        let mut state = AppState::new(&settings, source);

        let tx = state.begin_load();
        let ctx = cc.egui_ctx.clone();
        tracing::info!("Loading datasets from {}", data_dir.root().display());
        runtime.spawn(async move {
            let result = load_data(data_dir).await;
            if tx.send(result).is_err() {
                tracing::debug!("Viewer closed before the datasets finished loading");
            }
            ctx.request_repaint();
        });

        let tiles_osm = HttpTiles::new(OpenStreetMap, cc.egui_ctx.clone());
        let tiles_otm = HttpTiles::new(OpenTopoMap, cc.egui_ctx.clone());

        let mut map_memory = MapMemory::default();
        map_memory.center_at(walkers::lat_lon(START_LAT, START_LON));
        if let Err(e) = map_memory.set_zoom(START_ZOOM) {
            tracing::warn!("Could not set initial zoom: {:?}", e);
        }

        Self {
            state,
            tiles_osm,
            tiles_otm,
            map_memory,
            runtime,
        }
    }

    /// Hand queued lazy builds to the runtime and install finished ones
    fn drive_builds(&mut self, ctx: &egui::Context) {
        let Some(map) = self.state.map.as_mut() else {
            return;
        };
        for build in map.take_build_futures() {
            let ctx = ctx.clone();
            self.runtime.spawn(async move {
                build.await;
                ctx.request_repaint();
            });
        }
        let installed = map.flush_builds();
        if installed > 0 {
            tracing::debug!("Installed {} traditional routes", installed);
        }
    }

    fn take_fit_request(&mut self) -> Option<FitRequest> {
        self.state.map.as_mut()?.surface_mut().take_fit_request()
    }

    fn apply_fit(&mut self, request: FitRequest, map_rect: egui::Rect) {
        let fit = camera_fit(request.bounds, request.padding, map_rect);
        self.map_memory.center_at(walkers::lat_lon(fit.lat, fit.lon));
        if let Err(e) = self.map_memory.set_zoom(fit.zoom) {
            tracing::debug!("Zoom {:.1} rejected: {:?}", fit.zoom, e);
        }
        tracing::trace!(
            "Fitted camera to ({:.4}, {:.4}), zoom: {:.1}",
            fit.lat,
            fit.lon,
            fit.zoom
        );
    }
}

#[profiling::all_functions]
impl eframe::App for TransitMapViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.state.poll_load() {
            ctx.request_repaint();
        }

        let intents = ui_panels::render_sidebar(ctx, &mut self.state);
        self.state.apply(intents);
        self.drive_builds(ctx);
        let fit_request = self.take_fit_request();

        let shapes = self.state.shapes();
        let tiles_provider = self.state.ui_settings.tiles_provider;
        let attribution_text = tiles_provider.attribution();

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                profiling::scope!("map_panel");

                if let Some(request) = fit_request {
                    self.apply_fit(request, ui.max_rect());
                }

                let tiles: &mut HttpTiles = match tiles_provider {
                    TilesProvider::OpenStreetMap => &mut self.tiles_osm,
                    TilesProvider::OpenTopoMap => &mut self.tiles_otm,
                };

                let map = Map::new(
                    Some(tiles),
                    &mut self.map_memory,
                    walkers::lat_lon(START_LAT, START_LON),
                )
                .with_plugin(TransitPlugin::new(shapes));

                ui.add(map);

                ui_panels::sidebar_toggle_button(ui, &mut self.state);

                let painter = ui.painter();
                let screen_rect = ui.max_rect();
                painter.text(
                    screen_rect.center_bottom() + egui::vec2(0.0, -5.0),
                    egui::Align2::CENTER_BOTTOM,
                    attribution_text,
                    egui::FontId::proportional(10.0),
                    egui::Color32::from_black_alpha(180),
                );
            });

        if self.state.map.as_ref().is_some_and(|m| m.has_pending_builds()) {
            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn bounds() -> Rect<f64> {
        Rect::new(Coord { x: -77.10, y: -12.10 }, Coord { x: -77.00, y: -12.00 })
    }

    #[test]
    fn test_mercator_round_trip() {
        for lat in [-60.0, -12.05, 0.0, 45.0] {
            assert!((mercator_lat(mercator_y(lat)) - lat).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fit_without_padding_centers_bounds() {
        let rect = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(800.0, 800.0));
        let padding = FitPadding {
            top_left: [0.0, 0.0],
            bottom_right: [0.0, 0.0],
        };
        let fit = camera_fit(bounds(), padding, rect);
        assert!((fit.lon - -77.05).abs() < 1e-9);
        assert!((fit.lat - -12.05).abs() < 1e-3);
        // 0.1 degrees across 800 px
        assert!(fit.zoom > 13.0 && fit.zoom < 14.0, "zoom {}", fit.zoom);
    }

    #[test]
    fn test_sidebar_padding_shifts_center_west() {
        let padding = FitPadding::with_sidebar(380.0);
        let full = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(1280.0, 800.0));
        let fit = camera_fit(bounds(), padding, full);
        // geometry sits right of the sidebar, so the camera looks west of it
        assert!(fit.lon < -77.05);

        // with the sidebar beside the map, only the margin remains on the left
        let beside = egui::Rect::from_min_max(egui::pos2(380.0, 0.0), egui::pos2(1280.0, 800.0));
        let fit_beside = camera_fit(bounds(), padding, beside);
        assert!(fit_beside.lon > fit.lon);
        assert!(fit_beside.zoom >= fit.zoom);
    }

    #[test]
    fn test_point_bounds_use_fixed_zoom() {
        let point = Rect::new(Coord { x: -77.0, y: -12.0 }, Coord { x: -77.0, y: -12.0 });
        let rect = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(800.0, 600.0));
        let padding = FitPadding::with_sidebar(0.0);
        let fit = camera_fit(point, padding, rect);
        assert_eq!(fit.zoom, 16.0);
    }
}
