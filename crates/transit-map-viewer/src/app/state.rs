//! Application state management
//!
//! This module owns the transit map engine once the datasets are loaded, the
//! runtime UI settings and the intents the sidebar produces each frame.

use crate::app::settings::Settings;
use std::sync::Arc;
use tokio::sync::oneshot;
use transit_map_lib::{
    Direction, FitMode, GeometrySource, LoadedData, RenderConfig, SceneSurface, SearchDoc, Shape,
    SystemId, TransitMap, Trip, TrunkFilter,
};

/// Startup progress shown in the status line
#[derive(Clone, Debug, PartialEq)]
pub enum LoadStatus {
    Loading,
    /// Load finished; route count summary
    Ready(String),
    Failed(String),
}

impl LoadStatus {
    pub fn text(&self) -> String {
        match self {
            Self::Loading => "Cargando…".to_string(),
            Self::Ready(summary) => format!("Listo · {}", summary),
            Self::Failed(msg) => format!("Error al iniciar: {}", msg),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Sidebar tabs
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SidebarTab {
    Routes,
    Settings,
}

/// Available map tile providers
#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
pub enum TilesProvider {
    OpenStreetMap,
    OpenTopoMap,
}

impl TilesProvider {
    pub fn attribution(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "© OpenStreetMap contributors",
            Self::OpenTopoMap => "© OpenTopoMap (CC-BY-SA)",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::OpenStreetMap, Self::OpenTopoMap]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "OpenStreetMap",
            Self::OpenTopoMap => "OpenTopoMap",
        }
    }
}

/// UI-specific settings that can be adjusted at runtime
#[derive(Clone, Debug)]
pub struct UiSettings {
    /// Map tiles provider
    pub tiles_provider: TilesProvider,

    /// Whether sidebar is open
    pub sidebar_open: bool,

    /// Current active tab in sidebar
    pub active_tab: SidebarTab,

    /// Current search box text
    pub search_query: String,
}

/// A change requested from the sidebar, applied after the frame's UI pass
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    Leaf {
        system: SystemId,
        id: String,
        checked: bool,
    },
    Group {
        system: SystemId,
        key: String,
        checked: bool,
    },
    Direction {
        system: SystemId,
        id: String,
        direction: Direction,
    },
    Trip {
        id: String,
        trip: Trip,
    },
    Search(SearchDoc),
    ClearAll,
    SelectAll,
    ShowStops(bool),
    AutoFit(bool),
    TrunkFilter(TrunkFilter),
    LineWidth(f32),
}

impl Intent {
    /// Apply to the engine
    pub fn apply(self, map: &mut TransitMap<SceneSurface>) {
        match self {
            Intent::Leaf { system, id, checked } => {
                map.set_leaf(system, &id, checked, FitMode::Auto);
            }
            Intent::Group { system, key, checked } => {
                map.set_group(system, &key, checked, FitMode::Auto);
            }
            Intent::Direction { system, id, direction } => {
                map.select_direction(system, &id, direction);
            }
            Intent::Trip { id, trip } => {
                map.select_trip(&id, trip);
            }
            Intent::Search(doc) => {
                map.select_search_result(&doc);
            }
            Intent::ClearAll => {
                map.clear_all();
            }
            Intent::SelectAll => {
                map.select_all();
            }
            Intent::ShowStops(show) => map.set_show_stops(show),
            Intent::TrunkFilter(filter) => map.set_trunk_filter(filter),
            Intent::AutoFit(auto_fit) => {
                let config = RenderConfig {
                    auto_fit,
                    ..map.config().clone()
                };
                map.set_config(config);
            }
            Intent::LineWidth(width) => {
                if (map.config().line_weight - width).abs() > f32::EPSILON {
                    let config = RenderConfig {
                        line_weight: width,
                        ..map.config().clone()
                    };
                    map.set_config(config);
                }
            }
        }
    }
}

type LoadResult = Result<LoadedData, String>;

/// Main application state
pub struct AppState {
    /// Engine, present once the datasets are loaded
    pub map: Option<TransitMap<SceneSurface>>,

    pub status: LoadStatus,

    /// Current UI settings
    pub ui_settings: UiSettings,

    /// Render settings used when the engine is created
    config: RenderConfig,

    source: Arc<dyn GeometrySource>,

    pending_load: Option<oneshot::Receiver<LoadResult>>,

    /// Visible shapes, cached per surface revision
    shapes: Arc<Vec<Shape>>,
    shapes_revision: Option<u64>,
}

impl AppState {
    /// Create new application state from CLI settings
    pub fn new(settings: &Settings, source: Arc<dyn GeometrySource>) -> Self {
        let ui_settings = UiSettings {
            tiles_provider: settings.tiles,
            sidebar_open: true,
            active_tab: SidebarTab::Routes,
            search_query: String::new(),
        };

        Self {
            map: None,
            status: LoadStatus::Loading,
            ui_settings,
            config: settings.render_config(),
            source,
            pending_load: None,
            shapes: Arc::new(Vec::new()),
            shapes_revision: None,
        }
    }

    /// Start waiting for a load running elsewhere
    pub fn begin_load(&mut self) -> oneshot::Sender<LoadResult> {
        let (tx, rx) = oneshot::channel();
        self.pending_load = Some(rx);
        self.status = LoadStatus::Loading;
        tx
    }

    /// Pick up a finished load; returns true when the status changed
    pub fn poll_load(&mut self) -> bool {
        let Some(rx) = self.pending_load.as_mut() else {
            return false;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => Err("la carga se interrumpió".to_string()),
        };
        self.pending_load = None;
        match result {
            Ok(data) => self.finish_load(data),
            Err(msg) => {
                tracing::error!("Startup failed: {}", msg);
                self.status = LoadStatus::Failed(msg);
            }
        }
        true
    }

    /// Build the engine over loaded data
    pub fn finish_load(&mut self, data: LoadedData) {
        for warning in &data.report.warnings {
            tracing::warn!("{}", warning);
        }
        let summary = data.report.to_string();
        self.map = Some(TransitMap::new(
            SceneSurface::new(),
            self.config.clone(),
            data,
            self.source.clone(),
        ));
        tracing::info!("Loaded {}", summary);
        self.status = LoadStatus::Ready(summary);
    }

    /// Render settings currently in effect
    pub fn config(&self) -> &RenderConfig {
        match &self.map {
            Some(map) => map.config(),
            None => &self.config,
        }
    }

    /// Apply the intents collected during the UI pass
    pub fn apply(&mut self, intents: Vec<Intent>) {
        let Some(map) = self.map.as_mut() else {
            return;
        };
        for intent in intents {
            tracing::debug!("Applying {:?}", intent);
            intent.apply(map);
        }
    }

    /// Shapes to paint, rebuilt only when the surface changed
    pub fn shapes(&mut self) -> Arc<Vec<Shape>> {
        let Some(map) = &self.map else {
            return self.shapes.clone();
        };
        let revision = map.surface().revision();
        if self.shapes_revision != Some(revision) {
            profiling::scope!("collect_shapes");
            self.shapes = Arc::new(map.surface().visible_shapes().into_iter().cloned().collect());
            self.shapes_revision = Some(revision);
        }
        self.shapes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use futures::future::BoxFuture;
    use transit_map_lib::{MapError, SystemInputs, TraditionalDefinition, TraditionalGeometry, load_systems};

    struct NoSource;

    impl GeometrySource for NoSource {
        fn fetch(
            &self,
            definition: &TraditionalDefinition,
        ) -> BoxFuture<'static, transit_map_lib::Result<TraditionalGeometry>> {
            let id = definition.id.clone();
            Box::pin(async move { Err(MapError::MissingData(id)) })
        }
    }

    fn state() -> AppState {
        let settings = Settings::parse_from(["transit-map-viewer"]);
        AppState::new(&settings, Arc::new(NoSource))
    }

    fn metro_data() -> LoadedData {
        let metro = r##"{"lines": [
            {"id": "1", "name": "Villa El Salvador - Bayóvar", "color": "#00a650",
             "track": [[-76.97, -12.21], [-77.00, -12.10], [-77.01, -11.96]],
             "stations": [{"name": "Villa El Salvador", "lat": -12.21, "lon": -76.97}]},
            {"id": "2", "name": "Ate - Callao",
             "track": [[-76.90, -12.03], [-77.12, -12.05]], "stations": []}
        ]}"##;
        load_systems(&SystemInputs {
            metro: Some(metro.to_string()),
            ..SystemInputs::default()
        })
    }

    #[test]
    fn test_status_text() {
        assert_eq!(LoadStatus::Loading.text(), "Cargando…");
        assert_eq!(
            LoadStatus::Ready("2 rutas (Metro 2)".to_string()).text(),
            "Listo · 2 rutas (Metro 2)"
        );
        assert_eq!(LoadStatus::Failed("sin datos".to_string()).text(), "Error al iniciar: sin datos");
    }

    #[test]
    fn test_poll_load_builds_engine() {
        let mut state = state();
        let tx = state.begin_load();
        assert!(!state.poll_load());
        assert!(state.status.is_loading());

        tx.send(Ok(metro_data())).unwrap();
        assert!(state.poll_load());
        assert_eq!(state.status, LoadStatus::Ready("2 rutas (Metro 2)".to_string()));
        assert!(state.map.is_some());
        assert!(!state.poll_load());
    }

    #[test]
    fn test_dropped_loader_fails() {
        let mut state = state();
        drop(state.begin_load());
        assert!(state.poll_load());
        assert!(matches!(state.status, LoadStatus::Failed(_)));
        assert!(state.map.is_none());
    }

    #[test]
    fn test_intents_drive_engine_and_shape_cache() {
        let mut state = state();
        state.finish_load(metro_data());
        assert!(state.shapes().is_empty());

        state.apply(vec![Intent::Leaf {
            system: SystemId::Metro,
            id: "1".to_string(),
            checked: true,
        }]);
        let shapes = state.shapes();
        assert!(!shapes.is_empty());
        assert!(Arc::ptr_eq(&shapes, &state.shapes()));

        state.apply(vec![Intent::LineWidth(8.0), Intent::AutoFit(false)]);
        assert_eq!(state.config().line_weight, 8.0);
        assert!(!state.config().auto_fit);
        let map = state.map.as_ref().unwrap();
        assert!(map.tree(SystemId::Metro).unwrap().leaf("1").unwrap().checked);

        state.apply(vec![Intent::ClearAll]);
        assert!(state.shapes().is_empty());
    }
}
