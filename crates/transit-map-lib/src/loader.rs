//! Dataset loader
//!
//! Every system normalizes independently on the rayon pool. A system whose
//! dataset is missing or malformed is loaded empty and noted in the
//! [`LoadReport`]; the other systems are unaffected.

use crate::catalog::{Catalog, CorridorTypes};
use crate::ids::SystemId;
use crate::labels::Labeler;
use crate::model::{MacroTable, Route, RouteKind, RouteShape, TraditionalDefinition};
use crate::normalize::{self, NormalizedSystem, TrunkDocument};
use crate::registry::{RouteRegistry, SystemRegistry};
use crate::traditional::{self, DisplayEntry};
use crate::{MapError, Result, color};
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;

/// Raw documents of every dataset, as read by the host
#[derive(Debug, Clone, Default)]
pub struct SystemInputs {
    /// Trunk stations and services
    pub trunk: Option<String>,
    /// Shared trunk backbone polylines
    pub trunk_macros: Option<String>,
    pub feeders: Option<String>,
    pub corridors: Option<String>,
    pub metro: Option<String>,
    /// Traditional route map
    pub route_map: Option<String>,
    pub catalog: Option<String>,
    /// Route metadata table (CSV)
    pub metadata_csv: Option<String>,
    /// First/last stop names per traditional route
    pub extremes: Option<String>,
    pub corridor_types: Option<String>,
}

/// Outcome of loading one system
#[derive(Debug, Clone, PartialEq)]
pub struct SystemLoad {
    pub system: SystemId,
    pub routes: usize,
    pub stops: usize,
    pub skipped: usize,
    /// Why the system is degraded, if it is
    pub error: Option<String>,
}

/// Per-system counts and warnings of a load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub systems: Vec<SystemLoad>,
    /// Problems with auxiliary documents (catalog, labels)
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn total_routes(&self) -> usize {
        self.systems.iter().map(|s| s.routes).sum()
    }

    pub fn system(&self, system: SystemId) -> Option<&SystemLoad> {
        self.systems.iter().find(|s| s.system == system)
    }

    pub fn degraded(&self) -> impl Iterator<Item = &SystemLoad> {
        self.systems.iter().filter(|s| s.error.is_some())
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = self
            .systems
            .iter()
            .filter(|s| s.routes > 0)
            .map(|s| format!("{} {}", s.system.label(), s.routes))
            .collect();
        write!(f, "{} rutas", self.total_routes())?;
        if !counts.is_empty() {
            write!(f, " ({})", counts.join(", "))?;
        }
        Ok(())
    }
}

/// Everything the engine needs, built from [`SystemInputs`]
#[derive(Debug, Clone, Default)]
pub struct LoadedData {
    pub registry: RouteRegistry,
    pub catalog: Catalog,
    pub corridor_types: CorridorTypes,
    /// Physical traditional routes
    pub definitions: Vec<TraditionalDefinition>,
    /// Traditional routes as listed in the sidebar
    pub entries: Vec<DisplayEntry>,
    pub labeler: Labeler,
    pub report: LoadReport,
}

fn missing(what: &str) -> MapError {
    MapError::MissingData(format!("{} dataset not found", what))
}

fn normalize_system(system: SystemId, inputs: &SystemInputs, catalog: &Catalog) -> Result<NormalizedSystem> {
    #[cfg(feature = "profiling")]
    profiling::scope!("loader::normalize_system");
    match system {
        SystemId::Trunk => {
            let doc = TrunkDocument::parse(inputs.trunk.as_deref().ok_or_else(|| missing("trunk"))?)?;
            // the backbone is optional: routes fall back to stop-to-stop lines
            let macros = match inputs.trunk_macros.as_deref().map(normalize::parse_macros) {
                Some(Ok(macros)) => macros,
                Some(Err(e)) => {
                    tracing::warn!("Ignoring trunk macro segments: {}", e);
                    MacroTable::new()
                }
                None => MacroTable::new(),
            };
            Ok(normalize::normalize_trunk(doc, macros))
        }
        SystemId::Feeder => {
            let fc = normalize::parse_feature_collection(
                inputs.feeders.as_deref().ok_or_else(|| missing("feeder"))?,
            )?;
            Ok(normalize::normalize_feeder(&fc))
        }
        SystemId::Corridor => {
            let fc = normalize::parse_feature_collection(
                inputs.corridors.as_deref().ok_or_else(|| missing("corridor"))?,
            )?;
            Ok(normalize::normalize_corridor(&fc, catalog))
        }
        SystemId::Metro => normalize::normalize_metro(inputs.metro.as_deref().ok_or_else(|| missing("metro"))?),
        SystemId::Traditional => {
            let definitions = traditional::parse_route_map(
                inputs.route_map.as_deref().ok_or_else(|| missing("traditional"))?,
            )?;
            Ok(NormalizedSystem {
                routes: definitions.into_iter().map(deferred_route).collect(),
                ..NormalizedSystem::default()
            })
        }
    }
}

/// Registry record of a traditional route; geometry is built on first display
fn deferred_route(definition: TraditionalDefinition) -> Route {
    Route {
        id: definition.id.clone(),
        name: definition.name.clone(),
        color: color::resolve(definition.color.as_deref(), None, &definition.id),
        kind: RouteKind::Traditional,
        shape: RouteShape::Deferred(definition),
        stops: Vec::new(),
    }
}

/// Auxiliary document parse; failures become report warnings
fn auxiliary<T>(name: &str, input: Option<&str>, warnings: &mut Vec<String>, parse: impl FnOnce(&str) -> Result<T>) -> Option<T> {
    match parse(input?) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", name, e);
            warnings.push(format!("{}: {}", name, e));
            None
        }
    }
}

/// Load and normalize every dataset
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn load_systems(inputs: &SystemInputs) -> LoadedData {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let catalog = auxiliary("catalog", inputs.catalog.as_deref(), &mut warnings, Catalog::parse)
        .unwrap_or_default();
    let corridor_types = auxiliary(
        "corridor types",
        inputs.corridor_types.as_deref(),
        &mut warnings,
        CorridorTypes::parse,
    )
    .unwrap_or_default();
    let mut labeler = Labeler::new();
    if let Some(with_metadata) = auxiliary(
        "route metadata",
        inputs.metadata_csv.as_deref(),
        &mut warnings,
        |data| labeler.clone().with_metadata_csv(data),
    ) {
        labeler = with_metadata;
    }
    if let Some(with_extremes) = auxiliary(
        "route extremes",
        inputs.extremes.as_deref(),
        &mut warnings,
        |data| labeler.clone().with_extremes_json(data),
    ) {
        labeler = with_extremes;
    }

    let results: Vec<(SystemId, Result<NormalizedSystem>)> = SystemId::ALL
        .par_iter()
        .map(|&system| (system, normalize_system(system, inputs, &catalog)))
        .collect();

    let mut registry = RouteRegistry::new();
    let mut systems = Vec::with_capacity(results.len());
    let mut definitions = Vec::new();
    for (system, result) in results {
        let (mut data, error) = match result {
            Ok(data) => (data, None),
            Err(e) => {
                tracing::warn!("{} routes unavailable: {}", system.label(), e);
                (NormalizedSystem::default(), Some(e.to_string()))
            }
        };
        if system == SystemId::Traditional {
            definitions = data
                .routes
                .iter()
                .filter_map(|r| match &r.shape {
                    RouteShape::Deferred(def) => Some(def.clone()),
                    _ => None,
                })
                .collect();
        } else {
            data.routes = catalog.filter_routes(data.routes);
        }
        let skipped = data.skipped;
        let loaded = SystemRegistry::from_normalized(system, data);
        tracing::debug!(
            "Loaded {}: {} routes, {} stops, {} skipped features",
            system,
            loaded.len(),
            loaded.stop_count(),
            skipped
        );
        systems.push(SystemLoad {
            system,
            routes: loaded.len(),
            stops: loaded.stop_count(),
            skipped,
            error,
        });
        registry.insert_system(loaded);
    }

    let entries = traditional::display_entries(&definitions);
    let report = LoadReport { systems, warnings };
    tracing::info!("Loaded {} in {:?}", report, start.elapsed());

    LoadedData {
        registry,
        catalog,
        corridor_types,
        definitions,
        entries,
        labeler,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNK: &str = r#"{
        "stations": [
            {"id": 1, "name": "Naranjal", "lat": -11.98, "lon": -77.06},
            {"id": 2, "name": "Central", "lat": -12.06, "lon": -77.04}
        ],
        "services": [
            {"id": "A", "name": "Ruta A", "kind": "regular", "stops": [1, 2]},
            {"id": "X1", "name": "Expreso 1", "kind": "expreso", "north_south": [1, 2], "south_north": [2, 1]}
        ]
    }"#;

    const CORRIDORS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"ref": "201"},
             "geometry": {"type": "LineString", "coordinates": [[-77.0, -12.0], [-77.1, -12.1]]}},
            {"type": "Feature", "properties": {"ref": "209"},
             "geometry": {"type": "LineString", "coordinates": [[-77.0, -12.0], [-77.2, -12.2]]}}
        ]
    }"#;

    const ROUTE_MAP: &str = r##"{"routes": {
        "1244-ida": {"name": "Bayóvar - Callao"},
        "1244-vuelta": {"name": "Callao - Bayóvar"},
        "ET01": {"color": "#112233"}
    }}"##;

    fn inputs() -> SystemInputs {
        SystemInputs {
            trunk: Some(TRUNK.to_string()),
            corridors: Some(CORRIDORS.to_string()),
            route_map: Some(ROUTE_MAP.to_string()),
            ..SystemInputs::default()
        }
    }

    #[test]
    fn test_load_all_systems() {
        let data = load_systems(&inputs());

        assert_eq!(data.registry.route(SystemId::Trunk, "x1").map(|r| r.kind), Some(RouteKind::TrunkExpress));
        assert_eq!(data.registry.system(SystemId::Corridor).map(SystemRegistry::len), Some(2));
        assert_eq!(data.definitions.len(), 3);
        let ids: Vec<&str> = data.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1244", "ET01"]);
        assert_eq!(data.report.system(SystemId::Traditional).map(|s| s.routes), Some(3));
        assert_eq!(data.report.total_routes(), 7);
    }

    #[test]
    fn test_missing_and_broken_datasets_degrade_one_system() {
        let inputs = SystemInputs {
            metro: Some("{not json".to_string()),
            ..inputs()
        };
        let data = load_systems(&inputs);

        let degraded: Vec<SystemId> = data.report.degraded().map(|s| s.system).collect();
        assert_eq!(degraded, vec![SystemId::Feeder, SystemId::Metro]);
        assert!(data.registry.system(SystemId::Metro).is_some_and(SystemRegistry::is_empty));
        assert_eq!(data.registry.system(SystemId::Trunk).map(SystemRegistry::len), Some(2));
    }

    #[test]
    fn test_catalog_filters_routes() {
        let inputs = SystemInputs {
            catalog: Some(r#"{"corredores": {"exclude": ["209"]}}"#.to_string()),
            ..inputs()
        };
        let data = load_systems(&inputs);
        assert!(data.registry.route(SystemId::Corridor, "201").is_some());
        assert!(data.registry.route(SystemId::Corridor, "209").is_none());
        assert!(data.report.warnings.is_empty());
    }

    #[test]
    fn test_bad_catalog_is_a_warning() {
        let inputs = SystemInputs {
            catalog: Some("[".to_string()),
            ..inputs()
        };
        let data = load_systems(&inputs);
        assert_eq!(data.report.warnings.len(), 1);
        assert!(data.report.warnings[0].starts_with("catalog"));
        assert_eq!(data.registry.system(SystemId::Corridor).map(SystemRegistry::len), Some(2));
    }

    #[test]
    fn test_report_display() {
        let report = LoadReport {
            systems: vec![
                SystemLoad {
                    system: SystemId::Metro,
                    routes: 2,
                    stops: 10,
                    skipped: 0,
                    error: None,
                },
                SystemLoad {
                    system: SystemId::Feeder,
                    routes: 0,
                    stops: 0,
                    skipped: 0,
                    error: Some("missing".to_string()),
                },
            ],
            warnings: Vec::new(),
        };
        assert_eq!(report.to_string(), "2 rutas (Metro 2)");
    }
}
