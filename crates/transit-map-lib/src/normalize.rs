//! Geometry Normalizer - raw datasets into routes and stops
//!
//! Each transit system ships its data in a different shape: GeoJSON feature
//! collections with free-form property bags (feeders, corridors, metro), or
//! pre-structured JSON documents (trunk services, metro lines). Everything ends up
//! as [`Route`] and [`Stop`] records keyed by uppercase route id.
//!
//! Property names vary between datasets, so every field is read through
//! [`first_prop`], an ordered list of candidate keys where the first non-empty
//! value wins.

use crate::catalog::Catalog;
use crate::color::{self, Rgb};
use crate::ids::{Direction, SystemId, normalize_id};
use crate::model::{
    MacroDefinition, MacroTable, Polyline, Route, RouteKind, RouteShape, Stop, Zone,
};
use crate::{MapError, Result};
use geo::{Coord, LineString};
use geojson::{FeatureCollection, GeoJson, JsonObject};
use serde::Deserialize;
use std::collections::HashMap;

/// Latitude delta (degrees) below which a segment counts as flat
pub const FLAT_THRESHOLD_DEG: f64 = 0.0005;

const FEEDER_NORTH_COLOR: Rgb = Rgb::new(0xff, 0x45, 0x00);
const FEEDER_SOUTH_COLOR: Rgb = Rgb::new(0xff, 0xcd, 0x00);
const METRO_DEFAULT_COLOR: Rgb = Rgb::new(0x0e, 0xa5, 0xe9);

const FEEDER_REF_KEYS: &[&str] = &["ref_norm", "ref", "code", "id"];
const CORRIDOR_REF_KEYS: &[&str] = &["ref", "route", "id", "code", "codigo"];
const METRO_REF_KEYS: &[&str] = &["ref", "line", "id", "codigo", "code"];
const NAME_KEYS: &[&str] = &["name", "label"];
const COLOR_KEYS: &[&str] = &["stroke", "color"];
const DIRECTION_KEYS: &[&str] = &["dir", "direction", "oneway", "sentido"];

/// Routes and stops of one system after normalization
#[derive(Debug, Clone, Default)]
pub struct NormalizedSystem {
    pub routes: Vec<Route>,
    pub stops: HashMap<String, Stop>,
    /// Shared backbone definitions (trunk only)
    pub macros: MacroTable,
    /// Features skipped because no reference code could be resolved
    pub skipped: usize,
}

/// First non-empty value among candidate property keys, as a string
pub fn first_prop(props: &JsonObject, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match props.get(*key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Parse a GeoJSON document into a feature collection
///
/// A lone feature is accepted as a one-feature collection.
pub fn parse_feature_collection(json: &str) -> Result<FeatureCollection> {
    match json.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(MapError::MissingData(
            "expected a feature collection, found a bare geometry".to_string(),
        )),
    }
}

fn position_to_coord(position: &[f64]) -> Option<Coord<f64>> {
    match position {
        [lon, lat, ..] if lon.is_finite() && lat.is_finite() => Some(Coord { x: *lon, y: *lat }),
        _ => None,
    }
}

fn positions_to_line(positions: &[Vec<f64>]) -> Polyline {
    LineString::new(positions.iter().filter_map(|p| position_to_coord(p)).collect())
}

/// Line segments of a geometry, `[lon, lat]` positions into geo coordinates
///
/// Non-line geometries yield nothing; segments shorter than two points are dropped.
pub fn to_segments(value: &geojson::Value) -> Vec<Polyline> {
    let lines = match value {
        geojson::Value::LineString(positions) => vec![positions_to_line(positions)],
        geojson::Value::MultiLineString(parts) => {
            parts.iter().map(|p| positions_to_line(p)).collect()
        }
        _ => Vec::new(),
    };
    lines.into_iter().filter(|l| l.0.len() >= 2).collect()
}

/// Point coordinate of a geometry, if it is a point
pub fn to_point(value: &geojson::Value) -> Option<Coord<f64>> {
    match value {
        geojson::Value::Point(position) => position_to_coord(position),
        _ => None,
    }
}

/// Explicit travel direction from a property bag (`norte`/`n`, `sur`/`s`)
///
/// Values naming both directions, or neither, are not a direction.
pub fn direction_from_props(props: &JsonObject) -> Option<Direction> {
    let raw = first_prop(props, DIRECTION_KEYS)?.to_lowercase();
    let tokens: Vec<&str> = raw
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| !t.is_empty())
        .collect();
    let north = tokens.iter().any(|t| matches!(*t, "n" | "norte"));
    let south = tokens.iter().any(|t| matches!(*t, "s" | "sur"));
    match (north, south) {
        (true, false) => Some(Direction::North),
        (false, true) => Some(Direction::South),
        _ => None,
    }
}

/// Segments split by the latitude delta between their endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedSegments {
    pub north: Vec<Polyline>,
    pub south: Vec<Polyline>,
    pub flat: Vec<Polyline>,
}

/// Classify segments as northbound, southbound or flat
pub fn classify_segments(segments: &[Polyline]) -> ClassifiedSegments {
    let mut out = ClassifiedSegments::default();
    for segment in segments {
        let (Some(first), Some(last)) = (segment.0.first(), segment.0.last()) else {
            continue;
        };
        if segment.0.len() < 2 {
            continue;
        }
        let d_lat = last.y - first.y;
        if d_lat.abs() < FLAT_THRESHOLD_DEG {
            out.flat.push(segment.clone());
        } else if d_lat > 0.0 {
            out.north.push(segment.clone());
        } else {
            out.south.push(segment.clone());
        }
    }
    out
}

/// Route under construction, keyed by uppercase reference
struct RouteDraft {
    id: String,
    name: String,
    color: Option<String>,
    undirected: Vec<Polyline>,
    north: Vec<Polyline>,
    south: Vec<Polyline>,
    stops: Vec<String>,
}

impl RouteDraft {
    fn new(id: String) -> Self {
        Self {
            id,
            name: String::new(),
            color: None,
            undirected: Vec::new(),
            north: Vec::new(),
            south: Vec::new(),
            stops: Vec::new(),
        }
    }

    /// Fill name and color from the first feature that has them
    fn absorb_props(&mut self, props: &JsonObject) {
        if self.name.is_empty()
            && let Some(name) = first_prop(props, NAME_KEYS)
        {
            self.name = name;
        }
        if self.color.is_none() {
            self.color = first_prop(props, COLOR_KEYS).filter(|c| color::parse_css(c).is_some());
        }
    }
}

/// Group features by resolved reference, preserving first-seen order
struct DraftSet {
    order: Vec<String>,
    drafts: HashMap<String, RouteDraft>,
    stops: HashMap<String, Stop>,
    skipped: usize,
}

impl DraftSet {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            drafts: HashMap::new(),
            stops: HashMap::new(),
            skipped: 0,
        }
    }

    fn draft(&mut self, reference: &str) -> &mut RouteDraft {
        let id = normalize_id(reference);
        if !self.drafts.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.drafts
            .entry(id.clone())
            .or_insert_with(|| RouteDraft::new(id))
    }

    /// Absorb a feature collection, routing each feature to its reference
    fn absorb(
        &mut self,
        fc: &FeatureCollection,
        system: SystemId,
        ref_keys: &[&str],
        default_stop_name: &str,
        tag_directions: bool,
    ) {
        let empty = JsonObject::new();
        for feature in &fc.features {
            let props = feature.properties.as_ref().unwrap_or(&empty);
            let Some(reference) = first_prop(props, ref_keys) else {
                self.skipped += 1;
                continue;
            };
            let Some(geometry) = feature.geometry.as_ref() else {
                continue;
            };

            let segments = to_segments(&geometry.value);
            if !segments.is_empty() {
                let direction = if tag_directions {
                    direction_from_props(props)
                } else {
                    None
                };
                let draft = self.draft(&reference);
                draft.absorb_props(props);
                match direction {
                    Some(Direction::North) => draft.north.extend(segments),
                    Some(Direction::South) => draft.south.extend(segments),
                    _ => draft.undirected.extend(segments),
                }
            } else if let Some(point) = to_point(&geometry.value) {
                let draft = self.draft(&reference);
                draft.absorb_props(props);
                let stop_id = format!("{}:{}:{}", system.tag(), draft.id, draft.stops.len());
                let name = first_prop(props, NAME_KEYS).unwrap_or_else(|| default_stop_name.to_string());
                draft.stops.push(stop_id.clone());
                self.stops
                    .insert(stop_id.clone(), Stop::new(stop_id, name, point.y, point.x));
            }
        }
    }

    fn into_drafts(mut self) -> (Vec<RouteDraft>, HashMap<String, Stop>, usize) {
        let drafts = self
            .order
            .iter()
            .filter_map(|id| self.drafts.remove(id))
            .collect();
        (drafts, self.stops, self.skipped)
    }
}

/// Normalize the feeder feature collection
///
/// Zone comes from the `AN` code prefix. When no segment of a route carries an
/// explicit direction, its segments are classified by latitude delta.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn normalize_feeder(fc: &FeatureCollection) -> NormalizedSystem {
    let mut set = DraftSet::new();
    set.absorb(fc, SystemId::Feeder, FEEDER_REF_KEYS, "Paradero", true);
    let (drafts, stops, skipped) = set.into_drafts();

    let routes = drafts
        .into_iter()
        .map(|mut draft| {
            let zone = if draft.id.starts_with("AN") {
                Zone::North
            } else {
                Zone::South
            };
            if draft.north.is_empty() && draft.south.is_empty() && !draft.undirected.is_empty() {
                let classified = classify_segments(&draft.undirected);
                draft.north = [classified.north, classified.flat.clone()].concat();
                draft.south = [classified.south, classified.flat].concat();
            }
            let zone_color = match zone {
                Zone::North => FEEDER_NORTH_COLOR,
                Zone::South => FEEDER_SOUTH_COLOR,
            };
            Route {
                color: color::resolve(draft.color.as_deref(), Some(zone_color), &draft.id),
                name: draft.name,
                kind: RouteKind::Feeder(zone),
                shape: RouteShape::Classified {
                    undirected: draft.undirected,
                    north: draft.north,
                    south: draft.south,
                },
                stops: draft.stops,
                id: draft.id,
            }
        })
        .collect();

    NormalizedSystem {
        routes,
        stops,
        macros: MacroTable::new(),
        skipped,
    }
}

/// Normalize the corridor feature collection
///
/// Features without a reference are counted in `skipped`. Color falls back to the
/// corridor color group of the service code.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn normalize_corridor(fc: &FeatureCollection, catalog: &Catalog) -> NormalizedSystem {
    let mut set = DraftSet::new();
    set.absorb(fc, SystemId::Corridor, CORRIDOR_REF_KEYS, "Paradero", false);
    let (drafts, stops, skipped) = set.into_drafts();
    if skipped > 0 {
        tracing::debug!("Corridor features without reference: {}", skipped);
    }

    let routes = drafts
        .into_iter()
        .map(|draft| Route {
            color: color::resolve(
                draft.color.as_deref(),
                catalog.corridor_color(&draft.id),
                &draft.id,
            ),
            name: draft.name,
            kind: RouteKind::Corridor,
            shape: RouteShape::Segments(
                [draft.undirected, draft.north, draft.south].concat(),
            ),
            stops: draft.stops,
            id: draft.id,
        })
        .collect();

    NormalizedSystem {
        routes,
        stops,
        macros: MacroTable::new(),
        skipped,
    }
}

/// A metro station in the structured lines document
#[derive(Debug, Clone, Deserialize)]
pub struct MetroStationRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

/// A line in the structured metro document; `track` is in `[lon, lat]`
#[derive(Debug, Clone, Deserialize)]
pub struct MetroLineRecord {
    pub id: Code,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub track: Vec<Vec<f64>>,
    #[serde(default)]
    pub stations: Vec<MetroStationRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct MetroLinesDocument {
    lines: Vec<MetroLineRecord>,
}

/// Normalize the metro document: a feature collection or `{lines: [...]}`
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn normalize_metro(json: &str) -> Result<NormalizedSystem> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.get("lines").is_some() {
        let doc: MetroLinesDocument = serde_json::from_value(value)?;
        return Ok(metro_from_lines(doc.lines));
    }

    let fc = parse_feature_collection(json)?;
    let mut set = DraftSet::new();
    set.absorb(&fc, SystemId::Metro, METRO_REF_KEYS, "", false);
    let (drafts, mut stops, skipped) = set.into_drafts();

    let routes = drafts
        .into_iter()
        .map(|draft| {
            for (i, stop_id) in draft.stops.iter().enumerate() {
                if let Some(stop) = stops.get_mut(stop_id)
                    && stop.name.is_empty()
                {
                    stop.name = format!("Estación {}", i + 1);
                }
            }
            metro_route(
                draft.id,
                draft.name,
                draft.color.as_deref(),
                [draft.undirected, draft.north, draft.south].concat(),
                draft.stops,
            )
        })
        .collect();

    Ok(NormalizedSystem {
        routes,
        stops,
        macros: MacroTable::new(),
        skipped,
    })
}

fn metro_from_lines(lines: Vec<MetroLineRecord>) -> NormalizedSystem {
    let mut stops = HashMap::new();
    let routes = lines
        .into_iter()
        .map(|line| {
            let id = normalize_id(&line.id.to_string());
            let track = positions_to_line(&line.track);
            let segments = if track.0.len() >= 2 {
                vec![track]
            } else {
                Vec::new()
            };
            let stop_ids = line
                .stations
                .iter()
                .enumerate()
                .map(|(i, station)| {
                    let stop_id = format!("metro:{}:{}", id, i);
                    let name = station
                        .name
                        .clone()
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| format!("Estación {}", i + 1));
                    stops.insert(
                        stop_id.clone(),
                        Stop::new(stop_id.clone(), name, station.lat, station.lon),
                    );
                    stop_id
                })
                .collect();
            metro_route(
                id,
                line.name.unwrap_or_default(),
                line.color.as_deref(),
                segments,
                stop_ids,
            )
        })
        .collect();

    NormalizedSystem {
        routes,
        stops,
        macros: MacroTable::new(),
        skipped: 0,
    }
}

fn metro_route(
    id: String,
    name: String,
    explicit_color: Option<&str>,
    segments: Vec<Polyline>,
    stops: Vec<String>,
) -> Route {
    let name = if name.trim().is_empty() {
        format!("Línea {}", id)
    } else {
        name
    };
    Route {
        color: color::resolve(explicit_color, Some(METRO_DEFAULT_COLOR), &id),
        name,
        kind: RouteKind::Metro,
        shape: RouteShape::Segments(segments),
        stops,
        id,
    }
}

/// A route code written either as a string or a number
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Code {
    Text(String),
    Number(serde_json::Number),
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Code::Text(s) => f.write_str(s.trim()),
            Code::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A trunk station record
#[derive(Debug, Clone, Deserialize)]
pub struct StationRecord {
    pub id: Code,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

/// A trunk service record
#[derive(Debug, Clone, Deserialize)]
pub struct TrunkServiceRecord {
    pub id: Code,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub stops: Vec<Code>,
    #[serde(default)]
    pub north_south: Vec<Code>,
    #[serde(default)]
    pub south_north: Vec<Code>,
}

/// Trunk stations and services; the two usually come from separate files, so
/// every section is optional and documents merge
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrunkDocument {
    pub stations: Vec<StationRecord>,
    pub services: Vec<TrunkServiceRecord>,
    /// Color table keyed by service id
    pub colors: HashMap<String, String>,
}

impl TrunkDocument {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn merge(mut self, other: TrunkDocument) -> Self {
        self.stations.extend(other.stations);
        self.services.extend(other.services);
        self.colors.extend(other.colors);
        self
    }
}

/// One direction of a macro definition: polylines of `[lat, lon]` pairs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct MacroRecord {
    north_south: Vec<Vec<[f64; 2]>>,
    south_north: Vec<Vec<[f64; 2]>>,
}

/// Parse the trunk macro document `{<corridor>: {north_south, south_north}}`
pub fn parse_macros(json: &str) -> Result<MacroTable> {
    let raw: HashMap<String, MacroRecord> = serde_json::from_str(json)?;
    let to_lines = |lines: Vec<Vec<[f64; 2]>>| -> Vec<Polyline> {
        lines
            .into_iter()
            .map(|line| {
                LineString::new(
                    line.into_iter()
                        .map(|[lat, lon]| Coord { x: lon, y: lat })
                        .collect(),
                )
            })
            .filter(|l| l.0.len() >= 2)
            .collect()
    };
    Ok(raw
        .into_iter()
        .map(|(id, record)| {
            (
                normalize_id(&id),
                MacroDefinition {
                    north_south: to_lines(record.north_south),
                    south_north: to_lines(record.south_north),
                },
            )
        })
        .collect())
}

fn trunk_kind(record: &TrunkServiceRecord) -> RouteKind {
    match record.kind.as_deref().map(|k| k.trim().to_lowercase()) {
        Some(k) if k == "regular" => RouteKind::TrunkRegular,
        Some(k) if k.starts_with("expres") => RouteKind::TrunkExpress,
        _ if !record.north_south.is_empty() || !record.south_north.is_empty() => {
            RouteKind::TrunkExpress
        }
        _ => RouteKind::TrunkRegular,
    }
}

/// Ordered union of stop lists without duplicates
fn ordered_union<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Normalize the trunk stations, services and backbone definitions
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn normalize_trunk(doc: TrunkDocument, macros: MacroTable) -> NormalizedSystem {
    let stops: HashMap<String, Stop> = doc
        .stations
        .into_iter()
        .map(|s| {
            let id = s.id.to_string();
            (id.clone(), Stop::new(id, s.name, s.lat, s.lon))
        })
        .collect();

    let colors: HashMap<String, String> = doc
        .colors
        .into_iter()
        .map(|(k, v)| (normalize_id(&k), v))
        .collect();

    let routes = doc
        .services
        .into_iter()
        .map(|record| {
            let id = normalize_id(&record.id.to_string());
            let kind = trunk_kind(&record);
            let explicit = colors.get(&id).cloned().or(record.color.clone());
            let ids = |codes: &[Code]| codes.iter().map(Code::to_string).collect::<Vec<_>>();
            let (shape, stops) = match kind {
                RouteKind::TrunkRegular => {
                    let mut stops = ids(&record.stops);
                    if stops.is_empty() {
                        stops = ids(&record.north_south);
                    }
                    (RouteShape::StopSequence, stops)
                }
                _ => {
                    let north_south = ids(&record.north_south);
                    let south_north = ids(&record.south_north);
                    let stops = ordered_union([
                        ids(&record.stops).as_slice(),
                        north_south.as_slice(),
                        south_north.as_slice(),
                    ]);
                    (
                        RouteShape::Directional {
                            north_south,
                            south_north,
                        },
                        stops,
                    )
                }
            };
            Route {
                color: color::resolve(explicit.as_deref(), None, &id),
                name: record.name,
                kind,
                shape,
                stops,
                id,
            }
        })
        .collect();

    NormalizedSystem {
        routes,
        stops,
        macros,
        skipped: 0,
    }
}

/// Shared corridor a trunk route rides on
///
/// Services `A` and `C` ride corridor `A` whatever their kind, express `10`
/// rides `A`, everything else rides `B`.
pub fn macro_corridor_for(route: &Route) -> &'static str {
    let id = route.id.as_str();
    if id == "A" || id == "C" {
        return "A";
    }
    match route.kind {
        RouteKind::TrunkExpress => {
            let name = route.name.to_uppercase();
            let mentions_ten = name.split_whitespace().any(|w| w == "10");
            if id == "10" || mentions_ten {
                "A"
            } else {
                "B"
            }
        }
        _ => "B",
    }
}
