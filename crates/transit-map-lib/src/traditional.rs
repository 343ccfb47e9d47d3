//! Traditional transit routes: route map, display entries and geometry assembly
//!
//! Traditional routes are crowd-sourced. The route map only says where each
//! route's files live; the line and stop documents are read on demand and turned
//! into a [`TraditionalGeometry`] by [`assemble`]. Files come in varying quality:
//! some store `[lat, lon]` pairs, some have stops but no line, some bundle both
//! trips in one document.

use crate::catalog::strip_trip_suffix;
use crate::ids::{SystemId, Trip, normalize_id};
use crate::model::{Polyline, Stop, TraditionalDefinition, extend_bounds};
use crate::normalize::{first_prop, parse_feature_collection, to_point, to_segments};
use crate::{MapError, Result};
use geo::{Coord, LineString, Rect};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Properties that may carry a feature's trip, in lookup order
const TRIP_KEYS: &[&str] = &[
    "trip",
    "trip_id",
    "direction",
    "direction_id",
    "dir",
    "sentido",
    "way",
    "shape",
    "shape_id",
    "route_dir",
];
const TRIP_TEXT_KEYS: &[&str] = &["id", "name", "title"];
const STOP_NAME_KEYS: &[&str] = &["name", "nombre", "title", "label"];

#[derive(Debug, Deserialize)]
struct RouteMapEntry {
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    trip: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RouteMapDocument {
    routes: BTreeMap<String, RouteMapEntry>,
}

/// Parse the route map `{"routes": {<id>: {folder, name, color, trip}}}`
///
/// The folder defaults to the route id. The trip comes from the entry, else from
/// an `-ida`/`-vuelta` suffix on the id.
pub fn parse_route_map(json: &str) -> Result<Vec<TraditionalDefinition>> {
    let doc: RouteMapDocument = serde_json::from_str(json)?;
    Ok(doc
        .routes
        .into_iter()
        .filter(|(id, _)| !id.trim().is_empty())
        .map(|(id, entry)| {
            let upper = normalize_id(&id);
            let trip = entry
                .trip
                .as_ref()
                .and_then(trip_from_value)
                .or_else(|| trip_from_suffix(&upper));
            TraditionalDefinition {
                folder: entry
                    .folder
                    .filter(|f| !f.trim().is_empty())
                    .unwrap_or_else(|| id.trim().to_string()),
                name: entry.name.unwrap_or_default(),
                color: entry.color.filter(|c| !c.trim().is_empty()),
                trip,
                id: upper,
            }
        })
        .collect())
}

fn trip_from_suffix(upper: &str) -> Option<Trip> {
    if upper.ends_with("-IDA") {
        Some(Trip::Outbound)
    } else if upper.ends_with("-VUELTA") {
        Some(Trip::Return)
    } else {
        None
    }
}

/// The two physical routes behind one logical traditional route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub ida: String,
    pub vuelta: String,
}

impl Pair {
    pub fn side(&self, trip: Trip) -> &str {
        match trip {
            Trip::Outbound => &self.ida,
            Trip::Return => &self.vuelta,
        }
    }

    /// Trip of a physical id within the pair
    pub fn trip_of(&self, id: &str) -> Option<Trip> {
        let id = normalize_id(id);
        if id == self.ida {
            Some(Trip::Outbound)
        } else if id == self.vuelta {
            Some(Trip::Return)
        } else {
            None
        }
    }
}

/// One row of the traditional transit list
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEntry {
    /// Logical id: the base id for pairs, the route id otherwise
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub pair: Option<Pair>,
    pub default_trip: Trip,
}

impl DisplayEntry {
    /// Physical route drawn for a trip
    pub fn physical_id(&self, trip: Trip) -> &str {
        match &self.pair {
            Some(pair) => pair.side(trip),
            None => &self.id,
        }
    }
}

/// Collapse definitions into display entries
///
/// Ids `<base>-IDA` and `<base>-VUELTA` that are both defined become one paired
/// entry under `<base>`, taking the first non-empty name and color of its sides.
/// Entries keep the order of their first definition.
pub fn display_entries(definitions: &[TraditionalDefinition]) -> Vec<DisplayEntry> {
    let by_id: HashMap<&str, &TraditionalDefinition> =
        definitions.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut entries = Vec::with_capacity(definitions.len());
    let mut emitted = std::collections::HashSet::new();

    for def in definitions {
        let base = strip_trip_suffix(&def.id);
        let ida_id = format!("{}-IDA", base);
        let vuelta_id = format!("{}-VUELTA", base);
        let paired = base != def.id
            && by_id.contains_key(ida_id.as_str())
            && by_id.contains_key(vuelta_id.as_str());

        if !paired {
            if emitted.insert(def.id.clone()) {
                entries.push(DisplayEntry {
                    id: def.id.clone(),
                    name: def.name.clone(),
                    color: def.color.clone(),
                    pair: None,
                    default_trip: def.trip.unwrap_or_default(),
                });
            }
            continue;
        }
        if !emitted.insert(base.to_string()) {
            continue;
        }
        let sides = [by_id[ida_id.as_str()], by_id[vuelta_id.as_str()]];
        entries.push(DisplayEntry {
            id: base.to_string(),
            name: sides
                .iter()
                .map(|d| d.name.trim())
                .find(|n| !n.is_empty())
                .unwrap_or_default()
                .to_string(),
            color: sides.iter().find_map(|d| d.color.clone()),
            pair: Some(Pair {
                ida: ida_id,
                vuelta: vuelta_id,
            }),
            default_trip: Trip::Outbound,
        });
    }
    entries
}

/// Corridor code a traditional route borrows its color from (`CORR-<code>`)
pub fn corridor_override_code(id: &str) -> Option<String> {
    let upper = normalize_id(id);
    let base = strip_trip_suffix(&upper);
    let rest = base.strip_prefix("CORR")?;
    let code = rest.strip_prefix(['-', '_', ' ', '.'])?.trim();
    (!code.is_empty()).then(|| code.to_string())
}

/// Line file names to try for a trip, most specific first
pub fn line_candidates(trip: Option<Trip>) -> Vec<String> {
    let mut names = Vec::with_capacity(3);
    if let Some(trip) = trip {
        names.push(format!("route_track_trip{}.geojson", trip.number()));
    }
    names.push("route_track.geojson".to_string());
    names.push("line_approx.geojson".to_string());
    names
}

/// Stop file names to try for a trip, most specific first
pub fn stop_candidates(trip: Option<Trip>) -> Vec<String> {
    let mut names = Vec::with_capacity(3);
    if let Some(trip) = trip {
        names.push(format!("stops_trip{}.geojson", trip.number()));
    }
    names.push("stops.geojson".to_string());
    names.push("stops_from_map.geojson".to_string());
    names
}

/// Built geometry of one traditional route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraditionalGeometry {
    pub lines: Vec<Polyline>,
    pub stops: Vec<Stop>,
    pub bounds: Option<Rect<f64>>,
}

/// Assemble a route's geometry from its line and stop documents
///
/// Either document may be missing, but not both. Documents stored as
/// `[lat, lon]` are swapped. Without a line document the line is drawn through
/// the stops, per `direction` property in `sequence` order.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn assemble(
    id: &str,
    line_doc: Option<&str>,
    stops_doc: Option<&str>,
    trip: Option<Trip>,
) -> Result<TraditionalGeometry> {
    if line_doc.is_none() && stops_doc.is_none() {
        return Err(MapError::MissingData(format!(
            "no line or stop document for traditional route {}",
            id
        )));
    }

    let prepare = |doc: &str| -> Result<FeatureCollection> {
        let mut fc = parse_feature_collection(doc)?;
        if looks_lat_lon(&fc) {
            tracing::debug!("Swapping [lat, lon] coordinates of {}", id);
            swap_axes(&mut fc);
        }
        Ok(match trip {
            Some(trip) => filter_by_trip(fc, trip),
            None => fc,
        })
    };
    let lines_fc = line_doc.map(prepare).transpose()?;
    let stops_fc = stops_doc.map(prepare).transpose()?;

    let stop_features: Vec<&Feature> = stops_fc
        .iter()
        .flat_map(|fc| fc.features.iter())
        .filter(|f| f.geometry.as_ref().and_then(|g| to_point(&g.value)).is_some())
        .collect();

    let lines = match &lines_fc {
        Some(fc) => fc
            .features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .flat_map(|g| to_segments(&g.value))
            .collect(),
        None if stop_features.len() >= 2 => lines_from_stops(&stop_features),
        None => Vec::new(),
    };

    let key_prefix = format!("{}:{}", SystemId::Traditional.tag(), normalize_id(id));
    let stops: Vec<Stop> = stop_features
        .iter()
        .enumerate()
        .filter_map(|(i, f)| {
            let at = to_point(&f.geometry.as_ref()?.value)?;
            let name = f
                .properties
                .as_ref()
                .and_then(|p| first_prop(p, STOP_NAME_KEYS))
                .unwrap_or_else(|| format!("Paradero {}", i + 1));
            Some(Stop::new(format!("{}:{}", key_prefix, i), name, at.y, at.x))
        })
        .collect();

    let bounds = extend_bounds(
        extend_bounds(None, lines.iter().flat_map(|l| l.0.iter().copied())),
        stops.iter().map(Stop::coord),
    );
    Ok(TraditionalGeometry {
        lines,
        stops,
        bounds,
    })
}

fn first_position(fc: &FeatureCollection) -> Option<&[f64]> {
    let geometry = fc.features.first()?.geometry.as_ref()?;
    let position = match &geometry.value {
        geojson::Value::Point(p) => p,
        geojson::Value::LineString(line) => line.first()?,
        geojson::Value::MultiLineString(lines) => lines.first()?.first()?,
        _ => return None,
    };
    Some(position.as_slice())
}

/// Whether the first position reads as `[lat, lon]`
///
/// Around Lima |lon| is about 77 and |lat| about 12, so a smaller first value is
/// a latitude.
fn looks_lat_lon(fc: &FeatureCollection) -> bool {
    matches!(first_position(fc), Some([a, b, ..]) if a.abs() < b.abs())
}

fn swap_axes(fc: &mut FeatureCollection) {
    fn swap(position: &mut [f64]) {
        if position.len() >= 2 {
            position.swap(0, 1);
        }
    }
    for geometry in fc.features.iter_mut().filter_map(|f| f.geometry.as_mut()) {
        match &mut geometry.value {
            geojson::Value::Point(p) => swap(p),
            geojson::Value::MultiPoint(ps) | geojson::Value::LineString(ps) => {
                ps.iter_mut().for_each(|p| swap(p))
            }
            geojson::Value::MultiLineString(lines) | geojson::Value::Polygon(lines) => lines
                .iter_mut()
                .flatten()
                .for_each(|p| swap(p)),
            geojson::Value::MultiPolygon(polys) => polys
                .iter_mut()
                .flatten()
                .flatten()
                .for_each(|p| swap(p)),
            geojson::Value::GeometryCollection(_) => {}
        }
    }
}

/// Trip named by a property value: numbers 1/2 or ida/vuelta-like words
fn trip_from_value(value: &serde_json::Value) -> Option<Trip> {
    match value {
        serde_json::Value::Number(n) => match n.as_i64()? {
            1 => Some(Trip::Outbound),
            2 => Some(Trip::Return),
            _ => None,
        },
        serde_json::Value::String(s) => trip_from_text(s),
        _ => None,
    }
}

fn trip_from_text(text: &str) -> Option<Trip> {
    let lower = text.trim().to_lowercase();
    match lower.as_str() {
        "" => return None,
        "1" | "ns" | "north_south" | "north-south" | "forward" => return Some(Trip::Outbound),
        "2" | "sn" | "south_north" | "south-north" | "reverse" => return Some(Trip::Return),
        _ => {}
    }
    lower
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|token| match token {
            "ida" | "outbound" => Some(Trip::Outbound),
            "vuelta" | "return" | "back" => Some(Trip::Return),
            _ => None,
        })
}

/// Trip a feature belongs to, from its properties then its id/name/title text
fn feature_trip(props: &JsonObject) -> Option<Trip> {
    TRIP_KEYS
        .iter()
        .filter_map(|key| props.get(*key))
        .find_map(trip_from_value)
        .or_else(|| {
            let text = TRIP_TEXT_KEYS
                .iter()
                .filter_map(|key| first_prop(props, &[*key]))
                .collect::<Vec<_>>()
                .join(" ");
            trip_from_text(&text)
        })
}

/// Keep the features of one trip
///
/// When no feature names a trip, a single two-part multi-line is split by trip
/// index; otherwise the document is kept whole.
fn filter_by_trip(mut fc: FeatureCollection, trip: Trip) -> FeatureCollection {
    let matched: Vec<Feature> = fc
        .features
        .iter()
        .filter(|f| {
            f.properties
                .as_ref()
                .and_then(feature_trip)
                .is_some_and(|t| t == trip)
        })
        .cloned()
        .collect();
    if !matched.is_empty() {
        fc.features = matched;
        return fc;
    }

    if let [feature] = fc.features.as_mut_slice()
        && let Some(geometry) = feature.geometry.as_mut()
        && let geojson::Value::MultiLineString(parts) = &mut geometry.value
        && parts.len() == 2
    {
        let part = parts.swap_remove(usize::from(trip.number() - 1));
        geometry.value = geojson::Value::LineString(part);
    }
    fc
}

/// Lines through stop points, one per `direction` value, in `sequence` order
fn lines_from_stops(stops: &[&Feature]) -> Vec<Polyline> {
    let mut groups: BTreeMap<String, Vec<(f64, Coord<f64>)>> = BTreeMap::new();
    for feature in stops {
        let Some(at) = feature.geometry.as_ref().and_then(|g| to_point(&g.value)) else {
            continue;
        };
        let props = feature.properties.as_ref();
        let direction = props
            .and_then(|p| first_prop(p, &["direction"]))
            .unwrap_or_default();
        let sequence = props
            .and_then(|p| first_prop(p, &["sequence"]))
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(f64::INFINITY);
        groups.entry(direction).or_default().push((sequence, at));
    }
    groups
        .into_values()
        .filter_map(|mut points| {
            // stable: equal sequences keep file order
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            (points.len() >= 2).then(|| LineString::new(points.into_iter().map(|(_, c)| c).collect()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, name: &str, color: Option<&str>) -> TraditionalDefinition {
        TraditionalDefinition {
            id: id.to_string(),
            folder: id.to_lowercase(),
            name: name.to_string(),
            color: color.map(String::from),
            trip: trip_from_suffix(id),
        }
    }

    #[test]
    fn test_parse_route_map() {
        let json = r##"{"routes": {
            "1244-ida": {"folder": "wr/1244_1", "name": "Ruta 1244", "color": "#123456"},
            "1244-vuelta": {"folder": "wr/1244_2", "trip": 2},
            "ET01": {"name": "Circuito"}
        }}"##;
        let defs = parse_route_map(json).unwrap();
        assert_eq!(defs.len(), 3);
        let ida = defs.iter().find(|d| d.id == "1244-IDA").unwrap();
        assert_eq!(ida.trip, Some(Trip::Outbound));
        assert_eq!(ida.folder, "wr/1244_1");
        let et = defs.iter().find(|d| d.id == "ET01").unwrap();
        assert_eq!(et.folder, "ET01");
        assert_eq!(et.trip, None);
    }

    #[test]
    fn test_display_entries_pair_sides() {
        let defs = vec![
            def("1244-IDA", "", None),
            def("1244-VUELTA", "Ruta 1244", Some("#ff0000")),
            def("ET01", "Circuito", None),
            def("77-IDA", "Solo ida", None),
        ];
        let entries = display_entries(&defs);
        assert_eq!(entries.len(), 3);

        let pair = &entries[0];
        assert_eq!(pair.id, "1244");
        assert_eq!(pair.name, "Ruta 1244");
        assert_eq!(pair.color.as_deref(), Some("#ff0000"));
        assert_eq!(pair.physical_id(Trip::Return), "1244-VUELTA");
        assert_eq!(pair.default_trip, Trip::Outbound);

        assert!(entries[1].pair.is_none());
        // a lone side stays its own entry
        assert_eq!(entries[2].id, "77-IDA");
        assert_eq!(entries[2].physical_id(Trip::Return), "77-IDA");
    }

    #[test]
    fn test_corridor_override_code() {
        assert_eq!(corridor_override_code("corr-209-ida").as_deref(), Some("209"));
        assert_eq!(corridor_override_code("CORR_SE02").as_deref(), Some("SE02"));
        assert_eq!(corridor_override_code("CORREDOR"), None);
        assert_eq!(corridor_override_code("1244"), None);
    }

    #[test]
    fn test_candidates_prefer_trip_files() {
        assert_eq!(
            line_candidates(Some(Trip::Return)),
            vec!["route_track_trip2.geojson", "route_track.geojson", "line_approx.geojson"]
        );
        assert_eq!(stop_candidates(None), vec!["stops.geojson", "stops_from_map.geojson"]);
    }

    #[test]
    fn test_assemble_requires_a_document() {
        assert!(matches!(
            assemble("X", None, None, None),
            Err(MapError::MissingData(_))
        ));
    }

    #[test]
    fn test_assemble_swaps_lat_lon() {
        let line = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "LineString", "coordinates": [[-12.0, -77.0], [-12.1, -77.1]]}}
        ]}"#;
        let geometry = assemble("X", Some(line), None, None).unwrap();
        assert_eq!(geometry.lines.len(), 1);
        assert_eq!(geometry.lines[0].0[0], Coord { x: -77.0, y: -12.0 });
        assert!(geometry.stops.is_empty());
        assert!(geometry.bounds.is_some());
    }

    #[test]
    fn test_assemble_line_from_stops() {
        let stops = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "C", "sequence": 3, "direction": "1"},
             "geometry": {"type": "Point", "coordinates": [-77.03, -12.03]}},
            {"type": "Feature", "properties": {"name": "A", "sequence": 1, "direction": "1"},
             "geometry": {"type": "Point", "coordinates": [-77.01, -12.01]}},
            {"type": "Feature", "properties": {"sequence": 2, "direction": "1"},
             "geometry": {"type": "Point", "coordinates": [-77.02, -12.02]}}
        ]}"#;
        let geometry = assemble("ET01", None, Some(stops), None).unwrap();
        assert_eq!(geometry.lines.len(), 1);
        let xs: Vec<f64> = geometry.lines[0].0.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![-77.01, -77.02, -77.03]);
        assert_eq!(geometry.stops.len(), 3);
        assert_eq!(geometry.stops[0].name, "C");
        assert_eq!(geometry.stops[2].name, "Paradero 3");
        assert_eq!(geometry.stops[0].id, "wr:ET01:0");
    }

    #[test]
    fn test_trip_filter_by_property_and_multiline() {
        let doc = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"trip": 1},
             "geometry": {"type": "LineString", "coordinates": [[-77.0, -12.0], [-77.1, -12.1]]}},
            {"type": "Feature", "properties": {"name": "Vuelta"},
             "geometry": {"type": "LineString", "coordinates": [[-77.2, -12.2], [-77.3, -12.3]]}}
        ]}"#;
        let vuelta = assemble("X", Some(doc), None, Some(Trip::Return)).unwrap();
        assert_eq!(vuelta.lines.len(), 1);
        assert_eq!(vuelta.lines[0].0[0].x, -77.2);

        let multi = r#"{"type": "Feature", "properties": {},
            "geometry": {"type": "MultiLineString", "coordinates": [
                [[-77.0, -12.0], [-77.1, -12.1]],
                [[-77.2, -12.2], [-77.3, -12.3]]
            ]}}"#;
        let ida = assemble("X", Some(multi), None, Some(Trip::Outbound)).unwrap();
        assert_eq!(ida.lines.len(), 1);
        assert_eq!(ida.lines[0].0[0].x, -77.0);
    }

    #[test]
    fn test_trip_text_matches_whole_words() {
        assert_eq!(trip_from_text("Av. Avenida Sur"), None);
        assert_eq!(trip_from_text("Ruta 12 (ida)"), Some(Trip::Outbound));
        assert_eq!(trip_from_text("south_north"), Some(Trip::Return));
        assert_eq!(trip_from_value(&serde_json::json!(2)), Some(Trip::Return));
    }
}
