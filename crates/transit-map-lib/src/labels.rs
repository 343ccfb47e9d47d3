//! Display labels for sidebar rows and search results
//!
//! Traditional routes carry little naming in their geometry files, so their
//! labels come from a route metadata table (alias, operator, districts) and a
//! table of first/last stop names per trip. Other systems label routes from
//! their own id, kind and name.

use crate::catalog::{CorridorTab, canonical_code, code_bases};
use crate::ids::{Trip, normalize_id};
use crate::model::{Route, RouteKind};
use crate::traditional::DisplayEntry;
use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;

const PLACEHOLDERS: &[&str] = &[
    "ninguno",
    "ninguna",
    "desconocido",
    "desconocida",
    "?",
    "¿?",
    "-",
    "sin nombre",
];
const OPERATOR_PREFIXES: &[&str] = &[
    "Empresa de Transportes y Servicios",
    "Empresa de Transportes",
    "Empresa de Transporte",
];
const OPERATOR_SUFFIXES: &[&str] = &[" S.A.C.", " S.A."];
const OPERATOR_SHORT_LEN: usize = 30;

/// One row of the route metadata table
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouteMetadata {
    pub codigo_nuevo: String,
    pub codigo_antiguo: String,
    pub alias: String,
    pub empresa_operadora: String,
    pub distrito_origen: String,
    pub distrito_destino: String,
}

impl RouteMetadata {
    /// Alias unless it is a placeholder
    pub fn alias(&self) -> Option<&str> {
        meaningful(&self.alias)
    }

    pub fn operator(&self) -> Option<&str> {
        meaningful(&self.empresa_operadora)
    }

    /// Operator acronym from the parenthesized part of its name
    pub fn acronym(&self) -> Option<&str> {
        operator_acronym(&self.empresa_operadora)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Endpoints {
    fn label(&self) -> Option<String> {
        let from = self.from.as_deref().map(str::trim).unwrap_or_default();
        let to = self.to.as_deref().map(str::trim).unwrap_or_default();
        (!from.is_empty() || !to.is_empty()).then(|| arrow(from, to))
    }
}

/// First and last stop names per trip
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TripEndpoints {
    pub ida: Option<Endpoints>,
    pub vuelta: Option<Endpoints>,
}

impl TripEndpoints {
    pub fn for_trip(&self, trip: Trip) -> Option<&Endpoints> {
        match trip {
            Trip::Outbound => self.ida.as_ref(),
            Trip::Return => self.vuelta.as_ref(),
        }
    }
}

/// Texts of one sidebar row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteLabel {
    pub title: String,
    pub subtitle: Option<String>,
    /// Second subtitle line (traditional routes: first → last stop)
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Labeler {
    metadata: HashMap<String, RouteMetadata>,
    extremes: HashMap<String, TripEndpoints>,
}

impl Labeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the route metadata table, keyed by canonical new code
    ///
    /// Rows without a code are skipped, as are rows that fail to parse.
    pub fn with_metadata_csv(mut self, data: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(data.as_bytes());
        // fail early on an unreadable header
        reader.headers()?;
        for row in reader.deserialize::<RouteMetadata>() {
            match row {
                Ok(meta) if !meta.codigo_nuevo.is_empty() => {
                    self.metadata.insert(canonical_code(&meta.codigo_nuevo), meta);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping route metadata row: {}", e),
            }
        }
        Ok(self)
    }

    /// Load the extremes table `{<id>: {ida: {from, to}, vuelta: {from, to}}}`
    pub fn with_extremes_json(mut self, json: &str) -> Result<Self> {
        let table: HashMap<String, TripEndpoints> = serde_json::from_str(json)?;
        self.extremes = table
            .into_iter()
            .map(|(k, v)| (normalize_id(&k), v))
            .collect();
        Ok(self)
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.len()
    }

    /// Metadata of a traditional route by any of its code bases
    pub fn metadata(&self, id: &str) -> Option<&RouteMetadata> {
        code_bases(id).iter().find_map(|b| self.metadata.get(b))
    }

    fn endpoints(&self, id: &str, trip: Trip) -> Option<String> {
        self.extremes.get(&normalize_id(id))?.for_trip(trip)?.label()
    }

    /// Label of a traditional route entry for the selected trip
    pub fn traditional_label(&self, entry: &DisplayEntry, trip: Trip) -> RouteLabel {
        let meta = self.metadata(&entry.id);
        let title = meta
            .and_then(main_title)
            .unwrap_or_else(|| entry.id.to_uppercase());

        let subtitle = meta.and_then(|m| {
            let (mut from, mut to) = (m.distrito_origen.trim(), m.distrito_destino.trim());
            if trip == Trip::Return {
                std::mem::swap(&mut from, &mut to);
            }
            (!from.is_empty() || !to.is_empty()).then(|| arrow(from, to))
        });

        let detail = self
            .endpoints(entry.physical_id(trip), trip)
            .or_else(|| self.endpoints(&entry.id, trip))
            .or_else(|| name_endpoints(&entry.name));

        RouteLabel {
            title,
            subtitle,
            detail,
        }
    }

    /// Label of a trunk, feeder, corridor or metro route
    pub fn route_label(&self, route: &Route, tab: Option<CorridorTab>) -> RouteLabel {
        let name = route.name.trim();
        let (title, subtitle) = match route.kind {
            RouteKind::TrunkRegular => (format!("Ruta {}", route.id), non_empty(name)),
            RouteKind::TrunkExpress => (format!("Expreso {}", route.id), non_empty(name)),
            RouteKind::Feeder(zone) => (
                non_empty(name).unwrap_or_else(|| format!("Alimentador {}", route.id)),
                Some(zone.label().to_string()),
            ),
            RouteKind::Corridor => (
                format!("Servicio {}", route.id),
                tab.map(|t| match t {
                    CorridorTab::Principal => "Principal",
                    CorridorTab::Feeder => "Alimentador",
                })
                .map(String::from),
            ),
            RouteKind::Metro => (format!("Línea {}", route.id), non_empty(name)),
            RouteKind::Traditional => (route.id.clone(), non_empty(name)),
        };
        let detail = match route.kind {
            RouteKind::Corridor => non_empty(name),
            _ => None,
        };
        RouteLabel {
            subtitle: subtitle.filter(|s| *s != title),
            title,
            detail,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn arrow(from: &str, to: &str) -> String {
    format!("{} \u{2192} {}", from, to)
}

pub fn is_placeholder(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    PLACEHOLDERS.contains(&lower.as_str())
}

fn meaningful(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty() && !is_placeholder(text)).then_some(text)
}

/// Acronym in parentheses; with several, the first starting with `E`
pub fn operator_acronym(operator: &str) -> Option<&str> {
    let groups: Vec<&str> = operator
        .split('(')
        .skip(1)
        .filter_map(|part| part.split_once(')').map(|(inner, _)| inner.trim()))
        .filter(|inner| !inner.is_empty())
        .collect();
    match groups.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, ..] => groups
            .iter()
            .find(|g| g.starts_with(['E', 'e']))
            .or(Some(first))
            .copied(),
    }
}

/// Operator name shortened for display when longer than 30 characters
pub fn short_operator(operator: &str) -> String {
    let mut s = operator.trim();
    if s.chars().count() <= OPERATOR_SHORT_LEN {
        return s.to_string();
    }
    if let Some(rest) = OPERATOR_PREFIXES
        .iter()
        .find_map(|p| s.strip_prefix(p).and_then(|r| r.strip_prefix(' ')))
    {
        s = rest;
    }
    if let Some(rest) = OPERATOR_SUFFIXES.iter().find_map(|suf| s.strip_suffix(suf)) {
        s = rest;
    }
    s.trim().to_string()
}

/// Alias plus acronym, else acronym, else shortened operator
fn main_title(meta: &RouteMetadata) -> Option<String> {
    match (meta.alias(), meta.acronym()) {
        (Some(alias), Some(acronym)) => Some(format!("{} - {}", alias, acronym)),
        (Some(alias), None) => Some(alias.to_string()),
        (None, Some(acronym)) => Some(acronym.to_string()),
        (None, None) => meta.operator().map(short_operator),
    }
}

/// Strip a leading `NN · ` counter and a trailing `(ida)`/`(vuelta)`
fn clean_route_name(name: &str) -> &str {
    let mut s = name.trim();
    if let Some((head, rest)) = s.split_once('·')
        && !head.trim().is_empty()
        && head.trim().bytes().all(|b| b.is_ascii_digit())
    {
        s = rest.trim_start();
    }
    for suffix in ["(ida)", "(vuelta)"] {
        let Some(cut) = s.len().checked_sub(suffix.len()) else {
            continue;
        };
        if s.is_char_boundary(cut) && s[cut..].eq_ignore_ascii_case(suffix) {
            s = s[..cut].trim_end();
            break;
        }
    }
    s
}

/// Endpoint text parsed from a route name (`a → b` or `a - b`)
pub fn name_endpoints(name: &str) -> Option<String> {
    let s = clean_route_name(name);
    if s.is_empty() {
        return None;
    }
    let arrow_parts: Vec<&str> = s.split('\u{2192}').collect();
    if let [from, to] = arrow_parts.as_slice() {
        return Some(arrow(from.trim(), to.trim()));
    }
    let dash_parts: Vec<&str> = s.split('-').collect();
    if let [from, to] = dash_parts.as_slice() {
        return Some(arrow(from.trim(), to.trim()));
    }
    Some(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::model::{RouteShape, Zone};
    use crate::traditional::Pair;

    const CSV: &str = "codigo_nuevo,codigo_antiguo,alias,empresa_operadora,distrito_origen,distrito_destino
1244,IO-52,El Chino,Empresa de Transportes Santa Rosa (ETSR) S.A.C.,Ate,Callao
0205,,ninguno,Transportes Unidos (TU) (EMTU),Comas,Lima
301,,,Empresa de Transportes y Servicios Virgen de la Puerta S.A.C.,,
";

    fn labeler() -> Labeler {
        Labeler::new()
            .with_metadata_csv(CSV)
            .unwrap()
            .with_extremes_json(r#"{"1244-ida": {"ida": {"from": "Huaycán", "to": "Plaza Dos de Mayo"}}}"#)
            .unwrap()
    }

    fn entry(id: &str, name: &str, pair: bool) -> DisplayEntry {
        DisplayEntry {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
            pair: pair.then(|| Pair {
                ida: format!("{}-IDA", id),
                vuelta: format!("{}-VUELTA", id),
            }),
            default_trip: Trip::Outbound,
        }
    }

    #[test]
    fn test_metadata_by_canonical_code() {
        let labels = labeler();
        assert_eq!(labels.metadata_count(), 3);
        assert_eq!(labels.metadata("205-ida").map(|m| m.distrito_origen.as_str()), Some("Comas"));
        assert_eq!(labels.metadata("1244_2").map(|m| m.codigo_antiguo.as_str()), Some("IO-52"));
    }

    #[test]
    fn test_titles() {
        let labels = labeler();
        let title = |id: &str| labels.traditional_label(&entry(id, "", false), Trip::Outbound).title;
        assert_eq!(title("1244"), "El Chino - ETSR");
        // placeholder alias, acronym starting with E preferred
        assert_eq!(title("205"), "EMTU");
        assert_eq!(title("301"), "Virgen de la Puerta");
        assert_eq!(title("x9"), "X9");
    }

    #[test]
    fn test_subtitles_follow_trip() {
        let labels = labeler();
        let e = entry("1244", "12 · Ate - Callao (ida)", true);
        let ida = labels.traditional_label(&e, Trip::Outbound);
        assert_eq!(ida.subtitle.as_deref(), Some("Ate → Callao"));
        assert_eq!(ida.detail.as_deref(), Some("Huaycán → Plaza Dos de Mayo"));

        let vuelta = labels.traditional_label(&e, Trip::Return);
        assert_eq!(vuelta.subtitle.as_deref(), Some("Callao → Ate"));
        // no extremes for vuelta: parsed from the name
        assert_eq!(vuelta.detail.as_deref(), Some("Ate → Callao"));
    }

    #[test]
    fn test_name_endpoints() {
        assert_eq!(name_endpoints("Chorrillos → Independencia").as_deref(), Some("Chorrillos → Independencia"));
        assert_eq!(name_endpoints("Circuito de playas").as_deref(), Some("Circuito de playas"));
        assert_eq!(name_endpoints("  "), None);
    }

    #[test]
    fn test_operator_helpers() {
        assert_eq!(operator_acronym("Sin siglas"), None);
        assert_eq!(operator_acronym("Uno (AB) (CD)"), Some("AB"));
        assert_eq!(short_operator("Corta S.A."), "Corta S.A.");
        assert!(is_placeholder(" Desconocido "));
    }

    #[test]
    fn test_other_system_labels() {
        let labels = Labeler::new();
        let route = |kind, name: &str| Route {
            id: "A".to_string(),
            name: name.to_string(),
            color: Rgb::new(0, 0, 0),
            kind,
            shape: RouteShape::StopSequence,
            stops: Vec::new(),
        };
        let regular = labels.route_label(&route(RouteKind::TrunkRegular, "Naranjal - Matellini"), None);
        assert_eq!(regular.title, "Ruta A");
        assert_eq!(regular.subtitle.as_deref(), Some("Naranjal - Matellini"));

        let feeder = labels.route_label(&route(RouteKind::Feeder(Zone::North), ""), None);
        assert_eq!(feeder.title, "Alimentador A");
        assert_eq!(feeder.subtitle.as_deref(), Some("Zona Norte"));

        let corridor = labels.route_label(&route(RouteKind::Corridor, "Javier Prado"), Some(CorridorTab::Feeder));
        assert_eq!(corridor.title, "Servicio A");
        assert_eq!(corridor.subtitle.as_deref(), Some("Alimentador"));
        assert_eq!(corridor.detail.as_deref(), Some("Javier Prado"));
    }
}
