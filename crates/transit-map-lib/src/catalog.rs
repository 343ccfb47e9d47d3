//! Catalog filtering and corridor grouping
//!
//! The catalog document decides which route codes exist at all. It is applied
//! right after normalization, before any route reaches the registry, so the rest
//! of the engine never sees a filtered-out route.

use crate::color::{self, Rgb};
use crate::model::{Route, RouteKind};
use crate::Result;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Allow/deny list for one system or route family
///
/// A code in `exclude` is always rejected, even when it is also listed in `only`.
/// Without `only`, every code not excluded is allowed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CodeFilter {
    pub only: Option<Vec<String>>,
    pub exclude: Vec<String>,
}

impl CodeFilter {
    pub fn new(only: Option<&[&str]>, exclude: &[&str]) -> Self {
        Self {
            only: only.map(|codes| codes.iter().map(|c| c.to_string()).collect()),
            exclude: exclude.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Check a plain code, case-insensitively
    pub fn allows(&self, code: &str) -> bool {
        self.allows_any(&[canonical_code(code)])
    }

    /// Check a set of equivalent bases for one code: any excluded base rejects,
    /// any allowed base accepts
    pub fn allows_any(&self, bases: &[String]) -> bool {
        if bases.is_empty() {
            return false;
        }
        let exclude: HashSet<String> = self.exclude.iter().map(|c| canonical_code(c)).collect();
        if bases.iter().any(|b| exclude.contains(b)) {
            return false;
        }
        match &self.only {
            Some(only) => {
                let only: HashSet<String> = only.iter().map(|c| canonical_code(c)).collect();
                bases.iter().any(|b| only.contains(b))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrunkCatalog {
    pub regulares: CodeFilter,
    pub expresos: CodeFilter,
    pub alimentadores: CodeFilter,
}

/// Catalog color override for a corridor code: a group name, a hex color, or an
/// object naming either
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ColorOverride {
    Value(String),
    Detailed {
        #[serde(alias = "grupo", alias = "key")]
        group: Option<String>,
        #[serde(alias = "hex")]
        color: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorridorCatalog {
    #[serde(flatten)]
    pub filter: CodeFilter,
    #[serde(alias = "colorOverrides")]
    pub color_overrides: HashMap<String, ColorOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OtherCatalog {
    pub expreso_san_isidro: Option<CodeFilter>,
}

/// The catalog document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub metropolitano: TrunkCatalog,
    #[serde(alias = "corr")]
    pub corredores: CorridorCatalog,
    pub metro: CodeFilter,
    pub transporte: Option<CodeFilter>,
    pub aerodirecto: Option<CodeFilter>,
    pub otros: OtherCatalog,
}

impl Catalog {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether a route of the given system and kind passes the catalog
    ///
    /// Traditional routes always pass; their groups filter them.
    pub fn allows(&self, kind: RouteKind, id: &str) -> bool {
        match kind {
            RouteKind::TrunkRegular => self.metropolitano.regulares.allows(id),
            RouteKind::TrunkExpress => self.metropolitano.expresos.allows(id),
            RouteKind::Feeder(_) => self.metropolitano.alimentadores.allows(id),
            RouteKind::Corridor => self.corredores.filter.allows_any(&code_bases(id)),
            RouteKind::Metro => self.metro.allows(id),
            // split per group by `traditional_group_filter` instead
            RouteKind::Traditional => true,
        }
    }

    /// Drop routes the catalog does not allow
    pub fn filter_routes(&self, routes: Vec<Route>) -> Vec<Route> {
        let before = routes.len();
        let kept: Vec<Route> = routes
            .into_iter()
            .filter(|r| self.allows(r.kind, &r.id))
            .collect();
        if kept.len() < before {
            tracing::debug!("Catalog removed {} of {} routes", before - kept.len(), before);
        }
        kept
    }

    /// Filter for one traditional-route group; `None` when the group is not configured
    pub fn traditional_group_filter(&self, group: TraditionalGroup) -> Option<&CodeFilter> {
        match group {
            TraditionalGroup::Transport => self.transporte.as_ref(),
            TraditionalGroup::AirportExpress => self.aerodirecto.as_ref(),
            TraditionalGroup::SanIsidroExpress => self.otros.expreso_san_isidro.as_ref(),
        }
    }

    /// Color group assigned to a corridor code, honoring catalog overrides
    pub fn corridor_group(&self, code: &str) -> CorridorGroup {
        let upper = code.trim().to_uppercase();
        if upper.is_empty() {
            return CorridorGroup::Others;
        }
        if let Some(group) = self.override_for(&upper).and_then(override_group) {
            return group;
        }
        CorridorGroup::for_code(&upper)
    }

    /// Corridor color for a code: override color, else group color
    pub fn corridor_color(&self, code: &str) -> Option<Rgb> {
        let upper = code.trim().to_uppercase();
        if let Some(ov) = self.override_for(&upper) {
            let explicit = match ov {
                ColorOverride::Value(v) if v.trim().starts_with('#') => color::parse_css(v),
                ColorOverride::Detailed { color: Some(c), .. } => color::parse_css(c),
                _ => None,
            };
            if let Some(rgb) = explicit.or_else(|| override_group(ov).and_then(CorridorGroup::color)) {
                return Some(rgb);
            }
        }
        CorridorGroup::for_code(&upper).color()
    }

    fn override_for(&self, upper: &str) -> Option<&ColorOverride> {
        self.corredores
            .color_overrides
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(upper))
            .map(|(_, v)| v)
    }
}

fn override_group(ov: &ColorOverride) -> Option<CorridorGroup> {
    match ov {
        ColorOverride::Value(v) => {
            let v = v.trim();
            CorridorGroup::from_key(v).or_else(|| {
                let rgb = color::parse_css(v)?;
                CorridorGroup::ALL.into_iter().find(|g| g.color() == Some(rgb))
            })
        }
        ColorOverride::Detailed { group, .. } => group.as_deref().and_then(CorridorGroup::from_key),
    }
}

/// Canonical form of a route code: numeric codes lose leading zeros, others are uppercased
pub fn canonical_code(code: &str) -> String {
    let code = code.trim();
    if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = code.trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    } else {
        code.to_uppercase()
    }
}

/// Strip an `-IDA`/`-VUELTA` suffix from an uppercase id
pub fn strip_trip_suffix(upper: &str) -> &str {
    upper
        .strip_suffix("-IDA")
        .or_else(|| upper.strip_suffix("-VUELTA"))
        .unwrap_or(upper)
}

/// All bases a code is matched by: canonical form without trip suffix, plus the
/// same without a trailing `_<n>` variant number
pub fn code_bases(code: &str) -> Vec<String> {
    let canonical = canonical_code(code);
    let base = strip_trip_suffix(&canonical).to_string();
    let mut bases = Vec::with_capacity(2);
    if base.is_empty() {
        return bases;
    }
    if let Some((head, tail)) = base.rsplit_once('_')
        && !head.is_empty()
        && !tail.is_empty()
        && tail.bytes().all(|b| b.is_ascii_digit())
    {
        bases.push(base.clone());
        bases.push(head.to_string());
        return bases;
    }
    bases.push(base);
    bases
}

/// Color group of the corridor network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CorridorGroup {
    Yellow,
    Red,
    Blue,
    Purple,
    Green,
    Others,
}

impl CorridorGroup {
    /// Display order
    pub const ALL: [CorridorGroup; 6] = [
        CorridorGroup::Yellow,
        CorridorGroup::Red,
        CorridorGroup::Blue,
        CorridorGroup::Purple,
        CorridorGroup::Green,
        CorridorGroup::Others,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CorridorGroup::Yellow => "amarillo",
            CorridorGroup::Red => "rojo",
            CorridorGroup::Blue => "azul",
            CorridorGroup::Purple => "morado",
            CorridorGroup::Green => "verde",
            CorridorGroup::Others => "otros",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CorridorGroup::Yellow => "Corredor Amarillo",
            CorridorGroup::Red => "Corredor Rojo",
            CorridorGroup::Blue => "Corredor Azul",
            CorridorGroup::Purple => "Corredor Morado",
            CorridorGroup::Green => "Corredor Verde",
            CorridorGroup::Others => "Otros",
        }
    }

    pub fn color(self) -> Option<Rgb> {
        match self {
            CorridorGroup::Yellow => Some(Rgb::new(0xff, 0xcd, 0x00)),
            CorridorGroup::Red => Some(Rgb::new(0xe4, 0x00, 0x2b)),
            CorridorGroup::Blue => Some(Rgb::new(0x00, 0x35, 0x94)),
            CorridorGroup::Purple => Some(Rgb::new(0x9b, 0x26, 0xb6)),
            CorridorGroup::Green => Some(Rgb::new(0x8e, 0x8c, 0x13)),
            CorridorGroup::Others => None,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        CorridorGroup::ALL
            .into_iter()
            .filter(|g| *g != CorridorGroup::Others)
            .find(|g| g.key() == key)
    }

    /// Group by special code, then by first digit
    pub fn for_code(upper: &str) -> Self {
        let compact: String = upper
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        match compact.as_str() {
            "COLEBUS" => return CorridorGroup::Blue,
            "SE02" | "SE2" | "SP01" | "SP1" => return CorridorGroup::Purple,
            _ => {}
        }
        match upper.chars().next() {
            Some('1') => CorridorGroup::Yellow,
            Some('2') => CorridorGroup::Red,
            Some('3') => CorridorGroup::Blue,
            Some('4') => CorridorGroup::Purple,
            Some('5') => CorridorGroup::Green,
            _ => CorridorGroup::Others,
        }
    }
}

/// Tab inside a corridor color group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorridorTab {
    Principal,
    Feeder,
}

impl CorridorTab {
    pub fn key(self) -> &'static str {
        match self {
            CorridorTab::Principal => "principales",
            CorridorTab::Feeder => "alimentadores",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CorridorTab::Principal => "Principales",
            CorridorTab::Feeder => "Alimentadores",
        }
    }
}

const FEEDER_RANGES: [(u32, u32); 5] = [(150, 199), (250, 299), (350, 399), (450, 499), (550, 599)];

/// Principal/feeder classification lists for corridor codes
#[derive(Debug, Clone, Default)]
pub struct CorridorTypes {
    principal: Option<HashSet<String>>,
    feeder: Option<HashSet<String>>,
}

impl CorridorTypes {
    /// Parse the corridor list document
    ///
    /// The lists may sit at the root, under `corredores`/`corr`, or under `tipos`,
    /// each either an array or an object holding `only`/`items`/`codigos`/`activos`.
    pub fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let root = value
            .get("corredores")
            .or_else(|| value.get("corr"))
            .unwrap_or(&value);
        let find = |names: &[&str]| -> Option<HashSet<String>> {
            let node = names.iter().find_map(|n| {
                root.get(*n)
                    .or_else(|| root.get("tipos").and_then(|t| t.get(*n)))
                    .or_else(|| value.get(*n))
            })?;
            let array = node.as_array().or_else(|| {
                ["only", "items", "codigos", "activos"]
                    .iter()
                    .find_map(|k| node.get(*k).and_then(|v| v.as_array()))
            })?;
            Some(
                array
                    .iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(canonical_code(s)),
                        serde_json::Value::Number(n) => Some(canonical_code(&n.to_string())),
                        _ => None,
                    })
                    .collect(),
            )
        };
        Ok(Self {
            principal: find(&["principales", "principal"]),
            feeder: find(&["alimentadores", "alimentador"]),
        })
    }

    /// Tab for a corridor code: explicit lists first, then the numeric ranges
    pub fn tab_for(&self, code: &str) -> CorridorTab {
        let bases = code_bases(code);
        let listed = |set: &Option<HashSet<String>>| {
            set.as_ref()
                .is_some_and(|s| bases.iter().any(|b| s.contains(b)))
        };
        if listed(&self.feeder) {
            return CorridorTab::Feeder;
        }
        if listed(&self.principal) {
            return CorridorTab::Principal;
        }
        let digits: String = bases
            .first()
            .map(|b| b.chars().take_while(char::is_ascii_digit).collect())
            .unwrap_or_default();
        match digits.parse::<u32>() {
            Ok(n) if FEEDER_RANGES.iter().any(|(lo, hi)| (*lo..=*hi).contains(&n)) => {
                CorridorTab::Feeder
            }
            _ => CorridorTab::Principal,
        }
    }
}

/// Sort key for service codes: numeric codes first, by value, then the rest
pub fn service_sort_key(code: &str) -> (u8, u64, String) {
    let upper = code.trim().to_uppercase();
    match upper.parse::<u64>() {
        Ok(n) => (0, n, upper),
        Err(_) => (1, 0, upper),
    }
}

/// Groups of the traditional transit catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraditionalGroup {
    Transport,
    AirportExpress,
    SanIsidroExpress,
}

impl TraditionalGroup {
    pub const ALL: [TraditionalGroup; 3] = [
        TraditionalGroup::Transport,
        TraditionalGroup::AirportExpress,
        TraditionalGroup::SanIsidroExpress,
    ];

    pub fn key(self) -> &'static str {
        match self {
            TraditionalGroup::Transport => "transporte",
            TraditionalGroup::AirportExpress => "aerodirecto",
            TraditionalGroup::SanIsidroExpress => "expreso_san_isidro",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TraditionalGroup::Transport => "Transporte",
            TraditionalGroup::AirportExpress => "Aerodirecto",
            TraditionalGroup::SanIsidroExpress => "Expreso San Isidro",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_beats_only() {
        let filter = CodeFilter::new(Some(&["A", "B"]), &["B"]);
        let allowed: Vec<&str> = ["A", "B", "C"]
            .into_iter()
            .filter(|c| filter.allows(c))
            .collect();
        assert_eq!(allowed, vec!["A"]);
    }

    #[test]
    fn test_filter_without_only_allows_all_but_excluded() {
        let filter = CodeFilter::new(None, &["x"]);
        assert!(filter.allows("A"));
        assert!(!filter.allows("X"), "exclusion is case-insensitive");
    }

    #[test]
    fn test_code_bases() {
        assert_eq!(code_bases("1244-ida"), vec!["1244"]);
        assert_eq!(code_bases("007"), vec!["7"]);
        assert_eq!(code_bases("204_2"), vec!["204_2", "204"]);
        assert_eq!(code_bases("io-vuelta"), vec!["IO"]);
        assert!(code_bases("  ").is_empty());
    }

    #[test]
    fn test_catalog_parse_and_trunk_kinds() {
        let catalog = Catalog::parse(
            r#"{
                "metropolitano": {
                    "regulares": {"only": ["A", "B"]},
                    "expresos": {"exclude": ["5"]}
                },
                "corredores": {"exclude": ["209"], "color_overrides": {"COLEBUS": "rojo"}}
            }"#,
        )
        .unwrap();
        assert!(catalog.allows(RouteKind::TrunkRegular, "a"));
        assert!(!catalog.allows(RouteKind::TrunkRegular, "C"));
        assert!(!catalog.allows(RouteKind::TrunkExpress, "5"));
        assert!(catalog.allows(RouteKind::TrunkExpress, "C"));
        assert!(!catalog.allows(RouteKind::Corridor, "209-ida"));
        assert!(catalog.allows(RouteKind::Metro, "1"));
        assert!(catalog.allows(RouteKind::Traditional, "1244"));
    }

    #[test]
    fn test_traditional_routes_pass_and_groups_filter() {
        let catalog = Catalog::parse(r#"{"transporte": {"exclude": ["1244"]}}"#).unwrap();
        assert!(catalog.allows(RouteKind::Traditional, "1244-IDA"));
        let transport = catalog
            .traditional_group_filter(TraditionalGroup::Transport)
            .unwrap();
        assert!(!transport.allows_any(&code_bases("1244-IDA")));
        assert!(catalog.traditional_group_filter(TraditionalGroup::AirportExpress).is_none());
    }

    #[test]
    fn test_corridor_groups() {
        let catalog = Catalog::default();
        assert_eq!(catalog.corridor_group("107"), CorridorGroup::Yellow);
        assert_eq!(catalog.corridor_group("209"), CorridorGroup::Red);
        assert_eq!(catalog.corridor_group("Cole Bus"), CorridorGroup::Blue);
        assert_eq!(catalog.corridor_group("SE-02"), CorridorGroup::Purple);
        assert_eq!(catalog.corridor_group("SP01"), CorridorGroup::Purple);
        assert_eq!(catalog.corridor_group("X1"), CorridorGroup::Others);
        assert_eq!(catalog.corridor_color("301"), Some(Rgb::new(0x00, 0x35, 0x94)));
        assert_eq!(catalog.corridor_color("X1"), None);
    }

    #[test]
    fn test_corridor_overrides() {
        let catalog = Catalog::parse(
            r##"{"corredores": {"color_overrides": {
                "COLEBUS": "rojo",
                "X1": "#9b26b6",
                "X2": {"color": "#123456"},
                "X3": {"grupo": "verde"}
            }}}"##,
        )
        .unwrap();
        assert_eq!(catalog.corridor_group("colebus"), CorridorGroup::Red);
        assert_eq!(catalog.corridor_group("X1"), CorridorGroup::Purple);
        assert_eq!(catalog.corridor_color("X2"), Some(Rgb::new(0x12, 0x34, 0x56)));
        assert_eq!(catalog.corridor_group("X3"), CorridorGroup::Green);
        assert_eq!(catalog.corridor_color("X3"), Some(Rgb::new(0x8e, 0x8c, 0x13)));
    }

    #[test]
    fn test_corridor_tabs_by_range_and_list() {
        let types = CorridorTypes::default();
        assert_eq!(types.tab_for("107"), CorridorTab::Principal);
        assert_eq!(types.tab_for("155"), CorridorTab::Feeder);
        assert_eq!(types.tab_for("599"), CorridorTab::Feeder);
        assert_eq!(types.tab_for("600"), CorridorTab::Principal);

        let types = CorridorTypes::parse(
            r#"{"corredores": {"alimentadores": ["107"], "principales": {"codigos": [155]}}}"#,
        )
        .unwrap();
        assert_eq!(types.tab_for("107"), CorridorTab::Feeder);
        assert_eq!(types.tab_for("155"), CorridorTab::Principal);
        assert_eq!(types.tab_for("255"), CorridorTab::Feeder);
    }

    #[test]
    fn test_service_sort_key() {
        let mut codes = vec!["SE-02", "209", "107", "A"];
        codes.sort_by_key(|c| service_sort_key(c));
        assert_eq!(codes, vec!["107", "209", "A", "SE-02"]);
    }
}
