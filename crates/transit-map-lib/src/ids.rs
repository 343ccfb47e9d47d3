//! Identifiers shared by every component: transit systems, case-insensitive
//! route keys and the direction selectors a user can pick.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The transit systems shown on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystemId {
    /// Bus-rapid-transit trunk routes (regular and express)
    Trunk,
    /// Feeder routes into the trunk system
    Feeder,
    /// Dedicated-lane corridor network
    Corridor,
    /// Metro lines
    Metro,
    /// Crowd-sourced traditional routes, built lazily
    Traditional,
}

impl SystemId {
    pub const ALL: [SystemId; 5] = [
        SystemId::Trunk,
        SystemId::Feeder,
        SystemId::Corridor,
        SystemId::Metro,
        SystemId::Traditional,
    ];

    /// Short tag used in stop ids and keys
    pub fn tag(self) -> &'static str {
        match self {
            SystemId::Trunk => "met",
            SystemId::Feeder => "alim",
            SystemId::Corridor => "corr",
            SystemId::Metro => "metro",
            SystemId::Traditional => "wr",
        }
    }

    /// Human readable system name
    pub fn label(self) -> &'static str {
        match self {
            SystemId::Trunk => "Metropolitano",
            SystemId::Feeder => "Alimentadores",
            SystemId::Corridor => "Corredores",
            SystemId::Metro => "Metro",
            SystemId::Traditional => "Transporte tradicional",
        }
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Case-insensitive route key: `system:ID` with the id uppercased
///
/// Route ids are unique within a system regardless of case, so every lookup goes
/// through this key. The id is an `Arc<str>` because keys are cloned into the
/// registry, the hierarchy and the lazy builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub system: SystemId,
    id: Arc<str>,
}

impl RouteKey {
    pub fn new(system: SystemId, id: &str) -> Self {
        Self {
            system,
            id: normalize_id(id).into(),
        }
    }

    /// The normalized (trimmed, uppercase) route id
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system, self.id)
    }
}

/// Trim and uppercase a route id
pub fn normalize_id(id: &str) -> String {
    id.trim().to_uppercase()
}

/// Per-route direction selector for trunk and feeder routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Both directions ("ambas")
    #[default]
    Both,
    /// Northbound travel ("norte")
    North,
    /// Southbound travel ("sur")
    South,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Both, Direction::North, Direction::South];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ambas" | "both" => Some(Direction::Both),
            "norte" | "north" | "n" => Some(Direction::North),
            "sur" | "south" | "s" => Some(Direction::South),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Both => "Ambas",
            Direction::North => "Norte",
            Direction::South => "Sur",
        }
    }
}

/// Trip direction of a traditional route ("ida" outbound, "vuelta" return)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Trip {
    #[default]
    #[serde(rename = "ida")]
    Outbound,
    #[serde(rename = "vuelta")]
    Return,
}

impl Trip {
    /// Parses `ida`/`vuelta`, trip numbers and the common English spellings
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ida" | "1" | "outbound" | "out" => Some(Trip::Outbound),
            "vuelta" | "2" | "return" | "inbound" | "back" => Some(Trip::Return),
            _ => None,
        }
    }

    /// Trip number used in per-trip file names
    pub fn number(self) -> u8 {
        match self {
            Trip::Outbound => 1,
            Trip::Return => 2,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Trip::Outbound => "ida",
            Trip::Return => "vuelta",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Trip::Outbound => Trip::Return,
            Trip::Return => Trip::Outbound,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Trip::Outbound => "Ida",
            Trip::Return => "Vuelta",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_key_case_insensitive() {
        let a = RouteKey::new(SystemId::Feeder, " an-01 ");
        let b = RouteKey::new(SystemId::Feeder, "AN-01");
        assert_eq!(a, b);
        assert_eq!(a.id(), "AN-01");
        assert_eq!(a.to_string(), "alim:AN-01");
    }

    #[test]
    fn test_route_key_differs_by_system() {
        let a = RouteKey::new(SystemId::Corridor, "201");
        let b = RouteKey::new(SystemId::Traditional, "201");
        assert_ne!(a, b);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("Norte"), Some(Direction::North));
        assert_eq!(Direction::parse("sur"), Some(Direction::South));
        assert_eq!(Direction::parse("AMBAS"), Some(Direction::Both));
        assert_eq!(Direction::parse("east"), None);
    }

    #[test]
    fn test_trip_parse_and_other() {
        assert_eq!(Trip::parse("IDA"), Some(Trip::Outbound));
        assert_eq!(Trip::parse("2"), Some(Trip::Return));
        assert_eq!(Trip::Outbound.other(), Trip::Return);
        assert_eq!(Trip::Return.suffix(), "vuelta");
        assert_eq!(Trip::default(), Trip::Outbound);
    }
}
