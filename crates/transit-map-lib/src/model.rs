//! Route and stop records shared by every transit system
//!
//! Coordinates use the `geo` convention throughout: `x` is longitude and `y` is
//! latitude. Dataset readers swap `[lat, lon]` pairs into this order on the way in.

use crate::color::Rgb;
use crate::ids::{SystemId, Trip};
use geo::{Coord, LineString, Rect};
use std::collections::HashMap;

/// A drawable polyline in geographic coordinates
pub type Polyline = LineString<f64>;

/// A stop (station, bus stop or platform)
///
/// Owned by its system's stop registry and referenced by routes through `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Stop {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lon,
        }
    }

    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// Feeder zone, derived from the route code prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    North,
    South,
}

impl Zone {
    pub fn label(self) -> &'static str {
        match self {
            Zone::North => "Zona Norte",
            Zone::South => "Zona Sur",
        }
    }
}

/// System-specific route variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    TrunkRegular,
    TrunkExpress,
    Feeder(Zone),
    Corridor,
    Metro,
    Traditional,
}

impl RouteKind {
    pub fn system(self) -> SystemId {
        match self {
            RouteKind::TrunkRegular | RouteKind::TrunkExpress => SystemId::Trunk,
            RouteKind::Feeder(_) => SystemId::Feeder,
            RouteKind::Corridor => SystemId::Corridor,
            RouteKind::Metro => SystemId::Metro,
            RouteKind::Traditional => SystemId::Traditional,
        }
    }
}

/// Definition of a traditional route: where its geometry lives, not the geometry
#[derive(Debug, Clone, PartialEq)]
pub struct TraditionalDefinition {
    /// Physical route id, e.g. `1244-IDA`
    pub id: String,
    /// Data folder holding the route's line and stop documents
    pub folder: String,
    pub name: String,
    pub color: Option<String>,
    /// Trip used to pick per-trip files and features
    pub trip: Option<Trip>,
}

/// Geometry carried by a route, by variant
#[derive(Debug, Clone, PartialEq)]
pub enum RouteShape {
    /// Trunk regular: the ordered stop list of the route is its geometry
    StopSequence,
    /// Trunk express: one ordered stop list per travel direction
    Directional {
        north_south: Vec<String>,
        south_north: Vec<String>,
    },
    /// Feeder: segments without direction plus segments tagged by direction
    ///
    /// Untagged segments are classified by latitude delta at load time when no
    /// segment carries an explicit direction; flat segments land in both lists.
    Classified {
        undirected: Vec<Polyline>,
        north: Vec<Polyline>,
        south: Vec<Polyline>,
    },
    /// Corridor and metro: plain segment list
    Segments(Vec<Polyline>),
    /// Traditional: geometry materializes lazily from the definition
    Deferred(TraditionalDefinition),
}

/// A route (service) of any system
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Normalized (uppercase) id, unique within the system
    pub id: String,
    pub name: String,
    pub color: Rgb,
    pub kind: RouteKind,
    pub shape: RouteShape,
    /// Ordered stop ids; for directional routes the union of both directions
    pub stops: Vec<String>,
}

impl Route {
    pub fn system(&self) -> SystemId {
        self.kind.system()
    }

    /// Total number of coordinates carried inline
    pub fn point_count(&self) -> usize {
        let count = |lines: &[Polyline]| lines.iter().map(|l| l.0.len()).sum::<usize>();
        match &self.shape {
            RouteShape::Segments(lines) => count(lines),
            RouteShape::Classified {
                undirected,
                north,
                south,
            } => count(undirected) + count(north) + count(south),
            RouteShape::StopSequence | RouteShape::Directional { .. } => self.stops.len(),
            RouteShape::Deferred(_) => 0,
        }
    }
}

/// The shared trunk backbone for one physical corridor, per direction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroDefinition {
    pub north_south: Vec<Polyline>,
    pub south_north: Vec<Polyline>,
}

/// Macro definitions keyed by corridor id (`A`, `B`)
pub type MacroTable = HashMap<String, MacroDefinition>;

/// Grow an optional bounds accumulator by a set of coordinates
pub fn extend_bounds(bounds: Option<Rect<f64>>, coords: impl IntoIterator<Item = Coord<f64>>) -> Option<Rect<f64>> {
    coords.into_iter().fold(bounds, |acc, c| {
        Some(match acc {
            None => Rect::new(c, c),
            Some(r) => Rect::new(
                Coord {
                    x: r.min().x.min(c.x),
                    y: r.min().y.min(c.y),
                },
                Coord {
                    x: r.max().x.max(c.x),
                    y: r.max().y.max(c.y),
                },
            ),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_coord_order() {
        let stop = Stop::new("s1", "Central", -12.05, -77.04);
        let c = stop.coord();
        assert_eq!(c.x, -77.04);
        assert_eq!(c.y, -12.05);
    }

    #[test]
    fn test_extend_bounds() {
        let b = extend_bounds(
            None,
            [Coord { x: 1.0, y: 2.0 }, Coord { x: -1.0, y: 5.0 }],
        )
        .unwrap();
        assert_eq!(b.min(), Coord { x: -1.0, y: 2.0 });
        assert_eq!(b.max(), Coord { x: 1.0, y: 5.0 });
        assert!(extend_bounds(None, std::iter::empty()).is_none());
    }

    #[test]
    fn test_kind_system() {
        assert_eq!(RouteKind::TrunkExpress.system(), SystemId::Trunk);
        assert_eq!(RouteKind::Feeder(Zone::North).system(), SystemId::Feeder);
        assert_eq!(RouteKind::Traditional.system(), SystemId::Traditional);
    }
}
