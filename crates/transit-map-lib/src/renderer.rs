//! Layer Renderer - draws and clears route overlays
//!
//! Every render clears the route's line and stop groups before drawing, so
//! rendering the same route twice leaves exactly one copy of its geometry on the
//! surface. Groups are created on first render and reused afterwards.

use crate::config::RenderConfig;
use crate::ids::{Direction, SystemId};
use crate::model::{Polyline, Route, RouteKind, RouteShape, extend_bounds};
use crate::normalize::macro_corridor_for;
use crate::registry::{OverlayHandles, SystemRegistry};
use crate::surface::{
    FitPadding, FitRequest, LineStyle, MarkerStyle, Pane, RenderSurface, pad_bounds,
};
use crate::trim;
use geo::{Coord, LineString, Rect};
use smallvec::SmallVec;
use std::collections::HashSet;

/// Backbone orientation of trunk geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backbone {
    NorthSouth,
    SouthNorth,
}

/// What to draw for one route and direction
#[derive(Debug, Default)]
struct RenderPlan {
    lines: Vec<Polyline>,
    stops: Vec<(Coord<f64>, String)>,
}

/// Draws routes of one system onto a rendering surface
pub struct LayerRenderer<'a, S: RenderSurface> {
    surface: &'a mut S,
    config: &'a RenderConfig,
}

impl<'a, S: RenderSurface> LayerRenderer<'a, S> {
    pub fn new(surface: &'a mut S, config: &'a RenderConfig) -> Self {
        Self { surface, config }
    }

    /// Draw a route in the given direction, replacing whatever it showed before
    ///
    /// Unknown ids are a no-op. Returns the bounds of the drawn geometry. When
    /// `fit` is set and auto-fit is enabled the camera is moved to those bounds.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn render(
        &mut self,
        registry: &mut SystemRegistry,
        id: &str,
        direction: Direction,
        fit: bool,
    ) -> Option<Rect<f64>> {
        let route = registry.get(id)?;
        if matches!(route.shape, RouteShape::Deferred(_)) {
            return None;
        }
        let plan = self.plan(registry, route, direction);
        let line_style = LineStyle {
            color: route.color,
            weight: self.config.line_weight,
            opacity: self.config.line_opacity,
        };
        let marker_style = MarkerStyle::stop(route.color);
        let pane = self.pane_for(route);
        let route_id = route.id.clone();

        let handles = match registry.handles(&route_id) {
            Some(handles) => handles,
            None => {
                let created = OverlayHandles {
                    line: self.surface.create_group(),
                    stops: self.surface.create_group(),
                };
                registry.handles_or_insert_with(&route_id, || created)
            }
        };

        self.surface.clear_group(handles.line);
        self.surface.clear_group(handles.stops);

        let mut bounds = None;
        for line in &plan.lines {
            self.surface
                .add_polyline(handles.line, line, &line_style, pane);
            bounds = extend_bounds(bounds, line.0.iter().copied());
        }
        for (at, name) in &plan.stops {
            self.surface
                .add_marker(handles.stops, *at, name, &marker_style, Pane::Stops);
        }
        if bounds.is_none() {
            bounds = extend_bounds(None, plan.stops.iter().map(|(at, _)| *at));
        }

        self.surface.attach(handles.line);
        self.surface.attach(handles.stops);
        tracing::trace!(
            "Rendered {}:{} ({:?}): {} lines, {} stops",
            registry.system,
            route_id,
            direction,
            plan.lines.len(),
            plan.stops.len()
        );

        if fit && let Some(b) = bounds {
            self.fit(b);
        }
        bounds
    }

    /// Clear and detach a route's overlays; unknown or never-rendered ids are a no-op
    pub fn hide(&mut self, registry: &SystemRegistry, id: &str) {
        if let Some(handles) = registry.handles(id) {
            self.surface.clear_group(handles.line);
            self.surface.clear_group(handles.stops);
            self.surface.detach(handles.line);
            self.surface.detach(handles.stops);
        }
    }

    /// Whether a route currently has its line group attached
    pub fn is_rendered(&self, registry: &SystemRegistry, id: &str) -> bool {
        registry
            .handles(id)
            .is_some_and(|h| self.surface.is_attached(h.line))
    }

    /// Move the camera to bounds, honoring the auto-fit setting
    pub fn fit(&mut self, bounds: Rect<f64>) {
        if !self.config.auto_fit {
            return;
        }
        self.surface.fit_bounds(FitRequest {
            bounds: pad_bounds(bounds, self.config.fit_pad_ratio),
            padding: FitPadding::with_sidebar(self.config.sidebar_width_px),
        });
    }

    fn pane_for(&self, route: &Route) -> Pane {
        match route.system() {
            SystemId::Trunk if self.config.is_priority_trunk(&route.id) => Pane::TrunkPriority,
            SystemId::Trunk => Pane::Trunk,
            SystemId::Feeder => Pane::Feeder,
            SystemId::Corridor => Pane::Corridor,
            SystemId::Metro => Pane::Metro,
            SystemId::Traditional => Pane::Traditional,
        }
    }

    fn plan(&self, registry: &SystemRegistry, route: &Route, direction: Direction) -> RenderPlan {
        let lines = match &route.shape {
            RouteShape::Classified {
                undirected,
                north,
                south,
            } => feeder_lines(undirected, north, south, direction),
            RouteShape::Segments(segments) if !segments.is_empty() => segments.clone(),
            RouteShape::Segments(_) => stop_line(registry, &route.stops).into_iter().collect(),
            RouteShape::StopSequence | RouteShape::Directional { .. } => {
                self.trunk_lines(registry, route, direction)
            }
            RouteShape::Deferred(_) => Vec::new(),
        };

        let stops = if self.config.show_stops {
            // Express stops follow the same backbone choice as the lines
            let ids: &[String] = match self.backbones(direction).as_slice() {
                [only] if matches!(route.shape, RouteShape::Directional { .. }) => {
                    backbone_stops(route, *only)
                }
                _ => &route.stops,
            };
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| seen.insert(id.as_str()))
                .filter_map(|id| registry.stop(id))
                .map(|stop| (stop.coord(), stop.name.clone()))
                .collect()
        } else {
            Vec::new()
        };

        RenderPlan { lines, stops }
    }

    /// Backbones to draw for a direction
    ///
    /// Directions name the bus's travel: southbound ("sur") rides the
    /// north→south backbone, northbound ("norte") the south→north one.
    fn backbones(&self, direction: Direction) -> SmallVec<[Backbone; 2]> {
        let mut out = SmallVec::new();
        match direction {
            Direction::Both => {
                if self.config.trunk_filter.allows_north_south() {
                    out.push(Backbone::NorthSouth);
                }
                if self.config.trunk_filter.allows_south_north() {
                    out.push(Backbone::SouthNorth);
                }
            }
            Direction::North => out.push(Backbone::SouthNorth),
            Direction::South => out.push(Backbone::NorthSouth),
        }
        out
    }

    fn trunk_lines(
        &self,
        registry: &SystemRegistry,
        route: &Route,
        direction: Direction,
    ) -> Vec<Polyline> {
        let backbones = self.backbones(direction);
        let stop_ids = |backbone: Backbone| backbone_stops(route, backbone);

        // Shared backbone first
        let mut lines = Vec::new();
        if let Some(def) = registry.macros().get(macro_corridor_for(route)) {
            for backbone in &backbones {
                let shared = match backbone {
                    Backbone::NorthSouth => &def.north_south,
                    Backbone::SouthNorth => &def.south_north,
                };
                let coords = stop_coords(registry, stop_ids(*backbone));
                if let (Some(first), Some(last)) = (coords.first(), coords.last())
                    && coords.len() >= 2
                    && let Some(line) = trim::try_trim(shared, *first, *last)
                {
                    lines.push(line);
                }
            }
        }
        if !lines.is_empty() {
            return lines;
        }

        // Stop-to-stop fallback
        match route.kind {
            RouteKind::TrunkRegular => stop_line(registry, &route.stops).into_iter().collect(),
            _ => backbones
                .iter()
                .filter_map(|b| stop_line(registry, stop_ids(*b)))
                .collect(),
        }
    }
}

/// Stop ids a route serves along one backbone
fn backbone_stops(route: &Route, backbone: Backbone) -> &[String] {
    match (&route.shape, backbone) {
        (RouteShape::Directional { north_south, .. }, Backbone::NorthSouth) => north_south,
        (RouteShape::Directional { south_north, .. }, Backbone::SouthNorth) => south_north,
        _ => &route.stops,
    }
}

fn feeder_lines(
    undirected: &[Polyline],
    north: &[Polyline],
    south: &[Polyline],
    direction: Direction,
) -> Vec<Polyline> {
    match direction {
        Direction::Both if !undirected.is_empty() => undirected.to_vec(),
        Direction::Both => [north, south].concat(),
        Direction::North if !north.is_empty() => north.to_vec(),
        Direction::South if !south.is_empty() => south.to_vec(),
        Direction::North | Direction::South => undirected.to_vec(),
    }
}

fn stop_coords(registry: &SystemRegistry, ids: &[String]) -> Vec<Coord<f64>> {
    ids.iter()
        .filter_map(|id| registry.stop(id))
        .map(|s| s.coord())
        .collect()
}

/// Straight polyline through stops, without consecutive duplicate points
fn stop_line(registry: &SystemRegistry, ids: &[String]) -> Option<Polyline> {
    let mut coords = stop_coords(registry, ids);
    coords.dedup();
    (coords.len() >= 2).then(|| LineString::new(coords))
}
