//! Lazy Overlay Builder - traditional routes built on first display
//!
//! Traditional routes are many and rarely shown, so their geometry is only read
//! when a route is first requested. Builds are single-flight: while a build for
//! an id is in progress, further requests share the same future instead of
//! starting another fetch.
//!
//! Building and installing are separate steps. Build futures only fill the
//! shared cache and never touch the surface; [`LazyOverlayBuilder::flush`] then
//! installs every finished build whose route is still requested. A route hidden
//! while its build was in flight therefore stays built but detached.

use crate::catalog::Catalog;
use crate::color::{self, Rgb};
use crate::config::RenderConfig;
use crate::ids::{Trip, normalize_id};
use crate::model::TraditionalDefinition;
use crate::registry::OverlayHandles;
use crate::renderer::LayerRenderer;
use crate::surface::{LineStyle, MarkerStyle, Pane, RenderSurface};
use crate::traditional::{DisplayEntry, Pair, TraditionalGeometry, corridor_override_code};
use crate::Result;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use geo::Rect;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Line color of traditional routes without color data
const DEFAULT_COLOR: Rgb = Rgb::new(0x00, 0x00, 0x8c);

/// Reads the geometry of one traditional route
///
/// Implementations do the I/O; the builder guarantees at most one call per id
/// while a previous call for that id is still pending.
pub trait GeometrySource: Send + Sync {
    fn fetch(&self, definition: &TraditionalDefinition)
    -> BoxFuture<'static, Result<TraditionalGeometry>>;
}

type BuildFuture = Shared<BoxFuture<'static, bool>>;

enum BuildState {
    Building(BuildFuture),
    Built(Arc<TraditionalGeometry>),
}

type BuildCells = Arc<Mutex<HashMap<String, BuildState>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a show request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    /// Attached to the surface now
    Shown,
    /// Build queued or in flight; installed by a later flush
    Pending,
    /// No definition for this id
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct Overlay {
    handles: OverlayHandles,
    bounds: Option<Rect<f64>>,
}

pub struct LazyOverlayBuilder {
    definitions: HashMap<String, TraditionalDefinition>,
    colors: HashMap<String, Rgb>,
    source: Arc<dyn GeometrySource>,
    cells: BuildCells,
    /// Installed overlays, attached or not
    overlays: HashMap<String, Overlay>,
    /// Ids the user wants visible, with whether to fit once installed
    requested: HashMap<String, bool>,
    queued: Vec<BoxFuture<'static, bool>>,
    /// Structured pairing by logical id
    pairs: HashMap<String, Pair>,
}

impl LazyOverlayBuilder {
    /// Builder over a set of definitions
    ///
    /// Line colors are fixed here: routes named `CORR-<code>` take the corridor
    /// color of `<code>`, others their own color or a default blue.
    pub fn new(
        definitions: Vec<TraditionalDefinition>,
        source: Arc<dyn GeometrySource>,
        catalog: &Catalog,
    ) -> Self {
        let mut colors = HashMap::with_capacity(definitions.len());
        let definitions: HashMap<String, TraditionalDefinition> = definitions
            .into_iter()
            .map(|def| {
                let key = normalize_id(&def.id);
                let color = corridor_override_code(&key)
                    .and_then(|code| catalog.corridor_color(&code))
                    .unwrap_or_else(|| color::resolve(def.color.as_deref(), Some(DEFAULT_COLOR), &key));
                colors.insert(key.clone(), color);
                (key, def)
            })
            .collect();
        Self {
            definitions,
            colors,
            source,
            cells: Arc::new(Mutex::new(HashMap::new())),
            overlays: HashMap::new(),
            requested: HashMap::new(),
            queued: Vec::new(),
            pairs: HashMap::new(),
        }
    }

    /// Use the pairing of display entries as the first pairing source
    pub fn with_pairs(mut self, entries: &[DisplayEntry]) -> Self {
        self.pairs = entries
            .iter()
            .filter_map(|e| Some((normalize_id(&e.id), e.pair.clone()?)))
            .collect();
        self
    }

    pub fn definition(&self, id: &str) -> Option<&TraditionalDefinition> {
        self.definitions.get(&normalize_id(id))
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn color(&self, id: &str) -> Option<Rgb> {
        self.colors.get(&normalize_id(id)).copied()
    }

    pub fn is_built(&self, id: &str) -> bool {
        matches!(
            lock(&self.cells).get(&normalize_id(id)),
            Some(BuildState::Built(_))
        )
    }

    pub fn is_building(&self, id: &str) -> bool {
        matches!(
            lock(&self.cells).get(&normalize_id(id)),
            Some(BuildState::Building(_))
        )
    }

    fn is_known(&self, key: &str) -> bool {
        self.definitions.contains_key(key) || self.is_built(key)
    }

    /// Make sure a route's geometry is built; resolves to whether it is
    ///
    /// Built routes resolve immediately. A build in flight is shared. Failures
    /// are logged and resolve to `false`, leaving the route unbuilt so a later
    /// request retries.
    pub fn ensure_layer(&self, id: &str) -> BoxFuture<'static, bool> {
        let key = normalize_id(id);
        let Some(definition) = self.definitions.get(&key) else {
            return future::ready(false).boxed();
        };

        let mut cells = lock(&self.cells);
        match cells.get(&key) {
            Some(BuildState::Built(_)) => return future::ready(true).boxed(),
            Some(BuildState::Building(pending)) => return pending.clone().boxed(),
            None => {}
        }

        tracing::debug!("Building traditional route {}", key);
        let fetch = self.source.fetch(definition);
        let shared_cells = Arc::clone(&self.cells);
        let build_key = key.clone();
        let build = async move {
            match fetch.await {
                Ok(geometry) => {
                    lock(&shared_cells).insert(build_key, BuildState::Built(Arc::new(geometry)));
                    true
                }
                Err(e) => {
                    tracing::warn!("Failed to build traditional route {}: {}", build_key, e);
                    lock(&shared_cells).remove(&build_key);
                    false
                }
            }
        }
        .boxed()
        .shared();
        cells.insert(key, BuildState::Building(build.clone()));
        build.boxed()
    }

    /// Pairing of an id, structured data first, then the `-IDA`/`-VUELTA` convention
    ///
    /// `id` may be the logical base or either side.
    pub fn resolve_pair(&self, id: &str) -> Option<Pair> {
        let key = normalize_id(id);
        if let Some(pair) = self.pairs.get(&key) {
            return Some(pair.clone());
        }
        if let Some(pair) = self.pairs.values().find(|p| p.trip_of(&key).is_some()) {
            return Some(pair.clone());
        }
        convention_pair(&key).filter(|p| self.is_known(&p.ida) || self.is_known(&p.vuelta))
    }

    /// Request a route on the surface
    ///
    /// The counterpart of a paired side is hidden first. A logical pair id shows
    /// its `ida` side.
    pub fn show<S: RenderSurface>(
        &mut self,
        surface: &mut S,
        config: &RenderConfig,
        id: &str,
        fit: bool,
    ) -> ShowOutcome {
        let mut key = normalize_id(id);
        if let Some(pair) = self.resolve_pair(&key) {
            let trip = pair.trip_of(&key).unwrap_or(Trip::Outbound);
            self.hide_one(surface, pair.side(trip.other()));
            key = pair.side(trip).to_string();
        }
        if !self.is_known(&key) {
            tracing::debug!("Unknown traditional route {}", key);
            return ShowOutcome::Unknown;
        }

        self.requested.insert(key.clone(), fit);
        if self.install(surface, config, &key) {
            ShowOutcome::Shown
        } else {
            let build = self.ensure_layer(&key);
            self.queued.push(build);
            ShowOutcome::Pending
        }
    }

    /// Withdraw a request and detach the overlays; a pair id hides both sides
    pub fn hide<S: RenderSurface>(&mut self, surface: &mut S, id: &str) {
        let key = normalize_id(id);
        match self.pairs.get(&key).cloned().or_else(|| {
            convention_pair(&key).filter(|p| p.trip_of(&key).is_none())
        }) {
            Some(pair) => {
                self.hide_one(surface, &pair.ida);
                self.hide_one(surface, &pair.vuelta);
                self.hide_one(surface, &key);
            }
            None => self.hide_one(surface, &key),
        }
    }

    fn hide_one<S: RenderSurface>(&mut self, surface: &mut S, key: &str) {
        self.requested.remove(key);
        if let Some(overlay) = self.overlays.get(key) {
            surface.detach(overlay.handles.line);
            surface.detach(overlay.handles.stops);
        }
    }

    /// Install finished builds that are still requested
    ///
    /// Requests whose build failed are dropped. Returns how many routes were
    /// attached.
    pub fn flush<S: RenderSurface>(&mut self, surface: &mut S, config: &RenderConfig) -> usize {
        let waiting: Vec<String> = self
            .requested
            .keys()
            .filter(|k| !self.overlays.contains_key(*k))
            .cloned()
            .collect();
        let mut installed = 0;
        for key in waiting {
            if self.install(surface, config, &key) {
                installed += 1;
            } else if !self.is_building(&key) {
                tracing::debug!("Dropping request for unbuilt route {}", key);
                self.requested.remove(&key);
            }
        }
        installed
    }

    /// Build futures queued by `show`, for the host to drive
    pub fn take_queued(&mut self) -> Vec<BoxFuture<'static, bool>> {
        std::mem::take(&mut self.queued)
    }

    /// Whether some requested route is still waiting for its build
    pub fn has_pending(&self) -> bool {
        self.requested.keys().any(|k| !self.overlays.contains_key(k))
    }

    pub fn is_attached<S: RenderSurface>(&self, surface: &S, id: &str) -> bool {
        self.overlays
            .get(&normalize_id(id))
            .is_some_and(|o| surface.is_attached(o.handles.line))
    }

    pub fn is_requested(&self, id: &str) -> bool {
        self.requested.contains_key(&normalize_id(id))
    }

    /// Match stop layers of visible routes to the show-stops flag
    pub fn sync_stops<S: RenderSurface>(&self, surface: &mut S, show_stops: bool) {
        for key in self.requested.keys() {
            if let Some(overlay) = self.overlays.get(key) {
                if show_stops {
                    surface.attach(overlay.handles.stops);
                } else {
                    surface.detach(overlay.handles.stops);
                }
            }
        }
    }

    /// Attach a route if its geometry is available, creating overlays on first use
    fn install<S: RenderSurface>(&mut self, surface: &mut S, config: &RenderConfig, key: &str) -> bool {
        let overlay = match self.overlays.get(key) {
            Some(overlay) => *overlay,
            None => {
                let geometry = match lock(&self.cells).get(key) {
                    Some(BuildState::Built(geometry)) => Arc::clone(geometry),
                    _ => return false,
                };
                let overlay = self.draw(surface, config, key, &geometry);
                self.overlays.insert(key.to_string(), overlay);
                overlay
            }
        };

        surface.attach(overlay.handles.line);
        if config.show_stops {
            surface.attach(overlay.handles.stops);
        } else {
            surface.detach(overlay.handles.stops);
        }
        // fit only once per request
        let fit = self.requested.insert(key.to_string(), false).unwrap_or(false);
        if fit && let Some(bounds) = overlay.bounds {
            LayerRenderer::new(surface, config).fit(bounds);
        }
        true
    }

    fn draw<S: RenderSurface>(
        &self,
        surface: &mut S,
        config: &RenderConfig,
        key: &str,
        geometry: &TraditionalGeometry,
    ) -> Overlay {
        let color = self.colors.get(key).copied().unwrap_or(DEFAULT_COLOR);
        let handles = OverlayHandles {
            line: surface.create_group(),
            stops: surface.create_group(),
        };
        let style = LineStyle {
            color,
            weight: config.traditional_line_weight,
            opacity: config.traditional_line_opacity,
        };
        for line in &geometry.lines {
            surface.add_polyline(handles.line, line, &style, Pane::Traditional);
        }
        let marker = MarkerStyle::stop(color);
        for stop in &geometry.stops {
            surface.add_marker(handles.stops, stop.coord(), &stop.name, &marker, Pane::Stops);
        }
        tracing::trace!(
            "Installed traditional route {}: {} lines, {} stops",
            key,
            geometry.lines.len(),
            geometry.stops.len()
        );
        Overlay {
            handles,
            bounds: geometry.bounds,
        }
    }
}

/// Pair named by the `-IDA`/`-VUELTA` convention, whether or not it exists
pub fn convention_pair(id: &str) -> Option<Pair> {
    let key = normalize_id(id);
    let base = crate::catalog::strip_trip_suffix(&key);
    if base.is_empty() {
        return None;
    }
    Some(Pair {
        ida: format!("{}-IDA", base),
        vuelta: format!("{}-VUELTA", base),
    })
}
