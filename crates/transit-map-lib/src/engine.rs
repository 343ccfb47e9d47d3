//! Transit map engine
//!
//! [`TransitMap`] owns the registry, the checkbox trees, the lazy builder and
//! the rendering surface, and turns user intents into show/hide calls followed
//! by a tri-state sync. Bulk changes go through a [`Batch`], which keeps every
//! change silent and runs a single sync pass when it is dropped.

use crate::catalog::{Catalog, CorridorTypes};
use crate::config::{RenderConfig, TrunkFilter};
use crate::hierarchy::{self, SystemTree, TriState};
use crate::ids::{Direction, SystemId, Trip, normalize_id};
use crate::labels::Labeler;
use crate::lazy::{GeometrySource, LazyOverlayBuilder, ShowOutcome};
use crate::loader::{LoadReport, LoadedData};
use crate::model::extend_bounds;
use crate::registry::{RouteRegistry, SystemRegistry};
use crate::renderer::LayerRenderer;
use crate::search::{SearchDoc, SearchIndex};
use crate::surface::RenderSurface;
use crate::traditional::DisplayEntry;
use futures::future::BoxFuture;
use geo::Rect;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Whether a change may move the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    #[default]
    Auto,
    Silent,
}

impl FitMode {
    fn fits(self) -> bool {
        self == FitMode::Auto
    }
}

/// Counters for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Tri-state sync passes run
    pub tri_passes: u64,
    /// Route renders issued to the layer renderer
    pub renders: u64,
    /// Batches completed
    pub batches: u64,
}

/// Application state of the transit map
pub struct TransitMap<S: RenderSurface> {
    surface: S,
    config: RenderConfig,
    registry: RouteRegistry,
    catalog: Catalog,
    corridor_types: CorridorTypes,
    builder: LazyOverlayBuilder,
    entries: Vec<DisplayEntry>,
    trees: BTreeMap<SystemId, SystemTree>,
    labeler: Labeler,
    search: SearchIndex,
    report: LoadReport,
    stats: EngineStats,
}

impl<S: RenderSurface> TransitMap<S> {
    /// Build the engine over loaded data; nothing is drawn until routes are checked
    pub fn new(surface: S, config: RenderConfig, data: LoadedData, source: Arc<dyn GeometrySource>) -> Self {
        let LoadedData {
            registry,
            catalog,
            corridor_types,
            definitions,
            entries,
            labeler,
            report,
        } = data;

        let builder = LazyOverlayBuilder::new(definitions, source, &catalog).with_pairs(&entries);
        let search = SearchIndex::build(&registry, &entries, &labeler);
        let mut map = Self {
            surface,
            config,
            registry,
            catalog,
            corridor_types,
            builder,
            entries,
            trees: BTreeMap::new(),
            labeler,
            search,
            report,
            stats: EngineStats::default(),
        };
        map.rebuild_trees();
        tracing::info!(
            "Transit map ready: {} routes, {} search documents",
            map.registry.total_routes(),
            map.search.len()
        );
        map
    }

    fn rebuild_trees(&mut self) {
        let empty = |system| SystemRegistry::new(system);
        self.trees.clear();
        for system in SystemId::ALL {
            let owned;
            let registry = match self.registry.system(system) {
                Some(registry) => registry,
                None => {
                    owned = empty(system);
                    &owned
                }
            };
            let tree = match system {
                SystemId::Trunk => hierarchy::trunk_tree(registry, &self.labeler),
                SystemId::Feeder => hierarchy::feeder_tree(registry, &self.labeler),
                SystemId::Corridor => {
                    hierarchy::corridor_tree(registry, &self.catalog, &self.corridor_types, &self.labeler)
                }
                SystemId::Metro => hierarchy::metro_tree(registry, &self.labeler),
                SystemId::Traditional => {
                    hierarchy::traditional_tree(&self.entries, &self.catalog, &self.labeler)
                }
            };
            self.trees.insert(system, tree);
        }
        self.sync_all();
    }

    /// Check or uncheck one route, then sync its system
    ///
    /// Returns whether anything changed: unchanged state and unknown ids are no-ops.
    pub fn set_leaf(&mut self, system: SystemId, id: &str, checked: bool, fit: FitMode) -> bool {
        let changed = self.apply_leaf(system, id, checked, fit.fits(), &mut None);
        if changed {
            self.sync_tri(system);
        }
        changed
    }

    /// Check or uncheck every route under a group, then sync its system
    ///
    /// Routes are drawn silently; with [`FitMode::Auto`] the camera fits the
    /// union of what was drawn. Returns how many routes changed.
    pub fn set_group(&mut self, system: SystemId, key: &str, checked: bool, fit: FitMode) -> usize {
        let mut bounds = None;
        let changed = self.apply_group(system, key, checked, &mut bounds);
        self.sync_tri(system);
        if fit.fits()
            && let Some(bounds) = bounds
        {
            LayerRenderer::new(&mut self.surface, &self.config).fit(bounds);
        }
        changed
    }

    /// Start a batch of silent changes; tri-state syncs once when it drops
    pub fn batch(&mut self) -> Batch<'_, S> {
        Batch {
            map: self,
            changed: 0,
        }
    }

    /// Uncheck everything in one batch
    pub fn clear_all(&mut self) -> usize {
        let mut batch = self.batch();
        for system in SystemId::ALL {
            batch.set_system(system, false);
        }
        batch.changed()
    }

    /// Check every route of the eagerly drawn systems in one batch
    ///
    /// Traditional routes are left alone; they are selected through their own
    /// group checkboxes.
    pub fn select_all(&mut self) -> usize {
        let mut batch = self.batch();
        for system in SystemId::ALL {
            if system != SystemId::Traditional {
                batch.set_system(system, true);
            }
        }
        batch.changed()
    }

    /// Recompute the tri-state of one system
    pub fn sync_tri(&mut self, system: SystemId) -> TriState {
        self.stats.tri_passes += 1;
        let state = self
            .trees
            .get_mut(&system)
            .map(SystemTree::sync)
            .unwrap_or_default();
        tracing::trace!("Synced {} tri-state: {:?}", system, state);
        state
    }

    /// Recompute the tri-state of every system in one pass
    pub fn sync_all(&mut self) {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::sync_all");
        self.stats.tri_passes += 1;
        for tree in self.trees.values_mut() {
            tree.sync();
        }
    }

    /// Pick a trunk or feeder direction
    ///
    /// An unchecked route is checked silently; a checked one is redrawn in place.
    pub fn select_direction(&mut self, system: SystemId, id: &str, direction: Direction) -> bool {
        let Some(tree) = self.trees.get_mut(&system) else {
            return false;
        };
        let Some(leaf) = tree.leaf(id) else {
            return false;
        };
        let route_id = leaf.route_id.clone();
        let checked = leaf.checked;
        tree.update_leaf(&route_id, |l| l.direction = direction);
        if checked {
            self.draw(system, &route_id, &route_id, direction, true, false);
        } else {
            self.set_leaf(system, &route_id, true, FitMode::Silent);
        }
        true
    }

    /// Pick the ida or vuelta side of a traditional route
    ///
    /// A checked route swaps its attached side and stays checked.
    pub fn select_trip(&mut self, id: &str, trip: Trip) -> bool {
        let Some(tree) = self.trees.get_mut(&SystemId::Traditional) else {
            return false;
        };
        let Some(leaf) = tree.leaf(id) else {
            return false;
        };
        if leaf.pair.is_none() || leaf.trip == trip {
            return false;
        }
        let route_id = leaf.route_id.clone();
        let checked = leaf.checked;
        let label = self
            .entries
            .iter()
            .find(|e| normalize_id(&e.id) == route_id)
            .map(|e| self.labeler.traditional_label(e, trip));
        tree.update_leaf(&route_id, |l| {
            l.trip = trip;
            if let Some(label) = &label {
                l.label = label.clone();
            }
        });
        if checked && let Some(physical) = self.physical_id(SystemId::Traditional, &route_id) {
            self.builder.show(&mut self.surface, &self.config, &physical, true);
        }
        tracing::debug!("Traditional route {} now on {}", route_id, trip.suffix());
        true
    }

    /// Show a search result: check its route, or focus it when already checked
    ///
    /// Traditional results naming one side of a pair select that side.
    pub fn select_search_result(&mut self, doc: &SearchDoc) -> bool {
        let system = doc.system;
        let mut id = normalize_id(&doc.id);
        let Some(tree) = self.trees.get(&system) else {
            return false;
        };
        if tree.leaf(&id).is_none() && system == SystemId::Traditional {
            let base = crate::catalog::strip_trip_suffix(&id).to_string();
            let trip = tree
                .leaf(&base)
                .and_then(|l| l.pair.as_ref())
                .and_then(|p| p.trip_of(&id));
            if tree.leaf(&base).is_none() {
                return false;
            }
            id = base;
            if let Some(trip) = trip {
                self.select_trip(&id, trip);
            }
        }
        let Some(leaf) = self.trees.get(&system).and_then(|t| t.leaf(&id)) else {
            return false;
        };
        if !leaf.checked {
            return self.set_leaf(system, &id, true, FitMode::Auto);
        }
        let direction = leaf.direction;
        if let Some(physical) = self.physical_id(system, &id) {
            self.draw(system, &id, &physical, direction, true, true);
        }
        true
    }

    pub fn set_show_stops(&mut self, show_stops: bool) {
        if self.config.show_stops != show_stops {
            self.config.show_stops = show_stops;
            self.redraw_checked();
        }
    }

    pub fn set_trunk_filter(&mut self, filter: TrunkFilter) {
        if self.config.trunk_filter != filter {
            self.config.trunk_filter = filter;
            self.redraw_checked();
        }
    }

    /// Replace the render settings and redraw what is visible
    pub fn set_config(&mut self, config: RenderConfig) {
        self.config = config;
        self.redraw_checked();
    }

    /// Redraw every checked route silently and match traditional stop layers
    fn redraw_checked(&mut self) {
        let visible: Vec<(SystemId, String, Direction)> = self
            .trees
            .iter()
            .filter(|(system, _)| **system != SystemId::Traditional)
            .flat_map(|(system, tree)| {
                tree.root
                    .leaves()
                    .into_iter()
                    .filter(|l| l.checked)
                    .map(|l| (*system, l.route_id.clone(), l.direction))
                    .collect::<Vec<_>>()
            })
            .collect();
        tracing::debug!("Redrawing {} visible routes", visible.len());
        for (system, id, direction) in visible {
            self.draw(system, &id, &id, direction, true, false);
        }
        self.builder.sync_stops(&mut self.surface, self.config.show_stops);
    }

    /// Install finished traditional builds; call after build futures resolve
    pub fn flush_builds(&mut self) -> usize {
        self.builder.flush(&mut self.surface, &self.config)
    }

    /// Build futures queued since the last call, for the host to drive
    pub fn take_build_futures(&mut self) -> Vec<BoxFuture<'static, bool>> {
        self.builder.take_queued()
    }

    pub fn has_pending_builds(&self) -> bool {
        self.builder.has_pending()
    }

    /// Whether a route's line is attached to the surface
    ///
    /// `id` is the physical id for traditional routes.
    pub fn is_visible(&self, system: SystemId, id: &str) -> bool {
        match system {
            SystemId::Traditional => self.builder.is_attached(&self.surface, id),
            _ => self
                .registry
                .system(system)
                .and_then(|r| r.handles(id))
                .is_some_and(|h| self.surface.is_attached(h.line)),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn tree(&self, system: SystemId) -> Option<&SystemTree> {
        self.trees.get(&system)
    }

    pub fn trees(&self) -> impl Iterator<Item = &SystemTree> {
        self.trees.values()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    pub fn labeler(&self) -> &Labeler {
        &self.labeler
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn builder(&self) -> &LazyOverlayBuilder {
        &self.builder
    }

    /// Combined state of every non-empty system
    pub fn overall_state(&self) -> TriState {
        TriState::aggregate(
            self.trees
                .values()
                .filter(|t| t.leaf_count() > 0)
                .map(SystemTree::state),
        )
        .unwrap_or_default()
    }

    fn physical_id(&self, system: SystemId, id: &str) -> Option<String> {
        Some(self.trees.get(&system)?.leaf(id)?.physical_id().to_string())
    }

    /// Flip one leaf and show or hide its route, without syncing
    fn apply_leaf(
        &mut self,
        system: SystemId,
        id: &str,
        checked: bool,
        fit: bool,
        bounds: &mut Option<Rect<f64>>,
    ) -> bool {
        let Some(tree) = self.trees.get_mut(&system) else {
            return false;
        };
        let Some(leaf) = tree.leaf(id) else {
            tracing::debug!("No checkbox for {}:{}", system, id);
            return false;
        };
        if leaf.checked == checked {
            return false;
        }
        let route_id = leaf.route_id.clone();
        let physical = leaf.physical_id().to_string();
        let direction = leaf.direction;
        tree.update_leaf(&route_id, |l| l.checked = checked);

        if let Some(drawn) = self.draw(system, &route_id, &physical, direction, checked, fit) {
            *bounds = extend_bounds(*bounds, [drawn.min(), drawn.max()]);
        }
        true
    }

    fn apply_group(
        &mut self,
        system: SystemId,
        key: &str,
        checked: bool,
        bounds: &mut Option<Rect<f64>>,
    ) -> usize {
        let ids = match self.trees.get(&system) {
            Some(tree) => tree.leaf_ids(key),
            None => return 0,
        };
        tracing::debug!("Setting {} routes of {}/{} to {}", ids.len(), system, key, checked);
        ids.iter()
            .filter(|id| self.apply_leaf(system, id, checked, false, bounds))
            .count()
    }

    /// Show or hide a route on the surface; returns the drawn bounds
    fn draw(
        &mut self,
        system: SystemId,
        route_id: &str,
        physical: &str,
        direction: Direction,
        visible: bool,
        fit: bool,
    ) -> Option<Rect<f64>> {
        if system == SystemId::Traditional {
            if visible {
                let outcome = self.builder.show(&mut self.surface, &self.config, physical, fit);
                if outcome == ShowOutcome::Unknown {
                    tracing::debug!("Traditional route {} has no definition", physical);
                }
            } else {
                self.builder.hide(&mut self.surface, route_id);
            }
            return None;
        }

        let registry = self.registry.system_mut(system);
        let mut renderer = LayerRenderer::new(&mut self.surface, &self.config);
        if visible {
            self.stats.renders += 1;
            renderer.render(registry, route_id, direction, fit)
        } else {
            renderer.hide(registry, route_id);
            None
        }
    }
}

/// Scoped bulk change: silent, with one tri-state pass on drop
pub struct Batch<'a, S: RenderSurface> {
    map: &'a mut TransitMap<S>,
    changed: usize,
}

impl<S: RenderSurface> Batch<'_, S> {
    pub fn set_leaf(&mut self, system: SystemId, id: &str, checked: bool) -> bool {
        let changed = self.map.apply_leaf(system, id, checked, false, &mut None);
        self.changed += usize::from(changed);
        changed
    }

    pub fn set_group(&mut self, system: SystemId, key: &str, checked: bool) -> usize {
        let changed = self.map.apply_group(system, key, checked, &mut None);
        self.changed += changed;
        changed
    }

    /// Every route of a system
    pub fn set_system(&mut self, system: SystemId, checked: bool) -> usize {
        self.set_group(system, system.tag(), checked)
    }

    /// Routes changed so far
    pub fn changed(&self) -> usize {
        self.changed
    }
}

impl<S: RenderSurface> Drop for Batch<'_, S> {
    fn drop(&mut self) {
        self.map.stats.batches += 1;
        self.map.sync_all();
        tracing::debug!("Batch done: {} routes changed", self.changed);
    }
}
