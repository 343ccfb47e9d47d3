//! Route Registry - per-system routes, stops and overlay handles

use crate::ids::{SystemId, normalize_id};
use crate::model::{MacroTable, Route, Stop};
use crate::normalize::NormalizedSystem;
use crate::surface::LayerHandle;
use std::collections::{BTreeMap, HashMap};

/// Overlay groups of one rendered route
///
/// Created on first render and reused afterwards: re-rendering clears them,
/// hiding detaches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayHandles {
    pub line: LayerHandle,
    pub stops: LayerHandle,
}

/// Routes and stops of one transit system
#[derive(Debug, Clone)]
pub struct SystemRegistry {
    pub system: SystemId,
    routes: Vec<Route>,
    /// Uppercase id to position in `routes`
    index: HashMap<String, usize>,
    stops: HashMap<String, Stop>,
    macros: MacroTable,
    handles: HashMap<String, OverlayHandles>,
}

impl SystemRegistry {
    pub fn new(system: SystemId) -> Self {
        Self {
            system,
            routes: Vec::new(),
            index: HashMap::new(),
            stops: HashMap::new(),
            macros: MacroTable::new(),
            handles: HashMap::new(),
        }
    }

    /// Build from a normalized dataset; later duplicates of an id are dropped
    pub fn from_normalized(system: SystemId, data: NormalizedSystem) -> Self {
        let mut registry = Self::new(system);
        registry.stops = data.stops;
        registry.macros = data.macros;
        for route in data.routes {
            registry.insert(route);
        }
        registry
    }

    /// Insert a route, returning false when the id is already taken
    pub fn insert(&mut self, route: Route) -> bool {
        let key = normalize_id(&route.id);
        if self.index.contains_key(&key) {
            tracing::debug!("Duplicate route id {}:{} ignored", self.system, key);
            return false;
        }
        self.index.insert(key, self.routes.len());
        self.routes.push(route);
        true
    }

    /// Case-insensitive lookup
    pub fn get(&self, id: &str) -> Option<&Route> {
        self.index
            .get(&normalize_id(id))
            .and_then(|&i| self.routes.get(i))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn stop(&self, id: &str) -> Option<&Stop> {
        self.stops.get(id)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn handles(&self, id: &str) -> Option<OverlayHandles> {
        self.handles.get(&normalize_id(id)).copied()
    }

    /// Existing handles for a route, or new ones from `create`
    pub fn handles_or_insert_with(
        &mut self,
        id: &str,
        create: impl FnOnce() -> OverlayHandles,
    ) -> OverlayHandles {
        *self.handles.entry(normalize_id(id)).or_insert_with(create)
    }

    /// Ids of routes that have ever been rendered
    pub fn rendered_ids(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }
}

/// All transit systems
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    systems: BTreeMap<SystemId, SystemRegistry>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_system(&mut self, registry: SystemRegistry) {
        self.systems.insert(registry.system, registry);
    }

    pub fn system(&self, system: SystemId) -> Option<&SystemRegistry> {
        self.systems.get(&system)
    }

    /// Mutable access, creating an empty registry for unknown systems
    pub fn system_mut(&mut self, system: SystemId) -> &mut SystemRegistry {
        self.systems
            .entry(system)
            .or_insert_with(|| SystemRegistry::new(system))
    }

    pub fn route(&self, system: SystemId, id: &str) -> Option<&Route> {
        self.system(system)?.get(id)
    }

    pub fn total_routes(&self) -> usize {
        self.systems.values().map(SystemRegistry::len).sum()
    }

    pub fn systems(&self) -> impl Iterator<Item = &SystemRegistry> {
        self.systems.values()
    }
}
