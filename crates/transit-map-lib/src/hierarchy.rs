//! Hierarchy Reconciler - tri-state checkbox trees
//!
//! Every system is a tree: a root ("select all" for the system), nested groups,
//! and route leaves. Leaves are binary; groups and roots are checked,
//! unchecked or indeterminate, always derived bottom-up from their children.
//! Sub-groups are synchronized before their parent reads them, so a corridor
//! color group sees the fresh state of its "principal" and "feeder" tabs.

use crate::catalog::{
    Catalog, CorridorGroup, CorridorTab, CorridorTypes, TraditionalGroup, code_bases,
    service_sort_key,
};
use crate::color::Rgb;
use crate::ids::{Direction, SystemId, Trip, normalize_id};
use crate::labels::{Labeler, RouteLabel};
use crate::model::{Route, RouteKind, Zone};
use crate::registry::SystemRegistry;
use crate::traditional::{DisplayEntry, Pair};

/// Checkbox state of a group or root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unchecked,
    Checked,
    Indeterminate,
}

impl TriState {
    pub fn from_bool(checked: bool) -> Self {
        if checked {
            TriState::Checked
        } else {
            TriState::Unchecked
        }
    }

    /// Combine child states: all checked, none checked, or mixed
    ///
    /// `None` when there are no children.
    pub fn aggregate(states: impl IntoIterator<Item = TriState>) -> Option<TriState> {
        let mut all = true;
        let mut none = true;
        let mut any = false;
        for state in states {
            any = true;
            match state {
                TriState::Checked => none = false,
                TriState::Unchecked => all = false,
                TriState::Indeterminate => {
                    all = false;
                    none = false;
                }
            }
        }
        match (any, all, none) {
            (false, _, _) => None,
            (true, true, _) => Some(TriState::Checked),
            (true, _, true) => Some(TriState::Unchecked),
            _ => Some(TriState::Indeterminate),
        }
    }

    pub fn is_checked(self) -> bool {
        self == TriState::Checked
    }

    pub fn is_indeterminate(self) -> bool {
        self == TriState::Indeterminate
    }
}

/// A route checkbox
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub route_id: String,
    pub label: RouteLabel,
    pub color: Option<Rgb>,
    pub checked: bool,
    /// Ida/vuelta sides (traditional routes)
    pub pair: Option<Pair>,
    /// Selected trip (traditional routes)
    pub trip: Trip,
    /// Selected direction (trunk and feeder routes)
    pub direction: Direction,
}

impl LeafNode {
    pub fn new(route_id: &str, label: RouteLabel) -> Self {
        Self {
            route_id: normalize_id(route_id),
            label,
            color: None,
            checked: false,
            pair: None,
            trip: Trip::Outbound,
            direction: Direction::Both,
        }
    }

    /// Physical route drawn for the selected trip
    pub fn physical_id(&self) -> &str {
        match &self.pair {
            Some(pair) => pair.side(self.trip),
            None => &self.route_id,
        }
    }
}

/// A group checkbox with nested groups and leaves
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub key: String,
    pub label: String,
    pub color: Option<Rgb>,
    pub state: TriState,
    pub groups: Vec<GroupNode>,
    pub leaves: Vec<LeafNode>,
}

impl GroupNode {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            color: None,
            state: TriState::Unchecked,
            groups: Vec::new(),
            leaves: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.groups.iter().all(GroupNode::is_empty)
    }

    /// Recompute this group and every group below it; `None` when it holds no leaves
    pub fn sync(&mut self) -> Option<TriState> {
        let child_states: Vec<TriState> = self
            .groups
            .iter_mut()
            .filter_map(GroupNode::sync)
            .chain(self.leaves.iter().map(|l| TriState::from_bool(l.checked)))
            .collect();
        let state = TriState::aggregate(child_states);
        self.state = state.unwrap_or(TriState::Unchecked);
        state
    }

    /// Every leaf below this group, depth first
    pub fn leaves(&self) -> Vec<&LeafNode> {
        let mut out: Vec<&LeafNode> = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafNode>) {
        for group in &self.groups {
            group.collect_leaves(out);
        }
        out.extend(self.leaves.iter());
    }

    /// Apply `f` to every leaf with the given route id; returns how many matched
    pub fn for_each_leaf_mut(&mut self, route_id: &str, f: &mut impl FnMut(&mut LeafNode)) -> usize {
        let mut count = 0;
        for group in &mut self.groups {
            count += group.for_each_leaf_mut(route_id, f);
        }
        for leaf in self.leaves.iter_mut().filter(|l| l.route_id == route_id) {
            f(leaf);
            count += 1;
        }
        count
    }

    /// Find a group by key, this one included
    pub fn find(&self, key: &str) -> Option<&GroupNode> {
        if self.key == key {
            return Some(self);
        }
        self.groups.iter().find_map(|g| g.find(key))
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len() + self.groups.iter().map(GroupNode::leaf_count).sum::<usize>()
    }
}

/// Checkbox tree of one system
#[derive(Debug, Clone, PartialEq)]
pub struct SystemTree {
    pub system: SystemId,
    pub root: GroupNode,
}

impl SystemTree {
    pub fn new(system: SystemId) -> Self {
        Self {
            system,
            root: GroupNode::new(system.tag(), system.label()),
        }
    }

    /// Bottom-up recomputation of every group and the root
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn sync(&mut self) -> TriState {
        self.root.sync();
        self.root.state
    }

    pub fn state(&self) -> TriState {
        self.root.state
    }

    pub fn leaf(&self, route_id: &str) -> Option<&LeafNode> {
        let id = normalize_id(route_id);
        self.root.leaves().into_iter().find(|l| l.route_id == id)
    }

    /// Update every copy of a leaf (a route may sit in several groups)
    pub fn update_leaf(&mut self, route_id: &str, mut f: impl FnMut(&mut LeafNode)) -> bool {
        let id = normalize_id(route_id);
        self.root.for_each_leaf_mut(&id, &mut f) > 0
    }

    pub fn group(&self, key: &str) -> Option<&GroupNode> {
        self.root.find(key)
    }

    /// Distinct route ids of the leaves under a group
    pub fn leaf_ids(&self, key: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        if let Some(group) = self.group(key) {
            for leaf in group.leaves() {
                if !ids.contains(&leaf.route_id) {
                    ids.push(leaf.route_id.clone());
                }
            }
        }
        ids
    }

    /// Distinct ids of checked leaves
    pub fn checked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for leaf in self.root.leaves().into_iter().filter(|l| l.checked) {
            if !ids.contains(&leaf.route_id) {
                ids.push(leaf.route_id.clone());
            }
        }
        ids
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }
}

fn route_leaf(route: &Route, labeler: &Labeler, tab: Option<CorridorTab>) -> LeafNode {
    let mut leaf = LeafNode::new(&route.id, labeler.route_label(route, tab));
    leaf.color = Some(route.color);
    leaf
}

fn sorted_routes<'a>(routes: impl Iterator<Item = &'a Route>) -> Vec<&'a Route> {
    let mut routes: Vec<&Route> = routes.collect();
    routes.sort_by_key(|r| service_sort_key(&r.id));
    routes
}

/// Trunk tree: regular and express groups
pub fn trunk_tree(registry: &SystemRegistry, labeler: &Labeler) -> SystemTree {
    let mut tree = SystemTree::new(SystemId::Trunk);
    for (kind, key, label) in [
        (RouteKind::TrunkRegular, "regulares", "Rutas regulares"),
        (RouteKind::TrunkExpress, "expresos", "Expresos"),
    ] {
        let mut group = GroupNode::new(key, label);
        group.leaves = sorted_routes(registry.routes().iter().filter(|r| r.kind == kind))
            .into_iter()
            .map(|r| route_leaf(r, labeler, None))
            .collect();
        if !group.is_empty() {
            tree.root.groups.push(group);
        }
    }
    tree
}

/// Feeder tree: north and south zones
pub fn feeder_tree(registry: &SystemRegistry, labeler: &Labeler) -> SystemTree {
    let mut tree = SystemTree::new(SystemId::Feeder);
    for (zone, key) in [(Zone::North, "norte"), (Zone::South, "sur")] {
        let mut group = GroupNode::new(key, zone.label());
        group.leaves = sorted_routes(
            registry
                .routes()
                .iter()
                .filter(|r| r.kind == RouteKind::Feeder(zone)),
        )
        .into_iter()
        .map(|r| route_leaf(r, labeler, None))
        .collect();
        if !group.is_empty() {
            tree.root.groups.push(group);
        }
    }
    tree
}

/// Corridor tree: color group, then principal/feeder tab, then services
pub fn corridor_tree(
    registry: &SystemRegistry,
    catalog: &Catalog,
    types: &CorridorTypes,
    labeler: &Labeler,
) -> SystemTree {
    let mut tree = SystemTree::new(SystemId::Corridor);
    let routes = sorted_routes(registry.routes().iter());
    for color_group in CorridorGroup::ALL {
        let mut group = GroupNode::new(color_group.key(), color_group.label());
        group.color = color_group.color();
        for tab in [CorridorTab::Principal, CorridorTab::Feeder] {
            let mut tab_group = GroupNode::new(
                format!("{}/{}", color_group.key(), tab.key()),
                tab.label(),
            );
            tab_group.leaves = routes
                .iter()
                .filter(|r| catalog.corridor_group(&r.id) == color_group)
                .filter(|r| types.tab_for(&r.id) == tab)
                .map(|r| route_leaf(r, labeler, Some(tab)))
                .collect();
            if !tab_group.is_empty() {
                group.groups.push(tab_group);
            }
        }
        if !group.is_empty() {
            tree.root.groups.push(group);
        }
    }
    tree
}

/// Metro tree: lines directly under the root
pub fn metro_tree(registry: &SystemRegistry, labeler: &Labeler) -> SystemTree {
    let mut tree = SystemTree::new(SystemId::Metro);
    tree.root.leaves = sorted_routes(registry.routes().iter())
        .into_iter()
        .map(|r| route_leaf(r, labeler, None))
        .collect();
    tree
}

/// Traditional tree: one group per catalog group
///
/// The general transport group lists every entry unless the catalog restricts
/// it; the airport and San Isidro express groups only exist when configured.
pub fn traditional_tree(entries: &[DisplayEntry], catalog: &Catalog, labeler: &Labeler) -> SystemTree {
    let mut tree = SystemTree::new(SystemId::Traditional);
    for kind in TraditionalGroup::ALL {
        let filter = catalog.traditional_group_filter(kind);
        if filter.is_none() && kind != TraditionalGroup::Transport {
            continue;
        }
        let mut group = GroupNode::new(kind.key(), kind.label());
        group.leaves = entries
            .iter()
            .filter(|e| filter.is_none_or(|f| f.allows_any(&code_bases(&e.id))))
            .map(|e| traditional_leaf(e, labeler))
            .collect();
        if !group.is_empty() {
            tree.root.groups.push(group);
        }
    }
    tree
}

fn traditional_leaf(entry: &DisplayEntry, labeler: &Labeler) -> LeafNode {
    let mut leaf = LeafNode::new(&entry.id, labeler.traditional_label(entry, entry.default_trip));
    leaf.color = entry.color.as_deref().and_then(crate::color::parse_css);
    leaf.pair = entry.pair.clone();
    leaf.trip = entry.default_trip;
    leaf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CodeFilter;
    use crate::color::Rgb;
    use crate::model::RouteShape;

    fn leaf(id: &str, checked: bool) -> LeafNode {
        let mut leaf = LeafNode::new(id, RouteLabel::default());
        leaf.checked = checked;
        leaf
    }

    fn group(key: &str, leaves: &[(&str, bool)]) -> GroupNode {
        let mut group = GroupNode::new(key, key);
        group.leaves = leaves.iter().map(|(id, c)| leaf(id, *c)).collect();
        group
    }

    #[test]
    fn test_aggregate_rule() {
        use TriState::*;
        assert_eq!(TriState::aggregate(std::iter::empty()), None);
        assert_eq!(TriState::aggregate([Checked, Checked]), Some(Checked));
        assert_eq!(TriState::aggregate([Unchecked, Unchecked]), Some(Unchecked));
        assert_eq!(TriState::aggregate([Checked, Unchecked]), Some(Indeterminate));
        assert_eq!(TriState::aggregate([Indeterminate]), Some(Indeterminate));
    }

    #[test]
    fn test_tri_state_for_every_subset() {
        let ids = ["a", "b", "c"];
        for mask in 0u8..8 {
            let leaves: Vec<(&str, bool)> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, mask & (1 << i) != 0))
                .collect();
            let mut tree = SystemTree::new(SystemId::Metro);
            tree.root.groups.push(group("g", &leaves));
            tree.root.groups.push(group("other", &[("z", true)]));
            tree.sync();

            let g = tree.group("g").unwrap().state;
            let expected = match mask {
                0 => TriState::Unchecked,
                7 => TriState::Checked,
                _ => TriState::Indeterminate,
            };
            assert_eq!(g, expected, "mask {mask}");
            let top = if mask == 7 { TriState::Checked } else { TriState::Indeterminate };
            assert_eq!(tree.state(), top, "mask {mask}");
        }
    }

    #[test]
    fn test_nested_groups_sync_bottom_up() {
        let mut color = GroupNode::new("rojo", "Rojo");
        color.groups.push(group("rojo/principales", &[("201", true), ("202", true)]));
        color.groups.push(group("rojo/alimentadores", &[("250", false)]));
        let mut tree = SystemTree::new(SystemId::Corridor);
        tree.root.groups.push(color);
        tree.root.groups.push(GroupNode::new("vacio", "Vacío"));

        assert_eq!(tree.sync(), TriState::Indeterminate);
        assert_eq!(tree.group("rojo/principales").unwrap().state, TriState::Checked);
        assert_eq!(tree.group("rojo").unwrap().state, TriState::Indeterminate);

        tree.update_leaf("250", |l| l.checked = true);
        assert_eq!(tree.sync(), TriState::Checked, "empty groups are ignored");
    }

    #[test]
    fn test_update_leaf_reaches_every_copy() {
        let mut tree = SystemTree::new(SystemId::Traditional);
        tree.root.groups.push(group("transporte", &[("ET01", false)]));
        tree.root.groups.push(group("aerodirecto", &[("ET01", false)]));
        assert!(tree.update_leaf("et01", |l| l.checked = true));
        assert!(tree.root.leaves().iter().all(|l| l.checked));
        assert_eq!(tree.checked_ids(), vec!["ET01".to_string()]);
        assert!(!tree.update_leaf("nope", |l| l.checked = true));
    }

    fn corridor_route(id: &str) -> Route {
        Route {
            id: id.to_string(),
            name: String::new(),
            color: Rgb::new(0, 0, 0),
            kind: RouteKind::Corridor,
            shape: RouteShape::Segments(Vec::new()),
            stops: Vec::new(),
        }
    }

    #[test]
    fn test_corridor_tree_layout() {
        let mut registry = SystemRegistry::new(SystemId::Corridor);
        for id in ["209", "201", "250", "101", "SE02"] {
            registry.insert(corridor_route(id));
        }
        let tree = corridor_tree(&registry, &Catalog::default(), &CorridorTypes::default(), &Labeler::new());

        let keys: Vec<&str> = tree.root.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["amarillo", "rojo", "morado"]);
        let principal = tree.group("rojo/principales").unwrap();
        let ids: Vec<&str> = principal.leaves.iter().map(|l| l.route_id.as_str()).collect();
        assert_eq!(ids, vec!["201", "209"]);
        assert_eq!(tree.group("rojo/alimentadores").unwrap().leaves.len(), 1);
        assert_eq!(tree.leaf_count(), 5);
    }

    #[test]
    fn test_traditional_groups_follow_catalog() {
        let entries: Vec<DisplayEntry> = ["1244", "AERO1"]
            .iter()
            .map(|id| DisplayEntry {
                id: id.to_string(),
                name: String::new(),
                color: None,
                pair: None,
                default_trip: Trip::Outbound,
            })
            .collect();

        let open = traditional_tree(&entries, &Catalog::default(), &Labeler::new());
        assert_eq!(open.root.groups.len(), 1);
        assert_eq!(open.leaf_count(), 2);

        let catalog = Catalog {
            aerodirecto: Some(CodeFilter::new(Some(&["AERO1"][..]), &[])),
            transporte: Some(CodeFilter::new(None, &["AERO1"])),
            ..Catalog::default()
        };
        let split = traditional_tree(&entries, &catalog, &Labeler::new());
        assert_eq!(split.leaf_ids("transporte"), vec!["1244".to_string()]);
        assert_eq!(split.leaf_ids("aerodirecto"), vec!["AERO1".to_string()]);
    }
}
