//! Rendering surface abstraction
//!
//! The engine never draws pixels. It creates layer groups, fills them with
//! polylines and markers, attaches or detaches them, and asks for camera fits.
//! [`SceneSurface`] records all of that in memory; a map widget then paints the
//! attached shapes every frame.

use crate::color::Rgb;
use crate::model::Polyline;
use geo::{Coord, Rect};

/// Opaque handle to a layer group on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerHandle(pub u64);

/// Drawing pane; panes with a higher z-index are painted on top
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pane {
    Traditional,
    Corridor,
    Feeder,
    Metro,
    Trunk,
    /// Trunk routes drawn above every other trunk route
    TrunkPriority,
    Stops,
}

impl Pane {
    pub fn z_index(self) -> u16 {
        match self {
            Pane::Traditional => 390,
            Pane::Corridor => 400,
            Pane::Feeder => 410,
            Pane::Metro => 420,
            Pane::Trunk => 430,
            Pane::TrunkPriority => 440,
            Pane::Stops => 450,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: Rgb,
    pub weight: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub color: Rgb,
    pub radius: f32,
    pub fill_opacity: f32,
}

impl MarkerStyle {
    /// Circle marker tinted with the route color
    pub fn stop(color: Rgb) -> Self {
        Self {
            color,
            radius: 4.0,
            fill_opacity: 0.9,
        }
    }
}

/// Screen padding for a camera fit, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPadding {
    pub top_left: [f32; 2],
    pub bottom_right: [f32; 2],
}

impl FitPadding {
    /// Padding that keeps fitted geometry clear of a left sidebar
    pub fn with_sidebar(sidebar_width_px: f32) -> Self {
        Self {
            top_left: [sidebar_width_px + 20.0, 40.0],
            bottom_right: [30.0, 40.0],
        }
    }
}

/// Camera fit request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRequest {
    pub bounds: Rect<f64>,
    pub padding: FitPadding,
}

/// Grow bounds by a ratio of their size on every side
pub fn pad_bounds(bounds: Rect<f64>, ratio: f64) -> Rect<f64> {
    let dx = bounds.width() * ratio;
    let dy = bounds.height() * ratio;
    Rect::new(
        Coord {
            x: bounds.min().x - dx,
            y: bounds.min().y - dy,
        },
        Coord {
            x: bounds.max().x + dx,
            y: bounds.max().y + dy,
        },
    )
}

/// Drawing primitives the engine issues
pub trait RenderSurface {
    /// Create an empty, detached layer group
    fn create_group(&mut self) -> LayerHandle;

    /// Remove every shape from a group, keeping the group and its attachment
    fn clear_group(&mut self, group: LayerHandle);

    fn add_polyline(&mut self, group: LayerHandle, line: &Polyline, style: &LineStyle, pane: Pane);

    fn add_marker(
        &mut self,
        group: LayerHandle,
        at: Coord<f64>,
        label: &str,
        style: &MarkerStyle,
        pane: Pane,
    );

    fn attach(&mut self, group: LayerHandle);

    fn detach(&mut self, group: LayerHandle);

    fn is_attached(&self, group: LayerHandle) -> bool;

    fn fit_bounds(&mut self, request: FitRequest);
}

/// A shape recorded on a [`SceneSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Polyline {
        line: Polyline,
        style: LineStyle,
        pane: Pane,
    },
    Marker {
        at: Coord<f64>,
        label: String,
        style: MarkerStyle,
        pane: Pane,
    },
}

impl Shape {
    pub fn pane(&self) -> Pane {
        match self {
            Shape::Polyline { pane, .. } | Shape::Marker { pane, .. } => *pane,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LayerGroup {
    shapes: Vec<Shape>,
    attached: bool,
}

/// In-memory rendering surface
///
/// Keeps every group ever created; hiding a route only detaches its groups.
/// `revision` changes on every mutation so painters can cache their shape list.
#[derive(Debug, Clone, Default)]
pub struct SceneSurface {
    groups: Vec<LayerGroup>,
    fit_requests: Vec<FitRequest>,
    revision: u64,
}

impl SceneSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn group_mut(&mut self, group: LayerHandle) -> Option<&mut LayerGroup> {
        self.revision += 1;
        self.groups.get_mut(group.0 as usize)
    }

    /// Shapes of every attached group, ordered by pane z-index
    pub fn visible_shapes(&self) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self
            .groups
            .iter()
            .filter(|g| g.attached)
            .flat_map(|g| g.shapes.iter())
            .collect();
        shapes.sort_by_key(|s| s.pane().z_index());
        shapes
    }

    /// Shapes of one group, attached or not
    pub fn group_shapes(&self, group: LayerHandle) -> &[Shape] {
        self.groups
            .get(group.0 as usize)
            .map(|g| g.shapes.as_slice())
            .unwrap_or_default()
    }

    pub fn attached_group_count(&self) -> usize {
        self.groups.iter().filter(|g| g.attached).count()
    }

    /// Number of attached groups that hold at least one shape
    pub fn visible_group_count(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.attached && !g.shapes.is_empty())
            .count()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All fit requests issued so far
    pub fn fit_requests(&self) -> &[FitRequest] {
        &self.fit_requests
    }

    /// Take the most recent pending fit request, dropping older ones
    pub fn take_fit_request(&mut self) -> Option<FitRequest> {
        let last = self.fit_requests.pop();
        self.fit_requests.clear();
        last
    }
}

impl RenderSurface for SceneSurface {
    fn create_group(&mut self) -> LayerHandle {
        self.revision += 1;
        self.groups.push(LayerGroup::default());
        LayerHandle(self.groups.len() as u64 - 1)
    }

    fn clear_group(&mut self, group: LayerHandle) {
        if let Some(g) = self.group_mut(group) {
            g.shapes.clear();
        }
    }

    fn add_polyline(&mut self, group: LayerHandle, line: &Polyline, style: &LineStyle, pane: Pane) {
        if let Some(g) = self.group_mut(group) {
            g.shapes.push(Shape::Polyline {
                line: line.clone(),
                style: *style,
                pane,
            });
        }
    }

    fn add_marker(
        &mut self,
        group: LayerHandle,
        at: Coord<f64>,
        label: &str,
        style: &MarkerStyle,
        pane: Pane,
    ) {
        if let Some(g) = self.group_mut(group) {
            g.shapes.push(Shape::Marker {
                at,
                label: label.to_string(),
                style: *style,
                pane,
            });
        }
    }

    fn attach(&mut self, group: LayerHandle) {
        if let Some(g) = self.group_mut(group) {
            g.attached = true;
        }
    }

    fn detach(&mut self, group: LayerHandle) {
        if let Some(g) = self.group_mut(group) {
            g.attached = false;
        }
    }

    fn is_attached(&self, group: LayerHandle) -> bool {
        self.groups
            .get(group.0 as usize)
            .is_some_and(|g| g.attached)
    }

    fn fit_bounds(&mut self, request: FitRequest) {
        self.fit_requests.push(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    fn style() -> LineStyle {
        LineStyle {
            color: Rgb::new(1, 2, 3),
            weight: 4.0,
            opacity: 1.0,
        }
    }

    #[test]
    fn test_groups_detach_without_losing_shapes() {
        let mut surface = SceneSurface::new();
        let g = surface.create_group();
        let line = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]);
        surface.add_polyline(g, &line, &style(), Pane::Corridor);
        assert!(surface.visible_shapes().is_empty());

        surface.attach(g);
        assert_eq!(surface.visible_shapes().len(), 1);

        surface.detach(g);
        assert!(!surface.is_attached(g));
        assert_eq!(surface.group_shapes(g).len(), 1);
    }

    #[test]
    fn test_visible_shapes_ordered_by_pane() {
        let mut surface = SceneSurface::new();
        let line = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]);
        for pane in [Pane::TrunkPriority, Pane::Traditional, Pane::Trunk] {
            let g = surface.create_group();
            surface.add_polyline(g, &line, &style(), pane);
            surface.attach(g);
        }
        let panes: Vec<Pane> = surface.visible_shapes().iter().map(|s| s.pane()).collect();
        assert_eq!(panes, vec![Pane::Traditional, Pane::Trunk, Pane::TrunkPriority]);
    }

    #[test]
    fn test_take_fit_request_keeps_latest() {
        let mut surface = SceneSurface::new();
        let padding = FitPadding::with_sidebar(380.0);
        for i in 0..3 {
            let c = Coord { x: i as f64, y: 0.0 };
            surface.fit_bounds(FitRequest {
                bounds: Rect::new(c, c),
                padding,
            });
        }
        let last = surface.take_fit_request().unwrap();
        assert_eq!(last.bounds.min().x, 2.0);
        assert_eq!(last.padding.top_left, [400.0, 40.0]);
        assert!(surface.take_fit_request().is_none());
    }

    #[test]
    fn test_pad_bounds() {
        let rect = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 20.0 });
        let padded = pad_bounds(rect, 0.1);
        assert_eq!(padded.min(), Coord { x: -1.0, y: -2.0 });
        assert_eq!(padded.max(), Coord { x: 11.0, y: 22.0 });
    }
}
