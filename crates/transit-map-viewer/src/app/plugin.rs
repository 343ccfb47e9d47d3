//! Walkers plugin drawing the transit surface on the map view
//!
//! Shapes arrive already ordered by pane, so painting them in sequence keeps
//! stops above lines and priority trunk routes above the rest.

use egui::{Color32, Stroke};
use std::sync::Arc;
use transit_map_lib::{Rgb, Shape};
use walkers::{Plugin, Projector};

/// Hover distance for stop labels, in points
const HOVER_RADIUS: f32 = 8.0;

fn color(rgb: Rgb, opacity: f32) -> Color32 {
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color32::from_rgba_unmultiplied(rgb.r, rgb.g, rgb.b, alpha)
}

fn project(projector: &Projector, coord: geo::Coord<f64>) -> egui::Pos2 {
    let screen_vec = projector.project(walkers::lat_lon(coord.y, coord.x));
    egui::Pos2::new(screen_vec.x, screen_vec.y)
}

/// Plugin for rendering the visible route and stop layers
pub struct TransitPlugin {
    shapes: Arc<Vec<Shape>>,
}

impl TransitPlugin {
    pub fn new(shapes: Arc<Vec<Shape>>) -> Self {
        Self { shapes }
    }
}

impl Plugin for TransitPlugin {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        _map_memory: &walkers::MapMemory,
    ) {
        profiling::scope!("TransitPlugin::run");

        let painter = ui.painter();
        let viewport = response.rect.expand(HOVER_RADIUS);
        let hover = response.hover_pos();
        let mut hovered: Option<(egui::Pos2, &str)> = None;

        for shape in self.shapes.iter() {
            match shape {
                Shape::Polyline { line, style, .. } => {
                    let points: Vec<egui::Pos2> = line.0.iter().map(|c| project(projector, *c)).collect();
                    if points.len() >= 2 {
                        let stroke = Stroke::new(style.weight, color(style.color, style.opacity));
                        painter.add(egui::Shape::line(points, stroke));
                    }
                }
                Shape::Marker { at, label, style, .. } => {
                    let pos = project(projector, *at);
                    if !viewport.contains(pos) {
                        continue;
                    }
                    painter.circle(
                        pos,
                        style.radius,
                        color(style.color, style.fill_opacity),
                        Stroke::new(1.0, Color32::WHITE),
                    );
                    if let Some(hover) = hover
                        && hover.distance(pos) <= HOVER_RADIUS.max(style.radius)
                    {
                        hovered = Some((pos, label));
                    }
                }
            }
        }

        if let Some((pos, label)) = hovered {
            let galley = painter.layout_no_wrap(
                label.to_string(),
                egui::FontId::proportional(13.0),
                Color32::BLACK,
            );
            let rect = egui::Rect::from_min_size(pos + egui::vec2(10.0, -10.0), galley.size())
                .expand(4.0);
            painter.rect_filled(rect, 4.0, Color32::from_white_alpha(230));
            painter.galley(rect.min + egui::vec2(4.0, 4.0), galley, Color32::BLACK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_applies_opacity() {
        let c = color(Rgb { r: 228, g: 0, b: 43 }, 1.0);
        assert_eq!(c, Color32::from_rgb(228, 0, 43));
        let faded = color(Rgb { r: 0, g: 0, b: 0 }, 0.5);
        assert_eq!(faded.a(), 128);
        assert_eq!(color(Rgb { r: 0, g: 0, b: 0 }, 2.0).a(), 255);
    }
}
