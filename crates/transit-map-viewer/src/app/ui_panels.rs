//! UI panels for the application
//!
//! The sidebar never touches the engine directly: every click becomes an
//! [`Intent`] that is applied once the frame's UI pass is done.

use crate::app::state::{AppState, Intent, LoadStatus, SidebarTab, TilesProvider};
use egui::{Color32, RichText, Ui};
use transit_map_lib::{
    Direction, GroupNode, LeafNode, LoadReport, Rgb, SearchIndex, SystemId, SystemTree, TriState,
    Trip, TrunkFilter,
};

/// Checked state a click on a tri-state box asks for
///
/// A partially checked group checks everything.
fn next_checked(state: TriState) -> bool {
    !state.is_checked()
}

fn trunk_filter_label(filter: TrunkFilter) -> &'static str {
    match filter {
        TrunkFilter::Both => "Ambos sentidos",
        TrunkFilter::NorthSouth => "Norte → Sur",
        TrunkFilter::SouthNorth => "Sur → Norte",
    }
}

fn swatch(ui: &mut Ui, color: Option<Rgb>) {
    let Some(color) = color else {
        return;
    };
    let (rect, _) = ui.allocate_exact_size(egui::vec2(14.0, 4.0), egui::Sense::hover());
    ui.painter()
        .rect_filled(rect, 2.0, Color32::from_rgb(color.r, color.g, color.b));
}

/// Render the sidebar toggle button (overlaid on top-right of map)
pub fn sidebar_toggle_button(ui: &mut Ui, state: &mut AppState) {
    let button_size = egui::vec2(40.0, 40.0);
    let margin = 10.0;

    let rect = ui.max_rect();
    let button_pos = rect.right_top() + egui::vec2(-button_size.x - margin, margin);
    let button_rect = egui::Rect::from_min_size(button_pos, button_size);

    let response = ui.allocate_rect(button_rect, egui::Sense::click());

    if response.clicked() {
        state.ui_settings.sidebar_open = !state.ui_settings.sidebar_open;
    }

    let bg_color = if response.hovered() {
        ui.visuals().widgets.hovered.bg_fill
    } else {
        ui.visuals().widgets.inactive.bg_fill
    };
    ui.painter().rect_filled(button_rect, 5.0, bg_color);

    let icon = if state.ui_settings.sidebar_open {
        "✕"
    } else {
        "☰"
    };
    ui.painter().text(
        button_rect.center(),
        egui::Align2::CENTER_CENTER,
        icon,
        egui::FontId::proportional(20.0),
        ui.visuals().text_color(),
    );
}

/// Render the left sidebar and collect the intents of this frame
///
/// The panel width matches the padding reserved when the camera fits routes.
pub fn render_sidebar(ctx: &egui::Context, state: &mut AppState) -> Vec<Intent> {
    let mut intents = Vec::new();
    if !state.ui_settings.sidebar_open {
        return intents;
    }

    let width = state.config().sidebar_width_px;
    egui::SidePanel::left("main_sidebar")
        .exact_width(width)
        .resizable(false)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(
                    &mut state.ui_settings.active_tab,
                    SidebarTab::Routes,
                    "🚌 Rutas",
                );
                ui.selectable_value(
                    &mut state.ui_settings.active_tab,
                    SidebarTab::Settings,
                    "⚙ Ajustes",
                );
            });
            ui.separator();

            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| match state.ui_settings.active_tab {
                    SidebarTab::Routes => render_routes_tab(ui, state, &mut intents),
                    SidebarTab::Settings => render_settings_tab(ui, state, &mut intents),
                });
        });
    intents
}

fn render_status(ui: &mut Ui, status: &LoadStatus) {
    let color = match status {
        LoadStatus::Loading => ui.visuals().warn_fg_color,
        LoadStatus::Ready(_) => ui.visuals().weak_text_color(),
        LoadStatus::Failed(_) => ui.visuals().error_fg_color,
    };
    ui.label(RichText::new(status.text()).small().color(color));
}

/// Render the Routes tab
fn render_routes_tab(ui: &mut Ui, state: &mut AppState, intents: &mut Vec<Intent>) {
    render_status(ui, &state.status);
    if state.status.is_loading() {
        ui.spinner();
    }
    let Some(map) = state.map.as_ref() else {
        return;
    };
    ui.add_space(4.0);

    ui.add(
        egui::TextEdit::singleline(&mut state.ui_settings.search_query)
            .hint_text("🔍 Buscar ruta, código o empresa…")
            .desired_width(f32::INFINITY),
    );
    render_search_results(ui, map.search(), &state.ui_settings.search_query, intents);

    ui.add_space(6.0);
    ui.horizontal(|ui| {
        if ui.button("☑ Seleccionar todo").clicked() {
            intents.push(Intent::SelectAll);
        }
        if ui.button("🗑 Limpiar todo").clicked() {
            intents.push(Intent::ClearAll);
        }
    });
    ui.add_space(4.0);
    ui.separator();

    for tree in map.trees().filter(|t| t.leaf_count() > 0) {
        render_system(ui, tree, intents);
    }
}

fn render_search_results(ui: &mut Ui, index: &SearchIndex, query: &str, intents: &mut Vec<Intent>) {
    if query.trim().is_empty() {
        return;
    }
    let results = index.search(query);
    if results.is_empty() {
        ui.label(RichText::new("Sin resultados").small().weak());
        return;
    }
    egui::ScrollArea::vertical()
        .id_salt("search_results")
        .max_height(180.0)
        .show(ui, |ui| {
            for doc in results {
                let text = format!("{} · {}", doc.system.label(), doc.label);
                if ui.selectable_label(false, RichText::new(text).small()).clicked() {
                    intents.push(Intent::Search(doc.clone()));
                }
            }
        });
}

/// One system: a collapsible tri-state root
fn render_system(ui: &mut Ui, tree: &SystemTree, intents: &mut Vec<Intent>) {
    let id = ui.make_persistent_id(("system", tree.system.tag()));
    egui::collapsing_header::CollapsingState::load_with_default_open(ui.ctx(), id, false)
        .show_header(ui, |ui| {
            let state = tree.state();
            let mut checked = state.is_checked();
            let label = RichText::new(format!("{} ({})", tree.system.label(), tree.leaf_count())).strong();
            if ui
                .add(egui::Checkbox::new(&mut checked, label).indeterminate(state.is_indeterminate()))
                .clicked()
            {
                intents.push(Intent::Group {
                    system: tree.system,
                    key: tree.root.key.clone(),
                    checked: next_checked(state),
                });
            }
        })
        .body(|ui| render_group_body(ui, tree.system, &tree.root, intents));
}

fn render_group_body(ui: &mut Ui, system: SystemId, group: &GroupNode, intents: &mut Vec<Intent>) {
    for child in &group.groups {
        render_group(ui, system, child, intents);
    }
    for leaf in &group.leaves {
        render_leaf(ui, system, leaf, intents);
    }
}

fn render_group(ui: &mut Ui, system: SystemId, group: &GroupNode, intents: &mut Vec<Intent>) {
    let id = ui.make_persistent_id(("group", system.tag(), group.key.as_str()));
    egui::collapsing_header::CollapsingState::load_with_default_open(ui.ctx(), id, false)
        .show_header(ui, |ui| {
            let mut checked = group.state.is_checked();
            if ui
                .add(egui::Checkbox::new(&mut checked, group.label.as_str()).indeterminate(group.state.is_indeterminate()))
                .clicked()
            {
                intents.push(Intent::Group {
                    system,
                    key: group.key.clone(),
                    checked: next_checked(group.state),
                });
            }
            swatch(ui, group.color);
        })
        .body(|ui| render_group_body(ui, system, group, intents));
}

fn render_leaf(ui: &mut Ui, system: SystemId, leaf: &LeafNode, intents: &mut Vec<Intent>) {
    ui.horizontal(|ui| {
        let mut checked = leaf.checked;
        if ui.checkbox(&mut checked, leaf.label.title.as_str()).changed() {
            intents.push(Intent::Leaf {
                system,
                id: leaf.route_id.clone(),
                checked,
            });
        }
        swatch(ui, leaf.color);
    });

    ui.indent(("leaf", system.tag(), leaf.route_id.as_str()), |ui| {
        for line in [&leaf.label.subtitle, &leaf.label.detail].into_iter().flatten() {
            ui.label(RichText::new(line).small().weak());
        }

        match system {
            SystemId::Trunk | SystemId::Feeder => {
                ui.horizontal(|ui| {
                    for direction in Direction::ALL {
                        if ui
                            .selectable_label(leaf.direction == direction, RichText::new(direction.label()).small())
                            .clicked()
                        {
                            intents.push(Intent::Direction {
                                system,
                                id: leaf.route_id.clone(),
                                direction,
                            });
                        }
                    }
                });
            }
            SystemId::Traditional if leaf.pair.is_some() => {
                ui.horizontal(|ui| {
                    for trip in [Trip::Outbound, Trip::Return] {
                        if ui
                            .selectable_label(leaf.trip == trip, RichText::new(trip.label()).small())
                            .clicked()
                        {
                            intents.push(Intent::Trip {
                                id: leaf.route_id.clone(),
                                trip,
                            });
                        }
                    }
                });
            }
            _ => {}
        }
    });
}

/// Render the Settings tab
fn render_settings_tab(ui: &mut Ui, state: &mut AppState, intents: &mut Vec<Intent>) {
    let config = state.config().clone();
    let loaded = state.map.is_some();

    ui.add_enabled_ui(loaded, |ui| {
        ui.label(RichText::new("🎨 Apariencia").strong());
        ui.add_space(6.0);

        egui::Grid::new("appearance_grid")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                ui.label("Grosor de línea:");
                let mut width = config.line_weight;
                if ui
                    .add(
                        egui::Slider::new(&mut width, 1.0..=12.0)
                            .suffix(" px")
                            .step_by(0.5),
                    )
                    .changed()
                {
                    intents.push(Intent::LineWidth(width));
                }
                ui.end_row();

                ui.label("Paraderos:");
                let mut show_stops = config.show_stops;
                if ui.checkbox(&mut show_stops, "Mostrar paraderos").changed() {
                    intents.push(Intent::ShowStops(show_stops));
                }
                ui.end_row();

                ui.label("Cámara:");
                let mut auto_fit = config.auto_fit;
                if ui.checkbox(&mut auto_fit, "Centrar al marcar una ruta").changed() {
                    intents.push(Intent::AutoFit(auto_fit));
                }
                ui.end_row();
            });

        ui.add_space(12.0);
        ui.separator();
        ui.add_space(8.0);

        ui.label(RichText::new("🚍 Metropolitano").strong());
        ui.add_space(6.0);
        ui.label(RichText::new("Sentido de los expresos en ambas direcciones").small().weak());
        for filter in [TrunkFilter::Both, TrunkFilter::NorthSouth, TrunkFilter::SouthNorth] {
            if ui
                .selectable_label(config.trunk_filter == filter, trunk_filter_label(filter))
                .clicked()
                && config.trunk_filter != filter
            {
                intents.push(Intent::TrunkFilter(filter));
            }
        }
    });

    ui.add_space(12.0);
    ui.separator();
    ui.add_space(8.0);

    ui.label(RichText::new("🗺 Mapa").strong());
    ui.add_space(6.0);
    for provider in TilesProvider::all() {
        let selected = state.ui_settings.tiles_provider == *provider;
        if ui.selectable_label(selected, provider.name()).clicked() {
            state.ui_settings.tiles_provider = *provider;
        }
    }
    ui.add_space(4.0);
    ui.label(
        RichText::new(state.ui_settings.tiles_provider.attribution())
            .small()
            .italics()
            .weak(),
    );

    if let Some(map) = &state.map {
        ui.add_space(12.0);
        ui.separator();
        ui.add_space(8.0);
        render_report(ui, map.report());
    }

    ui.add_space(12.0);
    ui.separator();
    ui.add_space(8.0);

    ui.label(RichText::new("ℹ Acerca de").strong());
    ui.add_space(4.0);
    ui.label(RichText::new("Mapa de transporte de Lima").small());
    ui.label(
        RichText::new("Metropolitano, alimentadores, corredores, metro y transporte tradicional")
            .small()
            .weak(),
    );
}

/// Per-system dataset summary
fn render_report(ui: &mut Ui, report: &LoadReport) {
    ui.label(RichText::new("📊 Datos").strong());
    ui.add_space(4.0);

    egui::Grid::new("report_grid")
        .num_columns(3)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            for load in &report.systems {
                ui.label(load.system.label());
                ui.label(RichText::new(format!("{} rutas", load.routes)).strong());
                match &load.error {
                    Some(error) => ui.label(RichText::new(error).small().color(Color32::RED)),
                    None if load.skipped > 0 => {
                        ui.label(RichText::new(format!("{} omitidas", load.skipped)).small().weak())
                    }
                    None => ui.label(RichText::new(format!("{} paraderos", load.stops)).small().weak()),
                };
                ui.end_row();
            }
        });

    for warning in &report.warnings {
        ui.label(
            RichText::new(format!("⚠ {}", warning))
                .small()
                .color(ui.visuals().warn_fg_color),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_on_partial_group_checks_all() {
        assert!(next_checked(TriState::Indeterminate));
        assert!(next_checked(TriState::Unchecked));
        assert!(!next_checked(TriState::Checked));
    }

    #[test]
    fn test_trunk_filter_labels() {
        assert_eq!(trunk_filter_label(TrunkFilter::NorthSouth), "Norte → Sur");
        assert_eq!(trunk_filter_label(TrunkFilter::Both), "Ambos sentidos");
    }
}
