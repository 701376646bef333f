use eframe::egui::{self, Align, Context, Layout, Vec2};

use crate::mesh::{LayerVisibility, LinkKind, MeshSettings};
use crate::util::format_age;

use super::super::{Activity, FeedStatus, PendingEdits, ViewModel};

fn age_text(label: &str, age: Option<std::time::Duration>) -> String {
    match age {
        Some(age) => format!("{label}: {} ago", format_age(age.as_millis() as i64)),
        None => format!("{label}: waiting"),
    }
}

impl ViewModel {
    pub(in crate::app) fn new(settings: MeshSettings) -> Self {
        Self {
            settings,
            layers: LayerVisibility::default(),
            search: String::new(),
            memory_filter: String::new(),
            selected: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            live_physics: true,
            physics_intensity: 1.0,
            physics_repulsion: 1.0,
            physics_spring: 1.0,
            physics_collision: 1.0,
            physics_velocity_damping: 0.9,
            physics_target_spread: 1.0,
            physics_spread_force: 0.02,
            show_quadtree_overlay: false,
            highlight_signal_partners: true,
            render_graph_revision: 0,
            graph_cache: None,
            search_match_cache: None,
            pending: PendingEdits::default(),
            visible_node_count: 0,
            visible_edge_count: 0,
        }
    }

    fn visible_graph_text(&self) -> Option<String> {
        let cache = self.graph_cache.as_ref()?;
        Some(format!(
            "visible {}/{} nodes, {}/{} links",
            self.visible_node_count,
            cache.nodes.len(),
            self.visible_edge_count,
            cache.links.len()
        ))
    }

    pub(in crate::app) fn show(
        &mut self,
        ctx: &Context,
        status: &FeedStatus,
        activity: &Activity<'_>,
    ) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("mesh-visor");
                    ui.separator();
                    if let Some(cache) = &self.graph_cache {
                        let signals = cache
                            .links
                            .iter()
                            .filter(|link| link.kind == LinkKind::Signal)
                            .count();
                        ui.label(format!("nodes: {}", cache.nodes.len()));
                        ui.label(format!("links: {}", cache.links.len()));
                        ui.label(format!("signals: {signals}"));
                    }
                    ui.separator();
                    ui.label(age_text("roster", status.roster_age));
                    ui.label(age_text("history", status.history_age));
                    if status.disconnected {
                        ui.colored_label(egui::Color32::from_rgb(240, 110, 90), "feeds stopped");
                    }
                    if ui.button("Reset view").clicked() {
                        self.reset_view();
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if let Some(visible_graph_text) = self.visible_graph_text() {
                            ui.label(visible_graph_text);
                        }
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .id_salt("controls_scroll")
                    .show(ui, |ui| self.draw_controls(ui));
            });

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .id_salt("details_scroll")
                    .show(ui, |ui| {
                        self.draw_details(ui, activity.agents);
                        if self.selected_agent_id().is_some() {
                            ui.separator();
                            self.draw_knowledge(ui, activity);
                        }
                    });
            });

        egui::TopBottomPanel::bottom("message_log")
            .resizable(true)
            .default_height(170.0)
            .show(ctx, |ui| self.draw_message_log(ui, activity.messages));

        egui::CentralPanel::default().show(ctx, |ui| {
            if activity.agents.is_none() {
                ui.vertical_centered(|ui| {
                    ui.add_space(120.0);
                    ui.heading("Waiting for the first agent roster...");
                    ui.add_space(8.0);
                    ui.spinner();
                });
            } else {
                self.draw_graph(ui);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn feed_ages_read_naturally() {
        assert_eq!(age_text("roster", None), "roster: waiting");
        assert_eq!(
            age_text("history", Some(Duration::from_millis(4_200))),
            "history: 4.2 s ago"
        );
    }
}
