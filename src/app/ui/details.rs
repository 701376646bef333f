use eframe::egui::{self, RichText, Ui};

use crate::mesh::{
    AgentRecord, DEFAULT_LINK_DISTANCE, DEFAULT_LINK_STRENGTH, DEFAULT_REPULSION, LinkKind,
    NodeKind,
};
use crate::util::{clip_label, format_age};

use super::super::{RenderGraph, ViewModel};
use super::controls::optional_slider;

struct NeighbourEntry {
    id: String,
    name: String,
    kind: LinkKind,
    signal_age_ms: Option<i64>,
}

fn neighbours_of(cache: &RenderGraph, selected_index: usize) -> Vec<NeighbourEntry> {
    let mut entries = cache
        .links
        .iter()
        .filter_map(|link| {
            let other = if link.source == selected_index {
                link.target
            } else if link.target == selected_index {
                link.source
            } else {
                return None;
            };
            let node = cache.nodes.get(other)?;
            Some(NeighbourEntry {
                id: node.id.clone(),
                name: node.display_name.clone(),
                kind: link.kind,
                signal_age_ms: link.signal.map(|signal| signal.age_ms),
            })
        })
        .collect::<Vec<_>>();

    entries.sort_by(|a, b| {
        a.kind
            .label()
            .cmp(b.kind.label())
            .then_with(|| a.signal_age_ms.cmp(&b.signal_age_ms))
            .then_with(|| a.name.cmp(&b.name))
    });
    entries
}

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui, agents: Option<&[AgentRecord]>) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let Some(selected_id) = self.selected.clone() else {
            ui.label("Select a node from the graph or the roster.");
            return;
        };

        let Some(cache) = self.graph_cache.as_ref() else {
            ui.label("No mesh yet.");
            return;
        };
        let Some(&selected_index) = cache.index_by_id.get(&selected_id) else {
            ui.label("Selected node is no longer part of the mesh.");
            return;
        };

        let node = &cache.nodes[selected_index];
        let kind = node.kind;
        let taxonomy = self.settings.taxonomy(node.group);

        ui.label(RichText::new(node.display_name.as_str()).strong());
        ui.small(node.id.as_str());
        ui.add_space(6.0);

        ui.label(format!("Kind: {}", kind.label()));
        ui.label(format!("Group: {}", taxonomy.label));
        if !node.status.is_empty() {
            ui.label(format!("Status: {}", node.status));
        }
        if let Some(operator) = &node.operator {
            ui.label(format!("Operator: {operator}"));
        }

        if kind == NodeKind::Agent
            && let Some(record) = agents
                .into_iter()
                .flatten()
                .find(|record| record.id == selected_id)
        {
            ui.label(format!("Host: {}", record.host_id));
            if let Some(version) = &record.version {
                ui.label(format!("Version: {version}"));
            }
            ui.label(format!("Last seen: {}", record.last_seen));
            if let Some(parent) = record.parent() {
                ui.label(format!("Parent: {parent}"));
            }
        }

        let neighbours = neighbours_of(cache, selected_index);

        ui.separator();
        ui.label(RichText::new(format!("Links ({})", neighbours.len())).strong());
        let mut clicked = None;
        if neighbours.is_empty() {
            ui.label("No links touch this node.");
        } else {
            egui::ScrollArea::vertical()
                .id_salt("neighbour_scroll")
                .max_height(240.0)
                .auto_shrink([false, true])
                .show(ui, |ui| {
                    for entry in &neighbours {
                        let label = match entry.signal_age_ms {
                            Some(age_ms) => format!(
                                "{}  [signal, {} ago]",
                                clip_label(&entry.name, 28),
                                format_age(age_ms)
                            ),
                            None => format!(
                                "{}  [{}]",
                                clip_label(&entry.name, 28),
                                entry.kind.label()
                            ),
                        };
                        if ui.link(label).on_hover_text(entry.id.as_str()).clicked() {
                            clicked = Some(entry.id.clone());
                        }
                    }
                });
        }

        ui.separator();
        self.draw_override_editor(ui, &selected_id);

        if clicked.is_some() {
            self.set_selected(clicked);
        }
    }

    fn draw_override_editor(&mut self, ui: &mut Ui, selected_id: &str) {
        ui.label(RichText::new("Overrides").strong());

        let mut style_changed = false;
        let mut forces_changed = false;
        {
            let entry = self.settings.node_override_mut(selected_id);

            ui.horizontal(|ui| {
                ui.label("Name");
                let mut name = entry.name.clone().unwrap_or_default();
                if ui
                    .text_edit_singleline(&mut name)
                    .on_hover_text("Leave empty to use the derived name.")
                    .changed()
                {
                    entry.name = (!name.is_empty()).then_some(name);
                    style_changed = true;
                }
            });

            forces_changed |= optional_slider(
                ui,
                &mut entry.repulsion,
                0.0..=500.0,
                DEFAULT_REPULSION,
                "Repulsion",
            );
            forces_changed |= optional_slider(
                ui,
                &mut entry.link_distance,
                10.0..=200.0,
                DEFAULT_LINK_DISTANCE,
                "Link distance",
            );
            forces_changed |= optional_slider(
                ui,
                &mut entry.link_strength,
                0.1..=5.0,
                DEFAULT_LINK_STRENGTH,
                "Link strength",
            );
            style_changed |= optional_slider(
                ui,
                &mut entry.size_multiplier,
                0.1..=5.0,
                1.0,
                "Size multiplier",
            );
        }

        let has_overrides = self
            .settings
            .node_override(selected_id)
            .is_some_and(|entry| !entry.is_empty());
        if ui
            .add_enabled(has_overrides, egui::Button::new("Reset overrides"))
            .clicked()
        {
            self.settings.node_overrides.remove(selected_id);
            style_changed = true;
            forces_changed = true;
        }

        if !style_changed && !forces_changed {
            // Opening the editor creates an empty entry; drop it unless it was edited.
            if !has_overrides {
                self.settings.node_overrides.remove(selected_id);
            }
            return;
        }

        self.pending.style |= style_changed;
        self.pending.forces |= forces_changed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::LayoutEngine;
    use crate::mesh::{
        GraphLink, GraphNode, LayoutState, MeshGraph, MeshSettings, NodeGroup, SignalTrace,
    };

    fn node(id: &str, name: &str) -> GraphNode {
        GraphNode {
            id: id.to_owned(),
            kind: NodeKind::Agent,
            group: NodeGroup::MainAgent,
            display_name: name.to_owned(),
            status: "active".to_owned(),
            operator: None,
            size_weight: 10.0,
            layout: LayoutState::default(),
        }
    }

    #[test]
    fn neighbours_list_structural_links_before_signals() {
        let graph = MeshGraph {
            nodes: vec![node("a", "Alpha"), node("b", "Bravo"), node("h", "Host")],
            links: vec![
                GraphLink {
                    source: "b".to_owned(),
                    target: "a".to_owned(),
                    kind: LinkKind::Signal,
                    signal: Some(SignalTrace {
                        curvature: 0.4,
                        opacity: 0.8,
                        age_ms: 6_000,
                    }),
                },
                GraphLink::structural("a", "h", LinkKind::Hardware),
            ],
        };
        let mut cache = RenderGraph::default();
        cache.apply(&graph, &MeshSettings::default().force_params());

        let entries = neighbours_of(&cache, 0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "h");
        assert_eq!(entries[0].signal_age_ms, None);
        assert_eq!(entries[1].id, "b");
        assert_eq!(entries[1].kind, LinkKind::Signal);
        assert_eq!(entries[1].signal_age_ms, Some(6_000));

        assert!(neighbours_of(&cache, 1).iter().all(|entry| entry.id == "a"));
    }
}
