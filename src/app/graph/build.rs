use std::collections::HashMap;

use crate::mesh::{DEFAULT_REPULSION, ForceParams, GraphNode, LayoutState, MeshGraph, NodeGroup};

use super::super::render_utils::node_radius;
use super::super::{LayoutEngine, RenderGraph, RenderLink, RenderNode, ViewModel};

fn charge_for(forces: &ForceParams, id: &str) -> f32 {
    (forces.repulsion(id) / DEFAULT_REPULSION).max(0.0)
}

impl RenderNode {
    fn from_graph(node: &GraphNode, forces: &ForceParams) -> Self {
        Self {
            id: node.id.clone(),
            display_name: node.display_name.clone(),
            kind: node.kind,
            group: node.group,
            status: node.status.clone(),
            operator: node.operator.clone(),
            world_pos: node.layout.position,
            velocity: node.layout.velocity,
            base_radius: node_radius(node.size_weight),
            charge: charge_for(forces, &node.id),
        }
    }
}

impl RenderGraph {
    pub(in crate::app) fn layout_states(&self) -> impl Iterator<Item = (&str, LayoutState)> + '_ {
        self.nodes.iter().map(|node| {
            (
                node.id.as_str(),
                LayoutState {
                    position: node.world_pos,
                    velocity: node.velocity,
                },
            )
        })
    }
}

impl LayoutEngine for RenderGraph {
    fn apply(&mut self, graph: &MeshGraph, forces: &ForceParams) {
        let nodes = graph
            .nodes
            .iter()
            .map(|node| RenderNode::from_graph(node, forces))
            .collect::<Vec<_>>();

        let mut index_by_id = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            index_by_id.insert(node.id.clone(), index);
        }

        let mut neighbors = vec![Vec::new(); nodes.len()];
        let mut links = Vec::with_capacity(graph.links.len());
        for link in &graph.links {
            let (Some(&source), Some(&target)) = (
                index_by_id.get(&link.source),
                index_by_id.get(&link.target),
            ) else {
                continue;
            };
            if source == target {
                continue;
            }

            if !neighbors[source].contains(&target) {
                neighbors[source].push(target);
                neighbors[target].push(source);
            }
            links.push(RenderLink {
                source,
                target,
                kind: link.kind,
                signal: link.signal,
                distance: forces.link_distance(&link.source, &link.target),
                strength: forces.link_strength(&link.source, &link.target),
            });
        }

        self.hub_index = nodes.iter().position(|node| node.group == NodeGroup::Hub);
        self.nodes = nodes;
        self.links = links;
        self.index_by_id = index_by_id;
        self.neighbors = neighbors;
        self.view_scratch.draw_order_dirty = true;
    }

    fn set_forces(&mut self, forces: &ForceParams) {
        for node in &mut self.nodes {
            node.charge = charge_for(forces, &node.id);
        }

        for link in &mut self.links {
            let (Some(source), Some(target)) =
                (self.nodes.get(link.source), self.nodes.get(link.target))
            else {
                continue;
            };
            link.distance = forces.link_distance(&source.id, &target.id);
            link.strength = forces.link_strength(&source.id, &target.id);
        }
    }
}

impl ViewModel {
    pub(in crate::app) fn apply_graph(&mut self, graph: &MeshGraph, forces: &ForceParams) {
        self.render_graph_revision = self.render_graph_revision.wrapping_add(1);
        self.search_match_cache = None;

        let cache = self.graph_cache.get_or_insert_with(RenderGraph::default);
        cache.apply(graph, forces);
        self.visible_node_count = cache.nodes.len();
        self.visible_edge_count = cache.links.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{DEFAULT_LINK_DISTANCE, GraphLink, LinkKind, MeshSettings, NodeKind};
    use eframe::egui::vec2;

    fn node(id: &str, group: NodeGroup, x: f32) -> GraphNode {
        GraphNode {
            id: id.to_owned(),
            kind: NodeKind::Agent,
            group,
            display_name: id.to_owned(),
            status: "active".to_owned(),
            operator: None,
            size_weight: 10.0,
            layout: LayoutState {
                position: vec2(x, 0.0),
                velocity: vec2(0.5, 0.0),
            },
        }
    }

    fn sample() -> MeshGraph {
        MeshGraph {
            nodes: vec![
                node("a1", NodeGroup::MainAgent, -40.0),
                node("hub", NodeGroup::Hub, 0.0),
                node("a2", NodeGroup::SubAgent, 40.0),
            ],
            links: vec![
                GraphLink::structural("a1", "hub", LinkKind::Hardware),
                GraphLink::structural("a2", "hub", LinkKind::Hardware),
                GraphLink::structural("a2", "ghost", LinkKind::Dependency),
            ],
        }
    }

    #[test]
    fn apply_seeds_from_carried_layout() {
        let mut engine = RenderGraph::default();
        engine.apply(&sample(), &MeshSettings::default().force_params());

        assert_eq!(engine.nodes.len(), 3);
        assert_eq!(engine.links.len(), 2);
        assert_eq!(engine.hub_index, Some(1));
        assert_eq!(engine.nodes[0].world_pos, vec2(-40.0, 0.0));
        assert_eq!(engine.nodes[0].velocity, vec2(0.5, 0.0));
        assert_eq!(engine.neighbors[1], vec![0, 2]);

        let layouts = engine.layout_states().collect::<Vec<_>>();
        assert_eq!(layouts[2].0, "a2");
        assert_eq!(layouts[2].1.position, vec2(40.0, 0.0));
    }

    #[test]
    fn set_forces_updates_charges_and_springs() {
        let mut engine = RenderGraph::default();
        engine.apply(&sample(), &MeshSettings::default().force_params());
        assert_eq!(engine.nodes[1].charge, 1.0);
        assert_eq!(engine.links[0].distance, DEFAULT_LINK_DISTANCE);

        let mut settings = MeshSettings::default();
        settings.node_override_mut("hub").repulsion = Some(90.0);
        settings.node_override_mut("hub").link_distance = Some(100.0);
        engine.nodes[1].world_pos = vec2(7.0, 7.0);
        engine.set_forces(&settings.force_params());

        assert_eq!(engine.nodes[1].charge, 3.0);
        assert_eq!(engine.links[0].distance, 130.0);
        assert_eq!(engine.nodes[1].world_pos, vec2(7.0, 7.0));
    }
}
