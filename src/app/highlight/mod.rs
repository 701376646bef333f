use std::collections::HashSet;

use crate::mesh::LinkKind;

use super::{HighlightState, RenderGraph};

/// Selected node, its direct neighbours, and the links between them.
/// Signal links only count when `include_signals` is set.
pub(super) fn build_highlight_state(
    cache: &RenderGraph,
    selected_index: usize,
    include_signals: bool,
) -> HighlightState {
    let mut related_nodes = HashSet::from([selected_index]);
    let mut related_links = HashSet::new();

    for (link_index, link) in cache.links.iter().enumerate() {
        if link.kind == LinkKind::Signal && !include_signals {
            continue;
        }

        let other = if link.source == selected_index {
            link.target
        } else if link.target == selected_index {
            link.source
        } else {
            continue;
        };

        related_nodes.insert(other);
        related_links.insert(link_index);
    }

    HighlightState {
        related_nodes,
        related_links,
    }
}

pub(super) fn build_highlight_state_for_selected_id(
    cache: &RenderGraph,
    selected_id: &str,
    include_signals: bool,
) -> Option<HighlightState> {
    let &selected_index = cache.index_by_id.get(selected_id)?;
    Some(build_highlight_state(cache, selected_index, include_signals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::LayoutEngine;
    use crate::mesh::{
        GraphLink, GraphNode, LayoutState, MeshGraph, MeshSettings, NodeGroup, NodeKind,
        SignalTrace,
    };

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_owned(),
            kind: NodeKind::Agent,
            group: NodeGroup::SubAgent,
            display_name: id.to_owned(),
            status: "active".to_owned(),
            operator: None,
            size_weight: 8.0,
            layout: LayoutState::default(),
        }
    }

    fn cache() -> RenderGraph {
        let mut signal = GraphLink::structural("a", "c", LinkKind::Signal);
        signal.signal = Some(SignalTrace {
            curvature: 0.4,
            opacity: 0.8,
            age_ms: 6_000,
        });
        let graph = MeshGraph {
            nodes: vec![node("a"), node("b"), node("c"), node("d")],
            links: vec![
                GraphLink::structural("a", "b", LinkKind::Hardware),
                signal,
                GraphLink::structural("c", "d", LinkKind::Dependency),
            ],
        };

        let mut cache = RenderGraph::default();
        cache.apply(&graph, &MeshSettings::default().force_params());
        cache
    }

    #[test]
    fn selection_highlights_direct_neighbours() {
        let state = build_highlight_state_for_selected_id(&cache(), "a", true).expect("selected");
        assert_eq!(state.related_nodes, HashSet::from([0, 1, 2]));
        assert_eq!(state.related_links, HashSet::from([0, 1]));
    }

    #[test]
    fn signals_can_be_left_out() {
        let state = build_highlight_state(&cache(), 0, false);
        assert_eq!(state.related_nodes, HashSet::from([0, 1]));
        assert_eq!(state.related_links, HashSet::from([0]));
    }

    #[test]
    fn unknown_selection_has_no_highlight() {
        assert!(build_highlight_state_for_selected_id(&cache(), "gone", true).is_none());
    }
}
