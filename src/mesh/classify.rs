use std::collections::HashSet;

use super::graph::{GraphNode, LayoutState, NodeGroup, NodeKind};
use super::overrides::MeshSettings;
use super::policy::MeshPolicy;
use super::records::AgentRecord;

const GHOST_SIZE_FACTOR: f32 = 0.6;
const HARDWARE_STATUS: &str = "online";
const GHOST_STATUS: &str = "offline";

pub fn ghost_label(id: &str) -> String {
    format!("Ancestor: {id}")
}

/// Name a node carries when no override renames it.
pub fn derived_name(node: &GraphNode) -> String {
    match node.kind {
        NodeKind::Agent => node.operator.clone().unwrap_or_else(|| node.id.clone()),
        NodeKind::Hardware => node.id.clone(),
        NodeKind::Ghost => ghost_label(&node.id),
    }
}

/// Re-applies override names and taxonomy sizing to an already classified node.
pub fn restyle_node(node: &mut GraphNode, settings: &MeshSettings) {
    let entry = settings.node_override(&node.id);
    node.display_name = entry
        .and_then(|entry| entry.name())
        .map(str::to_owned)
        .unwrap_or_else(|| derived_name(node));

    let mut size_weight = settings.taxonomy(node.group).scaled_size()
        * entry.and_then(|entry| entry.size_multiplier).unwrap_or(1.0);
    if node.kind == NodeKind::Ghost {
        size_weight *= GHOST_SIZE_FACTOR;
    }
    node.size_weight = size_weight;
}

fn node(
    id: &str,
    kind: NodeKind,
    group: NodeGroup,
    status: &str,
    operator: Option<&str>,
    settings: &MeshSettings,
) -> GraphNode {
    let mut node = GraphNode {
        id: id.to_owned(),
        kind,
        group,
        display_name: String::new(),
        status: status.to_owned(),
        operator: operator.map(str::to_owned),
        size_weight: 0.0,
        layout: LayoutState::default(),
    };
    restyle_node(&mut node, settings);
    node
}

/// Emits one node per referenced entity. Agents are placed first, then hosts,
/// then missing ancestors; an id already claimed is never synthesized again.
/// Repeated roster ids keep their first record only.
pub fn classify_nodes(
    live: &[&AgentRecord],
    settings: &MeshSettings,
    policy: &MeshPolicy,
    show_infrastructure: bool,
) -> Vec<GraphNode> {
    let mut seen = HashSet::new();
    let live = live
        .iter()
        .copied()
        .filter(|agent| seen.insert(agent.id.as_str()))
        .collect::<Vec<_>>();

    let mut claimed = HashSet::new();
    let mut nodes = Vec::new();

    for agent in &live {
        claimed.insert(agent.id.as_str());

        let operator = agent.operator_label();
        let is_main = agent.parent().is_none()
            || operator.is_some_and(|operator| policy.is_root_operator(operator));
        let group = if is_main {
            NodeGroup::MainAgent
        } else {
            NodeGroup::SubAgent
        };
        nodes.push(node(
            &agent.id,
            NodeKind::Agent,
            group,
            &agent.status,
            operator,
            settings,
        ));
    }

    if show_infrastructure {
        for agent in &live {
            let host = agent.host_id.trim();
            if host.is_empty() || !claimed.insert(host) {
                continue;
            }

            let group = if policy.is_hub_host(host) {
                NodeGroup::Hub
            } else {
                NodeGroup::Infrastructure
            };
            nodes.push(node(
                host,
                NodeKind::Hardware,
                group,
                HARDWARE_STATUS,
                None,
                settings,
            ));
        }
    }

    for agent in &live {
        let Some(parent) = agent.parent() else {
            continue;
        };
        if !claimed.insert(parent) {
            continue;
        }

        nodes.push(node(
            parent,
            NodeKind::Ghost,
            NodeGroup::MainAgent,
            GHOST_STATUS,
            None,
            settings,
        ));
    }

    nodes
}
