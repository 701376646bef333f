use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use super::clock::age_ms;
use super::graph::{GraphLink, GraphNode, LinkKind, NodeKind, SignalTrace};
use super::policy::{MeshPolicy, SIGNAL_CURVATURE, SIGNAL_MIN_OPACITY};
use super::records::{AgentRecord, MessageRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerVisibility {
    pub infrastructure: bool,
    pub signals: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            infrastructure: true,
            signals: true,
        }
    }
}

pub fn derive_links(
    live: &[&AgentRecord],
    messages: &[MessageRecord],
    nodes: &[GraphNode],
    policy: &MeshPolicy,
    layers: LayerVisibility,
    now: DateTime<Utc>,
) -> Vec<GraphLink> {
    let mut links = Vec::new();

    if layers.infrastructure {
        links.extend(hierarchy_links(live));
        links.extend(bridge_links(nodes, policy));
    }
    if layers.signals {
        links.extend(signal_links(messages, policy, now));
    }

    let node_ids = nodes.iter().map(|node| node.id.as_str()).collect::<HashSet<_>>();
    links.retain(|link| {
        node_ids.contains(link.source.as_str()) && node_ids.contains(link.target.as_str())
    });
    links
}

fn hierarchy_links(live: &[&AgentRecord]) -> Vec<GraphLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for agent in live {
        if !seen.insert(agent.id.as_str()) {
            continue;
        }

        let host = agent.host_id.trim();
        if !host.is_empty() && host != agent.id {
            links.push(GraphLink::structural(&agent.id, host, LinkKind::Hardware));
        }
        if let Some(parent) = agent.parent()
            && parent != agent.id
        {
            links.push(GraphLink::structural(&agent.id, parent, LinkKind::Dependency));
        }
    }

    links
}

/// Star backbone: every host bridges once to the hub, or to the primary local
/// host when no hub is reporting.
fn bridge_links(nodes: &[GraphNode], policy: &MeshPolicy) -> Vec<GraphLink> {
    let hosts = nodes
        .iter()
        .filter(|node| node.kind == NodeKind::Hardware)
        .collect::<Vec<_>>();

    let anchor = hosts
        .iter()
        .find(|node| policy.is_hub_host(&node.id))
        .or_else(|| hosts.iter().find(|node| policy.is_local_host(&node.id)));
    let Some(anchor) = anchor else {
        return Vec::new();
    };

    let mut pairs = HashSet::new();
    let mut links = Vec::new();
    for host in &hosts {
        if host.id == anchor.id {
            continue;
        }

        let pair = if host.id < anchor.id {
            (host.id.as_str(), anchor.id.as_str())
        } else {
            (anchor.id.as_str(), host.id.as_str())
        };
        if pairs.insert(pair) {
            links.push(GraphLink::structural(&host.id, &anchor.id, LinkKind::Bridge));
        }
    }

    links
}

/// One fading link per directed sender/target pair, taken from its freshest
/// message inside the TTL.
pub fn signal_links(
    messages: &[MessageRecord],
    policy: &MeshPolicy,
    now: DateTime<Utc>,
) -> Vec<GraphLink> {
    let ttl = policy.signal_ttl_ms;
    let mut freshest: BTreeMap<(&str, &str), i64> = BTreeMap::new();

    for message in messages {
        if policy.is_control_plane(&message.sender) || policy.is_control_plane(&message.target) {
            continue;
        }

        let Some(age) = age_ms(&message.ts, now) else {
            continue;
        };
        let age = age.max(0);
        if age >= ttl {
            continue;
        }

        freshest
            .entry((message.sender.as_str(), message.target.as_str()))
            .and_modify(|best| *best = (*best).min(age))
            .or_insert(age);
    }

    freshest
        .into_iter()
        .map(|((sender, target), age)| GraphLink {
            source: sender.to_owned(),
            target: target.to_owned(),
            kind: LinkKind::Signal,
            signal: Some(SignalTrace {
                curvature: SIGNAL_CURVATURE,
                opacity: signal_opacity(age, ttl),
                age_ms: age,
            }),
        })
        .collect()
}

pub fn signal_opacity(age_ms: i64, ttl_ms: i64) -> f32 {
    if ttl_ms <= 0 {
        return SIGNAL_MIN_OPACITY;
    }
    let fade = 1.0 - (age_ms as f64 / ttl_ms as f64);
    (fade as f32).clamp(SIGNAL_MIN_OPACITY, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::classify::classify_nodes;
    use crate::mesh::overrides::MeshSettings;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn stamp(age_ms: i64) -> String {
        (now() - Duration::milliseconds(age_ms))
            .format("%Y-%m-%dT%H:%M:%S%.3f")
            .to_string()
    }

    fn agent(id: &str, host: &str, parent: Option<&str>) -> AgentRecord {
        AgentRecord {
            id: id.to_owned(),
            host_id: host.to_owned(),
            operator: None,
            version: None,
            status: "active".to_owned(),
            last_seen: stamp(0),
            parent_id: parent.map(str::to_owned),
        }
    }

    fn message(id: i64, sender: &str, target: &str, age_ms: i64) -> MessageRecord {
        MessageRecord {
            id,
            ts: stamp(age_ms),
            sender: sender.to_owned(),
            target: target.to_owned(),
            topic: "bacon/mesh".to_owned(),
            state: "delivered".to_owned(),
        }
    }

    fn derive(
        agents: &[AgentRecord],
        messages: &[MessageRecord],
        layers: LayerVisibility,
    ) -> (Vec<GraphNode>, Vec<GraphLink>) {
        let policy = MeshPolicy::default();
        let live = agents.iter().collect::<Vec<_>>();
        let nodes = classify_nodes(&live, &MeshSettings::default(), &policy, layers.infrastructure);
        let links = derive_links(&live, messages, &nodes, &policy, layers, now());
        (nodes, links)
    }

    #[test]
    fn single_agent_links_to_its_host() {
        let (_, links) = derive(&[agent("a1", "h1", None)], &[], LayerVisibility::default());
        assert_eq!(links, vec![GraphLink::structural("a1", "h1", LinkKind::Hardware)]);
    }

    #[test]
    fn duplicate_roster_ids_link_to_their_host_once() {
        let agents = [agent("twin", "h1", None), agent("twin", "h1", Some("lead"))];
        let (_, links) = derive(&agents, &[], LayerVisibility::default());

        let hardware = links
            .iter()
            .filter(|link| link.kind == LinkKind::Hardware)
            .collect::<Vec<_>>();
        assert_eq!(hardware, vec![&GraphLink::structural("twin", "h1", LinkKind::Hardware)]);
        assert!(links.iter().all(|link| link.kind != LinkKind::Dependency));
    }

    #[test]
    fn dependency_points_at_ghost_parent() {
        let (_, links) = derive(&[agent("a2", "h1", Some("a0"))], &[], LayerVisibility::default());
        assert!(links.contains(&GraphLink::structural("a2", "a0", LinkKind::Dependency)));
    }

    #[test]
    fn hosts_bridge_once_to_hub() {
        let agents = [
            agent("a", "pc-win11-zbook", None),
            agent("b", "srv906866", None),
            agent("c", "raspberry", None),
            agent("d", "raspberry", None),
        ];
        let (_, links) = derive(&agents, &[], LayerVisibility::default());

        let bridges = links
            .iter()
            .filter(|link| link.kind == LinkKind::Bridge)
            .map(|link| (link.source.as_str(), link.target.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            bridges,
            vec![("pc-win11-zbook", "srv906866"), ("raspberry", "srv906866")]
        );
    }

    #[test]
    fn local_host_anchors_bridges_without_hub() {
        let agents = [agent("a", "pc-win11", None), agent("b", "laptop", None)];
        let (_, links) = derive(&agents, &[], LayerVisibility::default());
        assert!(links.contains(&GraphLink::structural("laptop", "pc-win11", LinkKind::Bridge)));
        assert_eq!(links.iter().filter(|link| link.kind == LinkKind::Bridge).count(), 1);
    }

    #[test]
    fn no_anchor_means_no_bridges() {
        let agents = [agent("a", "h1", None), agent("b", "h2", None)];
        let (_, links) = derive(&agents, &[], LayerVisibility::default());
        assert!(links.iter().all(|link| link.kind != LinkKind::Bridge));
    }

    #[test]
    fn freshest_message_wins_per_direction() {
        let agents = [agent("x", "h", None), agent("y", "h", None)];
        let messages = [
            message(1, "x", "y", 5_000),
            message(2, "x", "y", 12_000),
            message(3, "y", "x", 20_000),
        ];
        let (_, links) = derive(&agents, &messages, LayerVisibility::default());

        let signals = links
            .iter()
            .filter(|link| link.kind == LinkKind::Signal)
            .collect::<Vec<_>>();
        assert_eq!(signals.len(), 2);

        let forward = signals
            .iter()
            .find(|link| link.source == "x" && link.target == "y")
            .and_then(|link| link.signal)
            .expect("x to y");
        assert_eq!(forward.age_ms, 5_000);
        assert!((forward.opacity - (1.0 - 5_000.0 / 30_000.0)).abs() < 1e-6);
        assert_eq!(forward.curvature, SIGNAL_CURVATURE);
    }

    #[test]
    fn ttl_boundary_is_exclusive() {
        let policy = MeshPolicy::default();
        let kept = signal_links(&[message(1, "x", "y", 29_999)], &policy, now());
        assert_eq!(kept.len(), 1);
        let dropped = signal_links(&[message(1, "x", "y", 30_000)], &policy, now());
        assert!(dropped.is_empty());
    }

    #[test]
    fn control_plane_chatter_is_ignored() {
        let policy = MeshPolicy::default();
        let messages = [
            message(1, "control-plane", "y", 10),
            message(2, "x", "control-plane", 10),
        ];
        assert!(signal_links(&messages, &policy, now()).is_empty());
    }

    #[test]
    fn opacity_fades_linearly_with_floor() {
        assert_eq!(signal_opacity(0, 30_000), 1.0);
        assert!((signal_opacity(15_000, 30_000) - 0.5).abs() < 1e-6);
        assert_eq!(signal_opacity(29_500, 30_000), SIGNAL_MIN_OPACITY);
    }

    #[test]
    fn future_and_unparsable_timestamps() {
        let policy = MeshPolicy::default();
        let mut broken = message(1, "x", "y", 0);
        broken.ts = "??".to_owned();
        assert!(signal_links(&[broken], &policy, now()).is_empty());

        let ahead = signal_links(&[message(2, "x", "y", -4_000)], &policy, now());
        let trace = ahead[0].signal.expect("signal trace");
        assert_eq!(trace.age_ms, 0);
        assert_eq!(trace.opacity, 1.0);
    }

    #[test]
    fn signals_to_unknown_nodes_are_dropped() {
        let agents = [agent("x", "h", None)];
        let messages = [message(1, "x", "stranger", 100)];
        let (_, links) = derive(&agents, &messages, LayerVisibility::default());
        assert!(links.iter().all(|link| link.kind != LinkKind::Signal));
    }

    #[test]
    fn every_link_endpoint_exists() {
        let agents = [
            agent("a", "srv906866", None),
            agent("b", "h2", Some("gone")),
            agent("c", "h2", Some("a")),
        ];
        let messages = [message(1, "b", "c", 10), message(2, "c", "ghost-town", 10)];
        let (nodes, links) = derive(&agents, &messages, LayerVisibility::default());
        let ids = nodes.iter().map(|node| node.id.as_str()).collect::<HashSet<_>>();
        assert!(!links.is_empty());
        for link in &links {
            assert!(ids.contains(link.source.as_str()));
            assert!(ids.contains(link.target.as_str()));
        }
    }

    #[test]
    fn hidden_layers_filter_link_classes() {
        let agents = [agent("x", "h", Some("p")), agent("y", "h", None)];
        let messages = [message(1, "x", "y", 10)];

        let (_, infra_hidden) = derive(
            &agents,
            &messages,
            LayerVisibility {
                infrastructure: false,
                signals: true,
            },
        );
        assert!(infra_hidden.iter().all(|link| link.kind == LinkKind::Signal));
        assert_eq!(infra_hidden.len(), 1);

        let (_, signals_hidden) = derive(
            &agents,
            &messages,
            LayerVisibility {
                infrastructure: true,
                signals: false,
            },
        );
        assert!(signals_hidden.iter().all(|link| link.kind != LinkKind::Signal));
    }
}
