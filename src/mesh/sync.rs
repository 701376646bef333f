use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::classify::{classify_nodes, restyle_node};
use super::clock::live_agents;
use super::gate::admit;
use super::graph::{LayoutState, LinkKind, MeshGraph};
use super::links::{LayerVisibility, derive_links};
use super::merge::carry_layout;
use super::overrides::MeshSettings;
use super::policy::MeshPolicy;
use super::records::{AgentRecord, MessageRecord};

/// Latest known inputs for one recompute.
#[derive(Clone, Copy, Debug)]
pub struct SyncInputs<'a> {
    /// `None` until the first roster snapshot has arrived.
    pub agents: Option<&'a [AgentRecord]>,
    pub messages: &'a [MessageRecord],
    pub settings: &'a MeshSettings,
    pub layers: LayerVisibility,
}

pub struct MeshSynchronizer {
    policy: MeshPolicy,
    current: Option<Arc<MeshGraph>>,
    admitted_cycles: u64,
}

impl MeshSynchronizer {
    pub fn new(policy: MeshPolicy) -> Self {
        Self {
            policy,
            current: None,
            admitted_cycles: 0,
        }
    }

    pub fn policy(&self) -> &MeshPolicy {
        &self.policy
    }

    pub fn current(&self) -> Option<Arc<MeshGraph>> {
        self.current.clone()
    }

    /// Rebuilds the graph from scratch. Returns the new graph only when it
    /// differs structurally from the one already handed out.
    pub fn recompute(&mut self, inputs: &SyncInputs<'_>, now: DateTime<Utc>) -> Option<Arc<MeshGraph>> {
        let agents = inputs.agents?;

        let live = live_agents(agents, now, self.policy.liveness_window);
        let nodes = classify_nodes(
            &live,
            inputs.settings,
            &self.policy,
            inputs.layers.infrastructure,
        );
        let links = derive_links(
            &live,
            inputs.messages,
            &nodes,
            &self.policy,
            inputs.layers,
            now,
        );

        let mut candidate = MeshGraph { nodes, links };
        carry_layout(&mut candidate.nodes, self.current.as_deref());

        let Some(graph) = admit(self.current.as_deref(), candidate) else {
            trace!("mesh topology unchanged, keeping previous graph");
            return None;
        };

        self.admitted_cycles += 1;
        debug!(
            cycle = self.admitted_cycles,
            roster = agents.len(),
            live = live.len(),
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            signals = graph.count_links(LinkKind::Signal),
            "mesh graph updated"
        );

        let graph = Arc::new(graph);
        self.current = Some(Arc::clone(&graph));
        Some(graph)
    }

    /// Re-applies names and sizes after a settings edit. Bypasses the gate so
    /// user edits show up without waiting for a topology change.
    pub fn restyle(&mut self, settings: &MeshSettings) -> Option<Arc<MeshGraph>> {
        let current = self.current.as_mut()?;
        let graph = Arc::make_mut(current);
        for node in &mut graph.nodes {
            restyle_node(node, settings);
        }
        debug!(nodes = graph.nodes.len(), "mesh graph restyled");
        Some(Arc::clone(current))
    }

    /// Records where the layout engine has moved nodes so the next cycle
    /// carries those positions forward.
    pub fn absorb_layout<'a, I>(&mut self, layouts: I)
    where
        I: IntoIterator<Item = (&'a str, LayoutState)>,
    {
        let Some(current) = self.current.as_mut() else {
            return;
        };

        let layouts = layouts.into_iter().collect::<HashMap<_, _>>();
        if layouts.is_empty() {
            return;
        }

        let graph = Arc::make_mut(current);
        for node in &mut graph.nodes {
            if let Some(layout) = layouts.get(node.id.as_str()) {
                node.layout = *layout;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::graph::{GraphLink, NodeGroup, NodeKind};
    use chrono::{Duration, TimeZone};
    use eframe::egui::vec2;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn stamp(at: DateTime<Utc>, age_ms: i64) -> String {
        (at - Duration::milliseconds(age_ms))
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
            last_seen: stamp(now(), 0),
            parent_id: parent.map(str::to_owned),
        }
    }

    fn message(id: i64, sender: &str, target: &str, age_ms: i64) -> MessageRecord {
        MessageRecord {
            id,
            ts: stamp(now(), age_ms),
            sender: sender.to_owned(),
            target: target.to_owned(),
            topic: "mesh".to_owned(),
            state: "sent".to_owned(),
        }
    }

    fn inputs<'a>(
        agents: &'a [AgentRecord],
        messages: &'a [MessageRecord],
        settings: &'a MeshSettings,
    ) -> SyncInputs<'a> {
        SyncInputs {
            agents: Some(agents),
            messages,
            settings,
            layers: LayerVisibility::default(),
        }
    }

    #[test]
    fn nothing_is_built_before_first_roster() {
        let settings = MeshSettings::default();
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());
        let waiting = SyncInputs {
            agents: None,
            messages: &[],
            settings: &settings,
            layers: LayerVisibility::default(),
        };
        assert!(sync.recompute(&waiting, now()).is_none());
        assert!(sync.current().is_none());
    }

    #[test]
    fn single_agent_scenario() {
        let settings = MeshSettings::default();
        let agents = [agent("a1", "h1", None)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());

        let graph = sync
            .recompute(&inputs(&agents, &[], &settings), now())
            .expect("first cycle");

        let a1 = graph.node("a1").expect("agent node");
        assert_eq!(a1.kind, NodeKind::Agent);
        assert_eq!(a1.group, NodeGroup::MainAgent);
        assert_eq!(graph.node("h1").expect("host").kind, NodeKind::Hardware);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.links,
            vec![GraphLink::structural("a1", "h1", LinkKind::Hardware)]
        );
    }

    #[test]
    fn unchanged_inputs_reuse_the_same_graph() {
        let settings = MeshSettings::default();
        let agents = [agent("a1", "h1", None), agent("a2", "h1", Some("a0"))];
        let messages = [message(1, "a1", "a2", 1_000)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());

        let first = sync
            .recompute(&inputs(&agents, &messages, &settings), now())
            .expect("first cycle");
        assert!(
            sync.recompute(&inputs(&agents, &messages, &settings), now())
                .is_none()
        );
        let held = sync.current().expect("graph held");
        assert!(Arc::ptr_eq(&first, &held));
    }

    #[test]
    fn positions_survive_attribute_changes() {
        let mut settings = MeshSettings::default();
        let agents = [agent("a1", "h1", None)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());
        sync.recompute(&inputs(&agents, &[], &settings), now())
            .expect("first cycle");

        let moved = LayoutState {
            position: vec2(42.0, -13.0),
            velocity: vec2(1.5, 0.0),
        };
        sync.absorb_layout([("a1", moved)]);

        settings.node_override_mut("a1").name = Some("Renamed".to_owned());
        let mut offline = agents.clone();
        offline[0].status = "idle".to_owned();
        let arrivals = [offline[0].clone(), agent("a3", "h2", None)];

        let graph = sync
            .recompute(&inputs(&arrivals, &[], &settings), now())
            .expect("topology changed");
        let a1 = graph.node("a1").expect("a1");
        assert_eq!(a1.layout, moved);
        assert_eq!(a1.display_name, "Renamed");
        assert_eq!(a1.status, "idle");
    }

    #[test]
    fn signal_opacity_decay_alone_is_suppressed() {
        let settings = MeshSettings::default();
        let agents = [agent("x", "h", None), agent("y", "h", None)];
        let messages = [message(1, "x", "y", 1_000)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());

        let first = sync
            .recompute(&inputs(&agents, &messages, &settings), now())
            .expect("first cycle");
        let later = now() + Duration::milliseconds(10_000);
        assert!(
            sync.recompute(&inputs(&agents, &messages, &settings), later)
                .is_none()
        );

        let held = sync.current().expect("graph held");
        assert!(Arc::ptr_eq(&first, &held));
        let opacity = held
            .links
            .iter()
            .find_map(|link| link.signal)
            .map(|trace| trace.opacity)
            .expect("signal kept");
        assert!(opacity > 0.9);
    }

    #[test]
    fn expired_signal_changes_topology() {
        let settings = MeshSettings::default();
        let agents = [agent("x", "h", None), agent("y", "h", None)];
        let messages = [message(1, "x", "y", 1_000)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());
        sync.recompute(&inputs(&agents, &messages, &settings), now())
            .expect("first cycle");

        let later = now() + Duration::milliseconds(29_000);
        let graph = sync
            .recompute(&inputs(&agents, &messages, &settings), later)
            .expect("signal expired");
        assert_eq!(graph.count_links(LinkKind::Signal), 0);
    }

    #[test]
    fn stale_agents_drop_out_of_the_graph() {
        let settings = MeshSettings::default();
        let mut stale = agent("old", "h-old", None);
        stale.last_seen = stamp(now(), Duration::hours(25).num_milliseconds());
        let agents = [agent("a1", "h1", None), stale];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());

        let graph = sync
            .recompute(&inputs(&agents, &[], &settings), now())
            .expect("first cycle");
        assert!(graph.node("old").is_none());
        assert!(graph.node("h-old").is_none());
    }

    #[test]
    fn absorb_does_not_touch_a_graph_handed_out_earlier() {
        let settings = MeshSettings::default();
        let agents = [agent("a1", "h1", None)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());
        let handed_out = sync
            .recompute(&inputs(&agents, &[], &settings), now())
            .expect("first cycle");
        let before = handed_out.node("a1").expect("a1").layout;

        sync.absorb_layout([("a1", LayoutState::default())]);
        assert_eq!(handed_out.node("a1").expect("a1").layout, before);
        assert_eq!(
            sync.current().expect("held").node("a1").expect("a1").layout,
            LayoutState::default()
        );
    }

    #[test]
    fn restyle_applies_renames_without_topology_change() {
        let mut settings = MeshSettings::default();
        let agents = [agent("a1", "h1", None)];
        let mut sync = MeshSynchronizer::new(MeshPolicy::default());
        assert!(sync.restyle(&settings).is_none());

        sync.recompute(&inputs(&agents, &[], &settings), now())
            .expect("first cycle");
        settings.node_override_mut("h1").name = Some("Rack 7".to_owned());
        assert!(
            sync.recompute(&inputs(&agents, &[], &settings), now())
                .is_none()
        );

        let graph = sync.restyle(&settings).expect("restyled");
        assert_eq!(graph.node("h1").expect("h1").display_name, "Rack 7");
        assert!(Arc::ptr_eq(&graph, &sync.current().expect("held")));
    }
}
