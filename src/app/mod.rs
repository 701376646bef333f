use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use chrono::Utc;
use eframe::egui::{Context, Pos2, Vec2};
use tracing::{debug, warn};

use crate::feed::{FeedPoller, FeedUpdate};
use crate::mesh::{
    AgentRecord, ForceParams, LayerVisibility, LinkKind, MemoryRecord, MeshGraph, MeshSettings,
    MeshSynchronizer, MessageRecord, NodeGroup, NodeKind, SignalTrace, SyncInputs,
};
use crate::settings::SettingsPersister;

mod graph;
mod highlight;
mod physics;
mod render_utils;
mod ui;

/// Receives admitted graphs and per-node force parameters.
pub trait LayoutEngine {
    /// Replaces the simulated graph, seeding each node from its carried layout.
    fn apply(&mut self, graph: &MeshGraph, forces: &ForceParams);
    /// Updates charges and link springs in place without touching positions.
    fn set_forces(&mut self, forces: &ForceParams);
}

pub struct MeshApp {
    synchronizer: MeshSynchronizer,
    updates: Receiver<FeedUpdate>,
    poller: FeedPoller,
    agents: Option<Vec<AgentRecord>>,
    messages: Vec<MessageRecord>,
    /// Agent whose memories were last requested.
    memory_request: Option<String>,
    memories: Option<MemorySnapshot>,
    last_roster_at: Option<Instant>,
    last_history_at: Option<Instant>,
    feed_disconnected: bool,
    inputs_dirty: bool,
    persister: SettingsPersister,
    view: ViewModel,
}

struct ViewModel {
    settings: MeshSettings,
    layers: LayerVisibility,
    search: String,
    memory_filter: String,
    selected: Option<String>,
    pan: Vec2,
    zoom: f32,
    live_physics: bool,
    physics_intensity: f32,
    physics_repulsion: f32,
    physics_spring: f32,
    physics_collision: f32,
    physics_velocity_damping: f32,
    physics_target_spread: f32,
    physics_spread_force: f32,
    show_quadtree_overlay: bool,
    highlight_signal_partners: bool,
    render_graph_revision: u64,
    graph_cache: Option<RenderGraph>,
    search_match_cache: Option<SearchMatchCache>,
    pending: PendingEdits,
    visible_node_count: usize,
    visible_edge_count: usize,
}

/// What the panels changed this frame.
#[derive(Clone, Copy, Default)]
struct PendingEdits {
    layers: bool,
    style: bool,
    forces: bool,
    refresh_memories: bool,
}

/// Feed data the panels display without editing.
struct Activity<'a> {
    agents: Option<&'a [AgentRecord]>,
    messages: &'a [MessageRecord],
    memories: Option<&'a MemorySnapshot>,
    memories_pending: bool,
}

impl PendingEdits {
    fn touches_settings(self) -> bool {
        self.style || self.forces
    }
}

struct SearchMatchCache {
    query: String,
    graph_revision: u64,
    matches: Arc<HashSet<usize>>,
}

struct MemorySnapshot {
    agent_id: String,
    memories: Vec<MemoryRecord>,
    fetched_at: Instant,
}

/// Feed freshness shown in the header.
struct FeedStatus {
    roster_age: Option<Duration>,
    history_age: Option<Duration>,
    disconnected: bool,
}

#[derive(Default)]
struct RenderGraph {
    nodes: Vec<RenderNode>,
    links: Vec<RenderLink>,
    index_by_id: HashMap<String, usize>,
    neighbors: Vec<Vec<usize>>,
    hub_index: Option<usize>,
    physics_scratch: PhysicsScratch,
    view_scratch: ViewScratch,
}

#[derive(Default)]
struct PhysicsScratch {
    forces: Vec<Vec2>,
    positions: Vec<Vec2>,
    radii: Vec<f32>,
    charges: Vec<f32>,
}

#[derive(Default)]
struct ViewScratch {
    screen_positions: Vec<Pos2>,
    screen_radii: Vec<f32>,
    visible_indices: Vec<usize>,
    visible_mask: Vec<bool>,
    draw_order: Vec<usize>,
    draw_order_dirty: bool,
    quadtree_positions: Vec<Vec2>,
    quadtree_cells: Vec<physics::QuadtreeCell>,
}

struct RenderNode {
    id: String,
    display_name: String,
    kind: NodeKind,
    group: NodeGroup,
    status: String,
    operator: Option<String>,
    world_pos: Vec2,
    velocity: Vec2,
    base_radius: f32,
    charge: f32,
}

struct RenderLink {
    source: usize,
    target: usize,
    kind: LinkKind,
    signal: Option<SignalTrace>,
    distance: f32,
    strength: f32,
}

struct HighlightState {
    related_nodes: HashSet<usize>,
    related_links: HashSet<usize>,
}

#[derive(Clone, Copy)]
struct PhysicsConfig {
    intensity: f32,
    repulsion_scale: f32,
    spring_scale: f32,
    collision_scale: f32,
    velocity_damping: f32,
    target_spread: f32,
    spread_force: f32,
    delta_seconds: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            repulsion_scale: 1.0,
            spring_scale: 1.0,
            collision_scale: 1.0,
            velocity_damping: 0.9,
            target_spread: 1.0,
            spread_force: 0.02,
            delta_seconds: 1.0 / 60.0,
        }
    }
}

impl MeshApp {
    pub fn new(
        synchronizer: MeshSynchronizer,
        updates: Receiver<FeedUpdate>,
        poller: FeedPoller,
        settings: MeshSettings,
        persister: SettingsPersister,
    ) -> Self {
        Self {
            synchronizer,
            updates,
            poller,
            agents: None,
            messages: Vec::new(),
            memory_request: None,
            memories: None,
            last_roster_at: None,
            last_history_at: None,
            feed_disconnected: false,
            inputs_dirty: false,
            persister,
            view: ViewModel::new(settings),
        }
    }

    fn drain_updates(&mut self, now: Instant) {
        loop {
            match self.updates.try_recv() {
                Ok(FeedUpdate::Agents(agents)) => {
                    self.agents = Some(agents);
                    self.last_roster_at = Some(now);
                    self.inputs_dirty = true;
                }
                Ok(FeedUpdate::Messages(messages)) => {
                    self.messages = messages;
                    self.last_history_at = Some(now);
                    self.inputs_dirty = true;
                }
                Ok(FeedUpdate::Memories { agent_id, memories }) => {
                    self.absorb_memories(agent_id, memories, now);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.feed_disconnected {
                        warn!("feed workers disconnected, graph will no longer refresh");
                        self.feed_disconnected = true;
                    }
                    break;
                }
            }
        }
    }

    fn absorb_memories(&mut self, agent_id: String, memories: Vec<MemoryRecord>, now: Instant) {
        if self.memory_request.as_deref() != Some(agent_id.as_str()) {
            debug!(agent = %agent_id, "dropping memories for a previous selection");
            return;
        }
        self.memories = Some(MemorySnapshot {
            agent_id,
            memories,
            fetched_at: now,
        });
    }

    /// Requests memories when the selected agent changes or a refresh was asked for.
    fn sync_memory_request(&mut self) {
        let refresh = std::mem::take(&mut self.view.pending.refresh_memories);
        let wanted = self.view.selected_agent_id();
        if wanted == self.memory_request && !refresh {
            return;
        }

        if wanted != self.memory_request {
            self.memories = None;
        }
        self.memory_request = wanted;
        if let Some(agent_id) = &self.memory_request
            && let Err(error) = self.poller.request_memories(agent_id)
        {
            warn!(agent = %agent_id, "could not request memories: {error:#}");
        }
    }

    fn absorb_engine_layout(&mut self) {
        if let Some(cache) = &self.view.graph_cache {
            self.synchronizer.absorb_layout(cache.layout_states());
        }
    }

    fn synchronize(&mut self) {
        let edits = std::mem::take(&mut self.view.pending);
        if edits.layers {
            self.inputs_dirty = true;
        }
        if !self.inputs_dirty && !edits.touches_settings() {
            return;
        }

        if self.inputs_dirty || edits.style {
            self.absorb_engine_layout();
        }

        let forces = self.view.settings.force_params();
        if self.inputs_dirty {
            self.inputs_dirty = false;
            let inputs = SyncInputs {
                agents: self.agents.as_deref(),
                messages: &self.messages,
                settings: &self.view.settings,
                layers: self.view.layers,
            };
            if let Some(graph) = self.synchronizer.recompute(&inputs, Utc::now()) {
                self.view.apply_graph(&graph, &forces);
            }
        }

        if edits.style
            && let Some(graph) = self.synchronizer.restyle(&self.view.settings)
        {
            self.view.apply_graph(&graph, &forces);
        } else if edits.forces
            && let Some(cache) = self.view.graph_cache.as_mut()
        {
            cache.set_forces(&forces);
        }

        if edits.touches_settings() {
            self.persister.mark_changed(Instant::now());
        }
    }

    fn feed_status(&self, now: Instant) -> FeedStatus {
        FeedStatus {
            roster_age: self.last_roster_at.map(|at| now.duration_since(at)),
            history_age: self.last_history_at.map(|at| now.duration_since(at)),
            disconnected: self.feed_disconnected,
        }
    }
}

impl eframe::App for MeshApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.drain_updates(now);
        self.sync_memory_request();
        self.synchronize();

        if self.persister.poll(now, &self.view.settings).is_some() {
            debug!("settings save dispatched");
        }
        if let Some(wait) = self.persister.time_until_due(now) {
            ctx.request_repaint_after(wait);
        }

        let status = self.feed_status(now);
        let activity = Activity {
            agents: self.agents.as_deref(),
            messages: &self.messages,
            memories: self.memories.as_ref(),
            memories_pending: self.memory_request.is_some() && self.memories.is_none(),
        };
        self.view.show(ctx, &status, &activity);
    }
}

impl Drop for MeshApp {
    fn drop(&mut self) {
        self.view.settings.prune();
        self.persister.flush(&self.view.settings);
    }
}
