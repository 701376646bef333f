use eframe::egui::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Agent,
    Hardware,
    Ghost,
}

impl NodeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Hardware => "hardware",
            Self::Ghost => "ghost",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeGroup {
    Hub,
    Infrastructure,
    MainAgent,
    SubAgent,
}

impl NodeGroup {
    pub const ALL: [Self; 4] = [
        Self::Hub,
        Self::Infrastructure,
        Self::MainAgent,
        Self::SubAgent,
    ];
}

/// Simulation state owned by the layout engine and carried across cycles by id.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayoutState {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub group: NodeGroup,
    pub display_name: String,
    pub status: String,
    pub operator: Option<String>,
    pub size_weight: f32,
    pub layout: LayoutState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Hardware,
    Dependency,
    Bridge,
    Signal,
}

impl LinkKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Dependency => "dependency",
            Self::Bridge => "bridge",
            Self::Signal => "signal",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalTrace {
    pub curvature: f32,
    pub opacity: f32,
    pub age_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub kind: LinkKind,
    /// Present only on `LinkKind::Signal` links.
    pub signal: Option<SignalTrace>,
}

impl GraphLink {
    pub fn structural(source: &str, target: &str, kind: LinkKind) -> Self {
        Self {
            source: source.to_owned(),
            target: target.to_owned(),
            kind,
            signal: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl MeshGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn count_links(&self, kind: LinkKind) -> usize {
        self.links.iter().filter(|link| link.kind == kind).count()
    }
}
