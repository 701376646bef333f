use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::graph::NodeGroup;

pub const DEFAULT_REPULSION: f32 = 30.0;
pub const DEFAULT_LINK_DISTANCE: f32 = 30.0;
pub const DEFAULT_LINK_STRENGTH: f32 = 1.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repulsion: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_strength: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_multiplier: Option<f32>,
}

impl NodeOverride {
    /// Override name, ignoring blank entries left behind by a cleared text field.
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.name().is_none()
            && self.repulsion.is_none()
            && self.link_distance.is_none()
            && self.link_strength.is_none()
            && self.size_multiplier.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    Circle,
    Square,
    Diamond,
    Triangle,
    Hexagon,
}

impl NodeShape {
    pub const ALL: [Self; 5] = [
        Self::Circle,
        Self::Square,
        Self::Diamond,
        Self::Triangle,
        Self::Hexagon,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Circle => "Circle",
            Self::Square => "Square",
            Self::Diamond => "Diamond",
            Self::Triangle => "Triangle",
            Self::Hexagon => "Hexagon",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTaxonomy {
    pub shape: NodeShape,
    pub color: String,
    pub base_size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_multiplier: Option<f32>,
    pub label: String,
}

impl GroupTaxonomy {
    pub fn default_for(group: NodeGroup) -> Self {
        let (shape, color, base_size, label) = match group {
            NodeGroup::Hub => (NodeShape::Hexagon, "#ff00ff", 25.0, "Hub"),
            NodeGroup::Infrastructure => (NodeShape::Square, "#00d2ff", 25.0, "Infrastructure"),
            NodeGroup::MainAgent => (NodeShape::Circle, "#00ff88", 10.0, "Main agent"),
            NodeGroup::SubAgent => (NodeShape::Circle, "#4285f4", 8.0, "Sub-agent"),
        };

        Self {
            shape,
            color: color.to_owned(),
            base_size,
            size_multiplier: None,
            label: label.to_owned(),
        }
    }

    pub fn scaled_size(&self) -> f32 {
        self.base_size * self.size_multiplier.unwrap_or(1.0)
    }
}

/// The persisted customization blob.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSettings {
    #[serde(default)]
    pub node_overrides: BTreeMap<String, NodeOverride>,
    #[serde(default)]
    pub group_taxonomy: BTreeMap<NodeGroup, GroupTaxonomy>,
}

impl MeshSettings {
    /// Parses a stored blob. Older blobs were a bare `id -> override` map and are upgraded.
    pub fn from_blob(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(trimmed).context("settings blob is not valid JSON")?;
        let is_structured = value
            .as_object()
            .is_some_and(|object| object.contains_key("nodeOverrides") || object.contains_key("groupTaxonomy"));

        if is_structured {
            return serde_json::from_value(value).context("invalid structured settings blob");
        }

        let node_overrides: BTreeMap<String, NodeOverride> =
            serde_json::from_value(value).context("invalid legacy settings blob")?;
        Ok(Self {
            node_overrides,
            group_taxonomy: BTreeMap::new(),
        })
    }

    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize settings blob")
    }

    pub fn node_override(&self, id: &str) -> Option<&NodeOverride> {
        self.node_overrides.get(id)
    }

    pub fn node_override_mut(&mut self, id: &str) -> &mut NodeOverride {
        self.node_overrides.entry(id.to_owned()).or_default()
    }

    /// Drops overrides that no longer customize anything.
    pub fn prune(&mut self) {
        self.node_overrides.retain(|_, entry| !entry.is_empty());
    }

    pub fn taxonomy(&self, group: NodeGroup) -> GroupTaxonomy {
        self.group_taxonomy
            .get(&group)
            .cloned()
            .unwrap_or_else(|| GroupTaxonomy::default_for(group))
    }

    pub fn taxonomy_mut(&mut self, group: NodeGroup) -> &mut GroupTaxonomy {
        self.group_taxonomy
            .entry(group)
            .or_insert_with(|| GroupTaxonomy::default_for(group))
    }

    pub fn force_params(&self) -> ForceParams {
        ForceParams {
            nodes: self
                .node_overrides
                .iter()
                .filter(|(_, entry)| {
                    entry.repulsion.is_some()
                        || entry.link_distance.is_some()
                        || entry.link_strength.is_some()
                })
                .map(|(id, entry)| {
                    (
                        id.clone(),
                        NodeForces {
                            repulsion: entry.repulsion,
                            link_distance: entry.link_distance,
                            link_strength: entry.link_strength,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct NodeForces {
    repulsion: Option<f32>,
    link_distance: Option<f32>,
    link_strength: Option<f32>,
}

/// Per-node and per-link force parameters handed to the layout engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForceParams {
    nodes: BTreeMap<String, NodeForces>,
}

impl ForceParams {
    pub fn repulsion(&self, id: &str) -> f32 {
        self.nodes
            .get(id)
            .and_then(|forces| forces.repulsion)
            .unwrap_or(DEFAULT_REPULSION)
    }

    /// Either endpoint's override makes the distance additive over both ends.
    pub fn link_distance(&self, source: &str, target: &str) -> f32 {
        let source = self.nodes.get(source).and_then(|forces| forces.link_distance);
        let target = self.nodes.get(target).and_then(|forces| forces.link_distance);
        if source.is_none() && target.is_none() {
            return DEFAULT_LINK_DISTANCE;
        }
        source.unwrap_or(DEFAULT_LINK_DISTANCE) + target.unwrap_or(DEFAULT_LINK_DISTANCE)
    }

    /// Either endpoint's override makes the strength multiplicative over both ends.
    pub fn link_strength(&self, source: &str, target: &str) -> f32 {
        let source = self.nodes.get(source).and_then(|forces| forces.link_strength);
        let target = self.nodes.get(target).and_then(|forces| forces.link_strength);
        if source.is_none() && target.is_none() {
            return DEFAULT_LINK_STRENGTH;
        }
        source.unwrap_or(DEFAULT_LINK_STRENGTH) * target.unwrap_or(DEFAULT_LINK_STRENGTH)
    }
}
