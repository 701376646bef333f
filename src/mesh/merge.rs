use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};

use crate::util::stable_pair;

use super::graph::{GraphNode, LayoutState, MeshGraph};

/// Fresh nodes spawn inside a square of this half-extent around the origin.
pub const SPAWN_HALF_EXTENT: f32 = 100.0;
const MIN_SPAWN_SPACING: f32 = 0.5;
const MAX_SPAWN_ATTEMPTS: usize = 64;

/// Copies each surviving node's layout from `previous` by id and seeds the rest.
pub fn carry_layout(nodes: &mut [GraphNode], previous: Option<&MeshGraph>) {
    let prior = previous
        .map(|graph| {
            graph
                .nodes
                .iter()
                .map(|node| (node.id.as_str(), node.layout))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let mut fresh = Vec::new();
    let mut occupied = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.iter_mut().enumerate() {
        match prior.get(node.id.as_str()) {
            Some(layout) => {
                node.layout = *layout;
                occupied.push(layout.position);
            }
            None => fresh.push(index),
        }
    }

    for index in fresh {
        let position = spawn_position(&nodes[index].id, &occupied);
        occupied.push(position);
        nodes[index].layout = LayoutState {
            position,
            velocity: Vec2::ZERO,
        };
    }
}

fn spawn_position(id: &str, occupied: &[Vec2]) -> Vec2 {
    let (jx, jy) = stable_pair(id);
    let origin = vec2(jx, jy) * SPAWN_HALF_EXTENT;
    let seed = (jx + 1.0) * 0.5;

    let mut candidate = origin;
    for attempt in 0..MAX_SPAWN_ATTEMPTS {
        if !is_taken(candidate, occupied) {
            return candidate;
        }

        let angle = ((attempt as f32) * 0.618_034 + seed) * std::f32::consts::TAU;
        let radius = MIN_SPAWN_SPACING * 4.0 * (attempt as f32 + 1.0);
        candidate = origin + vec2(angle.cos(), angle.sin()) * radius;
        candidate.x = candidate.x.clamp(-SPAWN_HALF_EXTENT, SPAWN_HALF_EXTENT);
        candidate.y = candidate.y.clamp(-SPAWN_HALF_EXTENT, SPAWN_HALF_EXTENT);
    }

    candidate
}

fn is_taken(candidate: Vec2, occupied: &[Vec2]) -> bool {
    occupied
        .iter()
        .any(|position| (*position - candidate).length_sq() < MIN_SPAWN_SPACING * MIN_SPAWN_SPACING)
}
