use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eframe::egui::{self, Align2, Color32, FontId, Pos2, Sense, Stroke, Ui, Vec2, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::mesh::{LinkKind, MeshSettings, NodeGroup, NodeKind, NodeShape};
use crate::util::clip_label;

use super::super::highlight::build_highlight_state_for_selected_id;
use super::super::physics::{quadtree_cells, step_physics};
use super::super::render_utils::{
    blend_color, curve_control_point, dim_color, draw_background, draw_node_shape, edge_visible,
    parse_hex_color, quadratic_points, with_opacity, world_to_screen,
};
use super::super::{PhysicsConfig, RenderGraph, RenderLink, SearchMatchCache, ViewModel};

const LABEL_MAX_CHARS: usize = 28;
const GHOST_DIM: f32 = 0.45;
const SIGNAL_COLOR: Color32 = Color32::from_rgb(0, 255, 255);
const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

fn link_color(kind: LinkKind) -> Color32 {
    match kind {
        LinkKind::Hardware => Color32::from_rgba_unmultiplied(0, 210, 255, 0x88),
        LinkKind::Bridge => Color32::from_rgba_unmultiplied(255, 0, 255, 0x44),
        LinkKind::Dependency => Color32::from_rgba_unmultiplied(255, 255, 255, 51),
        LinkKind::Signal => SIGNAL_COLOR,
    }
}

fn link_width(kind: LinkKind) -> f32 {
    match kind {
        LinkKind::Hardware => 1.2,
        LinkKind::Bridge => 2.2,
        LinkKind::Dependency => 1.0,
        LinkKind::Signal => 1.7,
    }
}

/// Shape and fill per group, resolved once per frame from the taxonomy.
fn group_styles(settings: &MeshSettings) -> HashMap<NodeGroup, (NodeShape, Color32)> {
    NodeGroup::ALL
        .into_iter()
        .map(|group| {
            let taxonomy = settings.taxonomy(group);
            let color = parse_hex_color(&taxonomy.color).unwrap_or(Color32::from_gray(170));
            (group, (taxonomy.shape, color))
        })
        .collect()
}

impl ViewModel {
    fn update_screen_space(rect: egui::Rect, pan: Vec2, zoom: f32, cache: &mut RenderGraph) {
        let scratch = &mut cache.view_scratch;
        scratch.screen_positions.clear();
        scratch.screen_radii.clear();
        scratch.screen_positions.reserve(cache.nodes.len());
        scratch.screen_radii.reserve(cache.nodes.len());
        for render_node in &cache.nodes {
            scratch
                .screen_positions
                .push(world_to_screen(rect, pan, zoom, render_node.world_pos));
            scratch
                .screen_radii
                .push((render_node.base_radius * zoom.powf(0.40)).clamp(2.5, 46.0));
        }
    }

    /// Ghosts first, then small nodes under large ones.
    fn ensure_draw_order(cache: &mut RenderGraph) {
        if !cache.view_scratch.draw_order_dirty
            && cache.view_scratch.draw_order.len() == cache.nodes.len()
        {
            return;
        }

        cache.view_scratch.draw_order.clear();
        cache.view_scratch.draw_order.extend(0..cache.nodes.len());
        cache.view_scratch.draw_order.sort_by(|a, b| {
            let a = &cache.nodes[*a];
            let b = &cache.nodes[*b];
            (b.kind == NodeKind::Ghost)
                .cmp(&(a.kind == NodeKind::Ghost))
                .then_with(|| a.base_radius.total_cmp(&b.base_radius))
        });
        cache.view_scratch.draw_order_dirty = false;
    }

    fn cached_pseudo_matches(&mut self) -> Option<Arc<HashSet<usize>>> {
        let search_query = self.search.trim();
        if search_query.is_empty() {
            return None;
        }

        if let Some(cached) = &self.search_match_cache
            && cached.graph_revision == self.render_graph_revision
            && cached.query == search_query
        {
            return Some(Arc::clone(&cached.matches));
        }

        let cache = self.graph_cache.as_ref()?;
        let matcher = SkimMatcherV2::default();
        let matches = cache
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                fuzzy_match_score(&matcher, &node.display_name, search_query).is_some()
                    || fuzzy_match_score(&matcher, &node.id, search_query).is_some()
            })
            .map(|(index, _)| index)
            .collect::<HashSet<_>>();
        let matches = Arc::new(matches);

        self.search_match_cache = Some(SearchMatchCache {
            query: search_query.to_owned(),
            graph_revision: self.render_graph_revision,
            matches: Arc::clone(&matches),
        });

        Some(matches)
    }

    fn physics_config(&self, delta_seconds: f32) -> PhysicsConfig {
        PhysicsConfig {
            intensity: self.physics_intensity,
            repulsion_scale: self.physics_repulsion,
            spring_scale: self.physics_spring,
            collision_scale: self.physics_collision,
            velocity_damping: self.physics_velocity_damping,
            target_spread: self.physics_target_spread,
            spread_force: self.physics_spread_force,
            delta_seconds,
        }
    }

    fn draw_link(
        painter: &egui::Painter,
        link: &RenderLink,
        start: Pos2,
        end: Pos2,
        zoom_sqrt: f32,
        emphasis: Option<bool>,
    ) {
        let opacity = link.signal.map_or(1.0, |trace| trace.opacity);
        let base = with_opacity(link_color(link.kind), opacity);
        let mut width = (link_width(link.kind) * zoom_sqrt).clamp(0.5, 5.0);
        let color = match emphasis {
            Some(true) => {
                width *= 1.8;
                blend_color(base, SELECTED_COLOR, 0.5)
            }
            Some(false) => dim_color(base, 0.4),
            None => base,
        };
        let stroke = Stroke::new(width, color);

        let Some(trace) = link.signal else {
            painter.line_segment([start, end], stroke);
            return;
        };

        let control = curve_control_point(start, end, trace.curvature);
        let points = quadratic_points(start, control, end, 16);
        let head = points[points.len() * 4 / 5];
        painter.add(egui::Shape::line(points, stroke));
        painter.circle_filled(head, width + 1.2, color);
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_pan(&response);

        let pseudo_matches = self.cached_pseudo_matches();
        let pan = self.pan;
        let zoom = self.zoom;
        let show_quadtree_overlay = self.show_quadtree_overlay;
        let interaction_active = response.dragged();
        let frame_delta_seconds = ui
            .ctx()
            .input(|input| input.stable_dt)
            .clamp(1.0 / 240.0, 1.0 / 20.0);
        let physics = self.physics_config(frame_delta_seconds);
        let styles = group_styles(&self.settings);

        let Some(cache) = self.graph_cache.as_mut() else {
            self.visible_node_count = 0;
            self.visible_edge_count = 0;
            ui.label("No live agents in the mesh.");
            return;
        };

        let mut physics_moving = false;
        if self.live_physics {
            physics_moving = step_physics(cache, physics);
        }

        if physics_moving || interaction_active {
            ui.ctx().request_repaint();
        }

        Self::update_screen_space(rect, pan, zoom, cache);
        Self::visible_indices_into(
            rect,
            &cache.view_scratch.screen_positions,
            &cache.view_scratch.screen_radii,
            &mut cache.view_scratch.visible_indices,
        );
        cache.view_scratch.visible_mask.clear();
        cache
            .view_scratch
            .visible_mask
            .resize(cache.nodes.len(), false);
        for &index in &cache.view_scratch.visible_indices {
            if let Some(entry) = cache.view_scratch.visible_mask.get_mut(index) {
                *entry = true;
            }
        }
        self.visible_node_count = cache.view_scratch.visible_indices.len();

        if show_quadtree_overlay {
            quadtree_cells(
                &cache.nodes,
                &mut cache.view_scratch.quadtree_positions,
                &mut cache.view_scratch.quadtree_cells,
            );
            for cell in &cache.view_scratch.quadtree_cells {
                let min = cell.center - vec2(cell.half_extent, cell.half_extent);
                let max = cell.center + vec2(cell.half_extent, cell.half_extent);
                let top_left = world_to_screen(rect, pan, zoom, vec2(min.x, min.y));
                let bottom_right = world_to_screen(rect, pan, zoom, vec2(max.x, max.y));

                let alpha = if cell.is_leaf { 110 } else { 55 };
                let line_width = (1.4_f32 - (cell.depth as f32 * 0.09)).clamp(0.45, 1.4);
                painter.rect_stroke(
                    egui::Rect::from_two_pos(top_left, bottom_right),
                    0.0,
                    Stroke::new(line_width, Color32::from_rgba_unmultiplied(106, 198, 255, alpha)),
                    egui::StrokeKind::Middle,
                );
            }
        }

        let hovered = Self::hovered_index(
            ui,
            &cache.view_scratch.visible_indices,
            &cache.view_scratch.screen_positions,
            &cache.view_scratch.screen_radii,
        );

        if hovered.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }

        let pending_selection = if response.clicked_by(egui::PointerButton::Primary) {
            Some(hovered.and_then(|(index, _distance)| {
                cache.nodes.get(index).map(|node| node.id.clone())
            }))
        } else {
            None
        };

        let hovered_index = hovered.map(|(index, _)| index);
        let highlight = self.selected.as_deref().and_then(|id| {
            build_highlight_state_for_selected_id(cache, id, self.highlight_signal_partners)
        });
        let pseudo_active = pseudo_matches
            .as_ref()
            .is_some_and(|matches| !matches.is_empty());

        let zoom_sqrt = zoom.sqrt();
        let mut visible_edge_count = 0usize;
        for (link_index, link) in cache.links.iter().enumerate() {
            let (src, dst) = (link.source, link.target);
            if src >= cache.nodes.len() || dst >= cache.nodes.len() {
                continue;
            }

            let start = cache.view_scratch.screen_positions[src];
            let end = cache.view_scratch.screen_positions[dst];
            let any_visible = cache.view_scratch.visible_mask[src]
                || cache.view_scratch.visible_mask[dst];
            if !any_visible && !edge_visible(rect, start, end, 2.5) {
                continue;
            }

            let emphasis = highlight
                .as_ref()
                .map(|state| state.related_links.contains(&link_index));
            Self::draw_link(&painter, link, start, end, zoom_sqrt, emphasis);
            visible_edge_count += 1;
        }
        self.visible_edge_count = visible_edge_count;

        let mut selection_animating = false;

        Self::ensure_draw_order(cache);
        for index in cache.view_scratch.draw_order.iter().copied() {
            if !cache.view_scratch.visible_mask[index] {
                continue;
            }

            let render_node = &cache.nodes[index];
            let position = cache.view_scratch.screen_positions[index];
            let radius = cache.view_scratch.screen_radii[index];
            let (shape, group_color) = styles
                .get(&render_node.group)
                .copied()
                .unwrap_or((NodeShape::Circle, Color32::from_gray(170)));

            let is_selected = self.selected.as_deref() == Some(render_node.id.as_str());
            let is_hovered = hovered_index == Some(index);
            let is_related = highlight
                .as_ref()
                .is_some_and(|state| state.related_nodes.contains(&index));
            let is_pseudo_match = pseudo_matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&index));

            let base_color = if render_node.kind == NodeKind::Ghost {
                dim_color(group_color, GHOST_DIM)
            } else {
                group_color
            };
            let unselected_color = if is_hovered {
                blend_color(base_color, Color32::WHITE, 0.35)
            } else if is_pseudo_match {
                blend_color(base_color, Color32::from_rgb(103, 196, 255), 0.55)
            } else if highlight.is_some() && !is_related {
                dim_color(base_color, 0.45)
            } else if pseudo_active {
                dim_color(base_color, 0.38)
            } else {
                base_color
            };

            let selection_mix = ui.ctx().animate_bool(
                ui.make_persistent_id(("node-selection", render_node.id.as_str())),
                is_selected,
            );
            if selection_mix > 0.0 && selection_mix < 1.0 {
                selection_animating = true;
            }

            let color = blend_color(unselected_color, SELECTED_COLOR, selection_mix * 0.5);
            let stroke_width = if is_pseudo_match { 1.55 } else { 1.0 } + (selection_mix * 1.2);
            draw_node_shape(
                &painter,
                shape,
                position,
                radius,
                color,
                Stroke::new(stroke_width, Color32::from_rgba_unmultiplied(15, 15, 15, 190)),
            );

            if selection_mix > 0.0 {
                let halo_strength = (selection_mix * (1.0 - selection_mix) * 4.0).clamp(0.0, 1.0);
                let halo_alpha = (30.0 + (halo_strength * 145.0)) as u8;
                painter.circle_stroke(
                    position,
                    radius + 4.0 + ((1.0 - selection_mix) * 6.0),
                    Stroke::new(
                        1.0 + (halo_strength * 1.6),
                        Color32::from_rgba_unmultiplied(245, 206, 93, halo_alpha),
                    ),
                );
            }

            let should_draw_label = is_selected
                || is_related
                || is_hovered
                || (is_pseudo_match && zoom > 0.35)
                || radius > 12.0
                || zoom > 1.35;
            if should_draw_label {
                painter.text(
                    position + vec2(radius + 5.0, 0.0),
                    Align2::LEFT_CENTER,
                    clip_label(&render_node.display_name, LABEL_MAX_CHARS),
                    FontId::proportional(12.0),
                    Color32::from_gray(238),
                );
            }
        }

        if selection_animating {
            ui.ctx().request_repaint();
        }

        if let Some((hovered_index, _)) = hovered
            && let Some(node) = cache.nodes.get(hovered_index)
        {
            let panel_text = format!(
                "{}  |  {}  |  {}  |  links {}",
                node.display_name,
                node.kind.label(),
                node.status,
                cache.neighbors.get(hovered_index).map_or(0, Vec::len)
            );
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                panel_text,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }

        if let Some(selected) = pending_selection {
            self.set_selected(selected);
        }
    }
}
