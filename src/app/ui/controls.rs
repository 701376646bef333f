use std::ops::RangeInclusive;

use eframe::egui::{self, Align, Key, Layout, Response, Ui};

use crate::mesh::{NodeGroup, NodeShape};
use crate::util::clip_label;

use super::super::render_utils::{format_hex_color, parse_hex_color};
use super::super::ViewModel;

const SLIDER_KEY_BASE_RATE: f32 = 10.0;
const SLIDER_KEY_ACCEL_PER_SEC: f32 = 9.0;
const SLIDER_KEY_ACCEL_MAX: f32 = 40.0;
const ROSTER_ROW_HEIGHT: f32 = 22.0;

#[derive(Clone, Copy, Default)]
struct SliderKeyHoldState {
    positive_secs: f32,
    negative_secs: f32,
}

fn slider_key_accel_multiplier(hold_secs: f32) -> f32 {
    let ramp = hold_secs * SLIDER_KEY_ACCEL_PER_SEC;
    (1.0 + ramp + ramp * ramp * 0.15).min(SLIDER_KEY_ACCEL_MAX)
}

fn default_slider_key_step(min: f32, max: f32) -> f32 {
    ((max - min) / 200.0).max(0.0005)
}

/// Holding an arrow key on a focused slider speeds up the longer it is held.
fn apply_slider_arrow_acceleration(
    ui: &Ui,
    response: &Response,
    value: &mut f32,
    range: RangeInclusive<f32>,
) {
    let (min, max) = (*range.start(), *range.end());
    let state_id = response.id.with("arrow_key_hold_state");
    let mut hold_state = ui.ctx().data(|data| {
        data.get_temp::<SliderKeyHoldState>(state_id)
            .unwrap_or_default()
    });

    if !response.has_focus() {
        ui.ctx()
            .data_mut(|data| data.insert_temp(state_id, SliderKeyHoldState::default()));
        return;
    }

    let (delta_time, increase_down, decrease_down) = ui.input(|input| {
        (
            input.stable_dt.min(0.1),
            input.key_down(Key::ArrowRight) || input.key_down(Key::ArrowUp),
            input.key_down(Key::ArrowLeft) || input.key_down(Key::ArrowDown),
        )
    });

    hold_state.positive_secs = if increase_down {
        hold_state.positive_secs + delta_time
    } else {
        0.0
    };
    hold_state.negative_secs = if decrease_down {
        hold_state.negative_secs + delta_time
    } else {
        0.0
    };

    let direction = (increase_down as i8) - (decrease_down as i8);
    if direction != 0 {
        let hold_secs = if direction > 0 {
            hold_state.positive_secs
        } else {
            hold_state.negative_secs
        };
        let speed = SLIDER_KEY_BASE_RATE * slider_key_accel_multiplier(hold_secs);
        let delta = direction as f32 * default_slider_key_step(min, max) * speed * delta_time;

        *value = (*value + delta).clamp(min, max);
        ui.ctx().request_repaint();
    }

    ui.ctx()
        .data_mut(|data| data.insert_temp(state_id, hold_state));
}

fn tuning_slider(
    ui: &mut Ui,
    value: &mut f32,
    range: RangeInclusive<f32>,
    text: &str,
    hover: &str,
) {
    let response = ui
        .add(
            egui::Slider::new(value, range.clone())
                .text(text)
                .clamping(egui::SliderClamping::Always),
        )
        .on_hover_text(hover);
    if response.hovered() {
        response.request_focus();
    }
    apply_slider_arrow_acceleration(ui, &response, value, range);
}

/// A slider whose value only exists while its checkbox is ticked.
pub(in crate::app) fn optional_slider(
    ui: &mut Ui,
    value: &mut Option<f32>,
    range: RangeInclusive<f32>,
    default: f32,
    text: &str,
) -> bool {
    let mut enabled = value.is_some();
    let mut changed = false;

    ui.horizontal(|ui| {
        if ui
            .checkbox(&mut enabled, "")
            .on_hover_text("Override the default value")
            .changed()
        {
            *value = enabled.then_some(value.unwrap_or(default));
            changed = true;
        }

        let mut current = value.unwrap_or(default);
        let response = ui.add_enabled(
            enabled,
            egui::Slider::new(&mut current, range)
                .text(text)
                .clamping(egui::SliderClamping::Always),
        );
        if enabled && response.changed() {
            *value = Some(current);
            changed = true;
        }
    });

    changed
}

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Mesh Controls");
        ui.separator();
        ui.add_space(4.0);

        ui.label("Search (name or id)")
            .on_hover_text("Fuzzy-highlight matching nodes without changing the graph.");
        ui.text_edit_singleline(&mut self.search)
            .on_hover_text("Type to highlight matching nodes, then click one to select it.");

        ui.separator();
        ui.label("Layers");
        self.pending.layers |= ui
            .checkbox(&mut self.layers.infrastructure, "Show infrastructure")
            .on_hover_text("Hosts plus hardware, dependency and bridge links.")
            .changed();
        self.pending.layers |= ui
            .checkbox(&mut self.layers.signals, "Show signals")
            .on_hover_text("Curved links for messages sent in the last 30 seconds.")
            .changed();

        ui.separator();
        ui.checkbox(&mut self.live_physics, "Live physics simulation")
            .on_hover_text("Continuously simulate layout forces while viewing the mesh.");
        ui.checkbox(&mut self.highlight_signal_partners, "Highlight signal partners")
            .on_hover_text("Treat recent message partners as neighbours of the selection.");
        ui.checkbox(&mut self.show_quadtree_overlay, "Show quadtree overlay")
            .on_hover_text("Draw the active quadtree partitions over the graph canvas.");

        ui.collapsing("Physics tuning", |ui| self.draw_physics_tuning(ui));
        ui.collapsing("Group taxonomy", |ui| self.draw_taxonomy_editor(ui));

        ui.separator();
        egui::CollapsingHeader::new("Roster")
            .default_open(true)
            .show(ui, |ui| self.draw_roster(ui));
    }

    fn draw_physics_tuning(&mut self, ui: &mut Ui) {
        tuning_slider(
            ui,
            &mut self.physics_intensity,
            0.2..=2.5,
            "Intensity",
            "Overall strength applied to all physics forces.",
        );
        tuning_slider(
            ui,
            &mut self.physics_repulsion,
            0.25..=2.6,
            "Repulsion",
            "Global multiplier on every node's charge.",
        );
        tuning_slider(
            ui,
            &mut self.physics_spring,
            0.2..=2.2,
            "Link spring",
            "Global multiplier on every link's strength.",
        );
        tuning_slider(
            ui,
            &mut self.physics_collision,
            0.2..=2.0,
            "Collision",
            "Extra separation force to prevent overlap between nearby nodes.",
        );
        tuning_slider(
            ui,
            &mut self.physics_velocity_damping,
            0.78..=0.97,
            "Velocity damping",
            "How quickly node movement slows each frame.",
        );
        tuning_slider(
            ui,
            &mut self.physics_target_spread,
            0.6..=2.0,
            "Target spread",
            "Preferred overall radius of the layout.",
        );
        tuning_slider(
            ui,
            &mut self.physics_spread_force,
            0.0..=0.08,
            "Spread correction",
            "How aggressively layout drift is corrected over time.",
        );
    }

    fn draw_taxonomy_editor(&mut self, ui: &mut Ui) {
        let mut changed = false;

        for group in NodeGroup::ALL {
            let mut taxonomy = self.settings.taxonomy(group);
            let mut group_changed = false;
            egui::CollapsingHeader::new(taxonomy.label.clone())
                .id_salt(("taxonomy", group))
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Label");
                        group_changed |= ui.text_edit_singleline(&mut taxonomy.label).changed();
                    });

                    egui::ComboBox::from_id_salt(("taxonomy-shape", group))
                        .selected_text(taxonomy.shape.label())
                        .show_ui(ui, |ui| {
                            for shape in NodeShape::ALL {
                                group_changed |= ui
                                    .selectable_value(&mut taxonomy.shape, shape, shape.label())
                                    .changed();
                            }
                        });

                    ui.horizontal(|ui| {
                        ui.label("Color");
                        let mut swatch =
                            parse_hex_color(&taxonomy.color).unwrap_or(egui::Color32::GRAY);
                        if ui.color_edit_button_srgba(&mut swatch).changed() {
                            taxonomy.color = format_hex_color(swatch);
                            group_changed = true;
                        }
                        let text = ui.add(
                            egui::TextEdit::singleline(&mut taxonomy.color).desired_width(90.0),
                        );
                        group_changed |= text.changed();
                        if parse_hex_color(&taxonomy.color).is_none() {
                            ui.colored_label(egui::Color32::from_rgb(240, 110, 90), "invalid");
                        }
                    });

                    group_changed |= ui
                        .add(
                            egui::Slider::new(&mut taxonomy.base_size, 1.0..=60.0)
                                .text("Base size")
                                .clamping(egui::SliderClamping::Always),
                        )
                        .changed();
                    group_changed |= optional_slider(
                        ui,
                        &mut taxonomy.size_multiplier,
                        0.1..=5.0,
                        1.0,
                        "Size multiplier",
                    );
                });

            // Untouched groups keep following the built-in defaults.
            if group_changed {
                *self.settings.taxonomy_mut(group) = taxonomy;
                changed = true;
            }
        }

        if ui.button("Restore default taxonomy").clicked() {
            self.settings.group_taxonomy.clear();
            changed = true;
        }

        self.pending.style |= changed;
    }

    fn draw_roster(&mut self, ui: &mut Ui) {
        let Some(cache) = self.graph_cache.as_ref() else {
            ui.label("No mesh yet.");
            return;
        };

        let mut rows = (0..cache.nodes.len()).collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            let a = &cache.nodes[*a];
            let b = &cache.nodes[*b];
            a.group
                .cmp(&b.group)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });

        let mut selected_id = None;
        egui::ScrollArea::vertical()
            .id_salt("roster_scroll")
            .max_height(260.0)
            .auto_shrink([false, false])
            .show_rows(ui, ROSTER_ROW_HEIGHT, rows.len(), |ui, row_range| {
                for &index in &rows[row_range] {
                    let node = &cache.nodes[index];
                    let is_selected = self.selected.as_deref() == Some(node.id.as_str());

                    let clicked = ui
                        .horizontal(|ui| {
                            let clicked = ui
                                .selectable_label(is_selected, clip_label(&node.display_name, 30).into_owned())
                                .on_hover_text(node.id.as_str())
                                .clicked();
                            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                                ui.label(node.kind.label());
                            });
                            clicked
                        })
                        .inner;

                    if clicked {
                        selected_id = Some(node.id.clone());
                    }
                }
            });

        if let Some(id) = selected_id {
            self.set_selected(Some(id));
        }
    }
}
