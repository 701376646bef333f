use chrono::Local;
use eframe::egui::{self, Align, Color32, Layout, RichText, Ui};

use crate::mesh::{MemoryRecord, MessageRecord, parse_utc};
use crate::util::{clip_label, format_age};

use super::super::{Activity, ViewModel};

const SENDER_COLOR: Color32 = Color32::from_rgb(0, 255, 136);
const TARGET_COLOR: Color32 = Color32::from_rgb(0, 210, 255);

/// Wall-clock time of a history entry, or the raw value when it does not parse.
fn message_time(ts: &str) -> String {
    parse_utc(ts).map_or_else(
        || ts.to_owned(),
        |at| at.with_timezone(&Local).format("%H:%M:%S").to_string(),
    )
}

fn memory_matches(memory: &MemoryRecord, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty()
        || memory.body().to_lowercase().contains(&query)
        || memory.kind_label().to_lowercase().contains(&query)
}

/// Agent id in the log; a link when the agent is in the mesh. Returns the id when clicked.
fn endpoint_label(ui: &mut Ui, id: &str, color: Color32, in_mesh: bool) -> Option<String> {
    let text = RichText::new(clip_label(id, 24).into_owned())
        .strong()
        .color(color);
    if !in_mesh {
        ui.label(text);
        return None;
    }
    ui.link(text)
        .on_hover_text("Select in graph")
        .clicked()
        .then(|| id.to_owned())
}

impl ViewModel {
    pub(in crate::app) fn draw_message_log(&mut self, ui: &mut Ui, messages: &[MessageRecord]) {
        ui.strong(format!("Message log (last {})", messages.len()));
        ui.separator();

        if messages.is_empty() {
            ui.label("No messages in the history feed.");
            return;
        }

        let in_mesh = |id: &str| {
            self.graph_cache
                .as_ref()
                .is_some_and(|cache| cache.index_by_id.contains_key(id))
        };
        let mut clicked = None;
        egui::ScrollArea::vertical()
            .id_salt("message_log_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for message in messages {
                    ui.horizontal(|ui| {
                        ui.small(message_time(&message.ts));
                        let sender = endpoint_label(
                            ui,
                            &message.sender,
                            SENDER_COLOR,
                            in_mesh(&message.sender),
                        );
                        ui.label("→");
                        let target = endpoint_label(
                            ui,
                            &message.target,
                            TARGET_COLOR,
                            in_mesh(&message.target),
                        );
                        if let Some(id) = sender.or(target) {
                            clicked = Some(id);
                        }

                        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                            if !message.state.is_empty() {
                                ui.small(format!("state: {}", message.state));
                            }
                            if !message.topic.is_empty() {
                                ui.small(format!("topic: {}", message.topic));
                            }
                        });
                    });
                }
            });

        if clicked.is_some() {
            self.set_selected(clicked);
        }
    }

    pub(in crate::app) fn draw_knowledge(&mut self, ui: &mut Ui, activity: &Activity<'_>) {
        ui.horizontal(|ui| {
            ui.strong("Knowledge");
            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if ui
                    .small_button("Refresh")
                    .on_hover_text("Fetch this agent's memories again.")
                    .clicked()
                {
                    self.pending.refresh_memories = true;
                }
            });
        });

        let Some(snapshot) = activity.memories else {
            if activity.memories_pending {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading memories...");
                });
            } else {
                ui.label("Select an agent to see its memories.");
            }
            return;
        };

        ui.small(format!(
            "{} memories for {}, fetched {} ago",
            snapshot.memories.len(),
            snapshot.agent_id,
            format_age(snapshot.fetched_at.elapsed().as_millis() as i64)
        ));
        ui.add(
            egui::TextEdit::singleline(&mut self.memory_filter).hint_text("Filter memories"),
        );

        let shown = snapshot
            .memories
            .iter()
            .filter(|memory| memory_matches(memory, &self.memory_filter))
            .collect::<Vec<_>>();
        if shown.is_empty() {
            ui.label("No memories found for this agent.");
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("memory_scroll")
            .max_height(280.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for memory in shown {
                    ui.label(RichText::new(memory.kind_label()).strong().color(SENDER_COLOR));
                    ui.label(memory.body());
                    ui.small(format!("score: {}", memory.score_text()));
                    ui.separator();
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(kind: Option<&str>, content: &str) -> MemoryRecord {
        MemoryRecord {
            kind: kind.map(str::to_owned),
            content: Some(content.to_owned()),
            text: None,
            score: None,
        }
    }

    #[test]
    fn unparsable_timestamps_are_shown_verbatim() {
        assert_eq!(message_time("yesterday"), "yesterday");

        let shown = message_time("2026-10-18T09:15:30Z");
        assert_eq!(shown.len(), 8);
        assert_eq!(shown.matches(':').count(), 2);
    }

    #[test]
    fn memory_filter_checks_body_and_kind() {
        let preference = memory(Some("Preference"), "Prefers short replies");
        let fact = memory(None, "Deploys on Fridays");

        assert!(memory_matches(&preference, ""));
        assert!(memory_matches(&preference, "  SHORT "));
        assert!(memory_matches(&fact, "fact"));
        assert!(!memory_matches(&fact, "replies"));
    }
}
