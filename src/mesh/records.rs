use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: String,
    #[serde(rename = "node_id")]
    pub host_id: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: String,
    pub last_seen: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl AgentRecord {
    /// Parent id with blank values treated as missing.
    pub fn parent(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .map(str::trim)
            .filter(|parent| !parent.is_empty())
    }

    pub fn operator_label(&self) -> Option<&str> {
        self.operator
            .as_deref()
            .map(str::trim)
            .filter(|operator| !operator.is_empty())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: i64,
    pub ts: String,
    pub sender: String,
    pub target: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub state: String,
}

/// One entry of an agent's knowledge store.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MemoryRecord {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Older stores put the body here instead of `content`.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl MemoryRecord {
    pub fn kind_label(&self) -> &str {
        self.kind
            .as_deref()
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .unwrap_or("Fact")
    }

    pub fn body(&self) -> &str {
        self.content
            .as_deref()
            .filter(|content| !content.trim().is_empty())
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    pub fn score_text(&self) -> String {
        self.score
            .filter(|score| score.is_finite())
            .map_or_else(|| "N/A".to_owned(), |score| format!("{score:.2}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_roster_entry_uses_wire_field_names() {
        let raw = r#"{
            "id": "claude-1",
            "node_id": "pc-win11-a",
            "operator": "Claude Code",
            "version": null,
            "status": "active",
            "last_seen": "2026-10-18T09:00:00",
            "parent_id": null,
            "capabilities": ["wake"]
        }"#;

        let agent: AgentRecord = serde_json::from_str(raw).expect("parse agent");
        assert_eq!(agent.host_id, "pc-win11-a");
        assert_eq!(agent.operator_label(), Some("Claude Code"));
        assert_eq!(agent.parent(), None);
    }

    #[test]
    fn blank_parent_and_operator_are_treated_as_missing() {
        let raw = r#"{"id":"a","node_id":"h","operator":"  ","status":"active","last_seen":"x","parent_id":""}"#;
        let agent: AgentRecord = serde_json::from_str(raw).expect("parse agent");
        assert_eq!(agent.parent(), None);
        assert_eq!(agent.operator_label(), None);
    }

    #[test]
    fn history_entry_tolerates_missing_topic_and_state() {
        let raw = r#"[{"id": 7, "ts": "2026-10-18T09:00:00Z", "sender": "a", "target": "b"}]"#;
        let messages: Vec<MessageRecord> = serde_json::from_str(raw).expect("parse history");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "");
        assert_eq!(messages[0].sender, "a");
    }

    #[test]
    fn memory_entry_falls_back_to_text_and_default_kind() {
        let raw = r#"[
            {"type": "Preference", "content": "prefers short replies", "score": 0.8765},
            {"text": "deploys on fridays", "score": null, "embedding": [0.1]}
        ]"#;
        let memories: Vec<MemoryRecord> = serde_json::from_str(raw).expect("parse memories");

        assert_eq!(memories[0].kind_label(), "Preference");
        assert_eq!(memories[0].body(), "prefers short replies");
        assert_eq!(memories[0].score_text(), "0.88");

        assert_eq!(memories[1].kind_label(), "Fact");
        assert_eq!(memories[1].body(), "deploys on fridays");
        assert_eq!(memories[1].score_text(), "N/A");
    }
}
