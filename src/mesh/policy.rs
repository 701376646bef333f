use chrono::Duration;

pub const DEFAULT_LIVENESS_HOURS: i64 = 24;
pub const SIGNAL_TTL_MS: i64 = 30_000;
pub const SIGNAL_MIN_OPACITY: f32 = 0.1;
pub const SIGNAL_CURVATURE: f32 = 0.4;

/// Deployment-specific rules the synchronizer classifies and links by.
#[derive(Clone, Debug)]
pub struct MeshPolicy {
    pub liveness_window: Duration,
    pub signal_ttl_ms: i64,
    /// Substring identifying the central hub host.
    pub hub_pattern: String,
    /// Substring identifying the primary local host, used as bridge anchor when no hub reports.
    pub local_pattern: String,
    pub control_plane_ids: Vec<String>,
    pub root_operators: Vec<String>,
}

impl Default for MeshPolicy {
    fn default() -> Self {
        Self {
            liveness_window: Duration::hours(DEFAULT_LIVENESS_HOURS),
            signal_ttl_ms: SIGNAL_TTL_MS,
            hub_pattern: "srv906866".to_owned(),
            local_pattern: "pc-win11".to_owned(),
            control_plane_ids: vec!["control-plane".to_owned()],
            root_operators: vec!["Claude".to_owned(), "Antigravity".to_owned()],
        }
    }
}

impl MeshPolicy {
    pub fn is_hub_host(&self, host_id: &str) -> bool {
        !self.hub_pattern.is_empty() && host_id.contains(&self.hub_pattern)
    }

    pub fn is_local_host(&self, host_id: &str) -> bool {
        !self.local_pattern.is_empty() && host_id.contains(&self.local_pattern)
    }

    pub fn is_control_plane(&self, id: &str) -> bool {
        self.control_plane_ids.iter().any(|candidate| candidate == id)
    }

    pub fn is_root_operator(&self, operator: &str) -> bool {
        let operator = operator.to_lowercase();
        self.root_operators
            .iter()
            .filter(|family| !family.is_empty())
            .any(|family| operator.contains(&family.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_patterns_match_substrings() {
        let policy = MeshPolicy::default();
        assert!(policy.is_hub_host("srv906866.hstgr.cloud"));
        assert!(!policy.is_hub_host("pc-win11-zbook"));
        assert!(policy.is_local_host("pc-win11-zbook"));
    }

    #[test]
    fn empty_patterns_never_match() {
        let policy = MeshPolicy {
            hub_pattern: String::new(),
            local_pattern: String::new(),
            ..MeshPolicy::default()
        };
        assert!(!policy.is_hub_host("anything"));
        assert!(!policy.is_local_host("anything"));
    }

    #[test]
    fn root_operator_families_ignore_case() {
        let policy = MeshPolicy::default();
        assert!(policy.is_root_operator("claude-code"));
        assert!(policy.is_root_operator("Antigravity IDE"));
        assert!(!policy.is_root_operator("gemini-cli"));
    }
}
