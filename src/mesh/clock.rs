use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::records::AgentRecord;

/// Parses a feed timestamp as UTC.
///
/// The feeds emit naive ISO-8601 strings that are implicitly UTC, so a missing
/// zone marker is replaced with `Z` rather than falling back to local time.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut normalized = trimmed.to_owned();
    if normalized.len() > 10 && normalized.as_bytes()[10] == b' ' {
        normalized.replace_range(10..11, "T");
    }
    if !has_zone_marker(&normalized) {
        normalized.push('Z');
    }

    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn has_zone_marker(value: &str) -> bool {
    if value.ends_with('Z') || value.ends_with('z') {
        return true;
    }

    value
        .split_once('T')
        .is_some_and(|(_, time)| time.contains('+') || time.contains('-'))
}

pub fn age_ms(raw: &str, now: DateTime<Utc>) -> Option<i64> {
    parse_utc(raw).map(|seen| (now - seen).num_milliseconds())
}

/// Agents whose last heartbeat is younger than `window`, in roster order.
pub fn live_agents<'a>(
    agents: &'a [AgentRecord],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<&'a AgentRecord> {
    let window_ms = window.num_milliseconds();

    agents
        .iter()
        .filter(|agent| match age_ms(&agent.last_seen, now) {
            Some(age) => age < window_ms,
            None => {
                debug!(agent = %agent.id, last_seen = %agent.last_seen, "unparsable heartbeat, treating agent as stale");
                false
            }
        })
        .collect()
}
