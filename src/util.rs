use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn format_age(age_ms: i64) -> String {
    let age_ms = age_ms.max(0);
    if age_ms < 1_000 {
        return format!("{age_ms} ms");
    }

    let seconds = age_ms as f64 / 1_000.0;
    if seconds < 60.0 {
        format!("{seconds:.1} s")
    } else if seconds < 3_600.0 {
        format!("{:.0} min", seconds / 60.0)
    } else {
        format!("{:.1} h", seconds / 3_600.0)
    }
}

/// Shortens a canvas label to `max_chars`, appending an ellipsis when cut.
pub fn clip_label(label: &str, max_chars: usize) -> std::borrow::Cow<'_, str> {
    if label.chars().count() <= max_chars {
        return std::borrow::Cow::Borrowed(label);
    }

    let mut clipped = label
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    clipped.push('…');
    std::borrow::Cow::Owned(clipped)
}

/// Deterministic pseudo-random pair in `[-1, 1]` derived from an id.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}
