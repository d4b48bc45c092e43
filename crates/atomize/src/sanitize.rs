//! Content sanitization: strip serialized metadata wrappers while preserving
//! semantic content.
//!
//! Scraped and exported documents frequently arrive wrapped in one or more
//! layers of JSON serialization (chat exports, API captures). The sanitizer
//! peels up to three such layers, drops metadata-only keys by name, and
//! collapses escape-sequence debris. Everything else passes through
//! verbatim, and a second application is a no-op.

use serde_json::Value;

/// Keys whose string values are the semantic payload of a wrapper.
const CONTENT_KEYS: [&str; 2] = ["response_content", "thinking_content"];

/// Keys that carry serialization metadata only; their values are dropped.
const DISCARD_KEYS: [&str; 3] = ["type", "timestamp", "source"];

/// Maximum wrapper layers peeled in one call.
const MAX_UNWRAP_PASSES: usize = 3;

/// Sanitize `text`: unwrap JSON metadata wrappers (at most three passes),
/// then collapse runs of two or more backslashes to `/`.
pub fn sanitize(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_UNWRAP_PASSES {
        match unwrap_layer(&current) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    collapse_backslash_runs(&current)
}

/// Peel one serialization layer, or return `None` when `text` is not a
/// recognizable wrapper. Plain prose — even prose that happens to parse as a
/// JSON scalar — is left alone; only objects carrying at least one known
/// metadata key count as wrappers.
fn unwrap_layer(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('"')) {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    match value {
        // A bare JSON string is an escaping layer around the real content.
        Value::String(inner) => Some(inner),
        Value::Object(map) => {
            let known = CONTENT_KEYS
                .iter()
                .chain(DISCARD_KEYS.iter())
                .any(|k| map.contains_key(*k));
            if !known {
                return None;
            }
            let mut parts: Vec<String> = Vec::new();
            for key in CONTENT_KEYS {
                if let Some(Value::String(s)) = map.get(key) {
                    if !s.trim().is_empty() {
                        parts.push(s.clone());
                    }
                }
            }
            for (key, val) in &map {
                if CONTENT_KEYS.contains(&key.as_str()) || DISCARD_KEYS.contains(&key.as_str()) {
                    continue;
                }
                match val {
                    Value::String(s) if !s.trim().is_empty() => parts.push(s.clone()),
                    Value::Null => {}
                    Value::String(_) => {}
                    other => parts.push(other.to_string()),
                }
            }
            Some(parts.join("\n\n"))
        }
        _ => None,
    }
}

/// Collapse every run of two or more backslashes into a single `/`.
fn collapse_backslash_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for ch in text.chars() {
        if ch == '\\' {
            run += 1;
            continue;
        }
        match run {
            0 => {}
            1 => out.push('\\'),
            _ => out.push('/'),
        }
        run = 0;
        out.push(ch);
    }
    match run {
        0 => {}
        1 => out.push('\\'),
        _ => out.push('/'),
    }
    out
}
