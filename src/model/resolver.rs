//! Parameter Resolver: late-binds `${task_id.segment.segment}` references
//! in a task's parameter map to values produced by prior tasks.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

/// Recursively resolves every string value in `parameters` against the
/// completed-task outputs in `results`. Lists and maps are walked; other
/// scalars pass through unchanged. Only a whole-string match of
/// `${task_id(.segment)*}` is treated as a reference — no interpolation
/// inside a larger string.
pub fn resolve_parameters(
    parameters: &HashMap<String, Value>,
    results: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    parameters
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results)))
        .collect()
}

fn resolve_value(value: &Value, results: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => resolve_string(s, results),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, results)).collect())
        }
        Value::Object(map) => {
            let resolved = map
                .iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, results)))
                .collect();
            Value::Object(resolved)
        }
        other => other.clone(),
    }
}

fn parse_reference(s: &str) -> Option<&str> {
    let s = s.trim();
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.is_empty() {
        return None;
    }
    Some(inner)
}

fn resolve_string(s: &str, results: &HashMap<String, Value>) -> Value {
    let Some(reference) = parse_reference(s) else {
        return Value::String(s.to_string());
    };

    let mut segments = reference.split('.');
    let Some(task_id) = segments.next() else {
        return Value::String(s.to_string());
    };

    let Some(root) = results.get(task_id) else {
        warn!(reference = %reference, "parameter reference points to unknown or incomplete task; substituting []");
        return Value::Array(vec![]);
    };

    let mut current = root;
    for segment in segments {
        match current.get(segment) {
            Some(next) => current = next,
            None => {
                warn!(reference = %reference, segment, "parameter reference missing segment; substituting []");
                return Value::Array(vec![]);
            }
        }
    }

    current.clone()
}
