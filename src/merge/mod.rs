//! Result Merger: combines heterogeneous subdomain-shaped records from
//! multiple source tasks under a configurable collision strategy.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::model::task::MergeStrategy;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge source '{0}' did not complete successfully")]
    SourceNotCompleted(String),
}

/// `ips`/`asns` are treated as set-valued fields: scalars are singleton
/// sets, lists are unioned on collision.
const SET_FIELDS: [&str; 2] = ["ips", "asns"];

fn as_value_set(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => vec![],
        other => vec![other.clone()],
    }
}

fn union_sorted(a: &Value, b: &Value) -> Value {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for item in as_value_set(a).into_iter().chain(as_value_set(b)) {
        let key = item.to_string();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(item);
        }
    }
    out.sort_by_key(|v| v.to_string());
    Value::Array(out)
}

/// Runs the merge algorithm over already-extracted per-source item lists.
/// Each entry in `sources` is `(source_id, items)`.
pub fn merge(
    sources: Vec<(String, Vec<Value>)>,
    dedupe_key: &str,
    strategy: MergeStrategy,
) -> Vec<Value> {
    let mut accumulator: Vec<(String, Map<String, Value>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (source_id, items) in sources {
        for item in items {
            let Value::Object(map) = item else {
                warn!("merge source '{source_id}' produced a non-object item; skipping");
                continue;
            };
            let Some(key_value) = map.get(dedupe_key) else {
                warn!("merge source '{source_id}' item missing dedupe key '{dedupe_key}'; skipping");
                continue;
            };
            let key = key_value.to_string();

            match strategy {
                MergeStrategy::Combine => {
                    if let Some(&pos) = index.get(&key) {
                        let existing = &mut accumulator[pos].1;
                        for (field, value) in map.iter() {
                            if SET_FIELDS.contains(&field.as_str()) {
                                let merged = union_sorted(
                                    existing.get(field).unwrap_or(&Value::Array(vec![])),
                                    value,
                                );
                                existing.insert(field.clone(), merged);
                            } else if !existing.contains_key(field) {
                                existing.insert(field.clone(), value.clone());
                            }
                        }
                    } else {
                        index.insert(key.clone(), accumulator.len());
                        accumulator.push((key, map));
                    }
                }
                MergeStrategy::Replace => {
                    if let Some(&pos) = index.get(&key) {
                        accumulator[pos] = (key, map);
                    } else {
                        index.insert(key.clone(), accumulator.len());
                        accumulator.push((key, map));
                    }
                }
                MergeStrategy::Append => {
                    let rekeyed = format!("{key}_{source_id}");
                    accumulator.push((rekeyed, map));
                }
            }
        }
    }

    accumulator
        .into_iter()
        .map(|(_, map)| Value::Object(map))
        .collect()
}

/// Extracts the list payload a source task contributes: `output[field]`
/// when `merge_field` is set, else the whole `output` map interpreted as a
/// list under its only list-valued entry, falling back to treating the
/// output itself as the item list. A scalar item (e.g. a plain name
/// string) is wrapped as `{"_value": item}` so it can still be deduped by
/// a `dedupe_key` of `_value`, rather than being silently dropped by
/// `merge`'s "items must be objects" rule.
pub fn extract_source_items(output: &HashMap<String, Value>, merge_field: Option<&str>) -> Vec<Value> {
    let payload = match merge_field {
        Some(field) => output.get(field).cloned(),
        None => Some(Value::Object(output.clone().into_iter().collect())),
    };

    match payload {
        Some(Value::Array(items)) => items.into_iter().map(wrap_scalar).collect(),
        Some(_) | None => {
            warn!("merge source payload is not a list; skipping");
            vec![]
        }
    }
}

fn wrap_scalar(item: Value) -> Value {
    match item {
        Value::Object(_) => item,
        scalar => {
            let mut map = Map::new();
            map.insert("_value".to_string(), scalar);
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(name: &str, ips: &[&str]) -> Value {
        json!({"name": name, "ips": ips, "source": "tool"})
    }

    #[test]
    fn combine_unions_ip_lists() {
        let sources = vec![
            ("p".to_string(), vec![item("a.example.com", &["1.1.1.1"])]),
            ("q".to_string(), vec![item("a.example.com", &["2.2.2.2"])]),
        ];
        let merged = merge(sources, "name", MergeStrategy::Combine);
        assert_eq!(merged.len(), 1);
        let ips = merged[0]["ips"].as_array().unwrap();
        assert_eq!(ips.len(), 2);
    }

    #[test]
    fn combine_fills_missing_fields_without_overwriting() {
        let mut first = item("a.example.com", &["1.1.1.1"]);
        first["source"] = json!("subfinder");
        let mut second = item("a.example.com", &["2.2.2.2"]);
        second["source"] = json!("amass");
        second["asns"] = json!(["AS123"]);

        let sources = vec![
            ("p".to_string(), vec![first]),
            ("q".to_string(), vec![second]),
        ];
        let merged = merge(sources, "name", MergeStrategy::Combine);
        assert_eq!(merged[0]["source"], "subfinder");
        assert_eq!(merged[0]["asns"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn replace_lets_last_source_win() {
        let sources = vec![
            ("p".to_string(), vec![item("a.example.com", &["1.1.1.1"])]),
            ("q".to_string(), vec![item("a.example.com", &["2.2.2.2"])]),
        ];
        let merged = merge(sources, "name", MergeStrategy::Replace);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["ips"], json!(["2.2.2.2"]));
    }

    #[test]
    fn append_never_dedupes() {
        let sources = vec![
            ("p".to_string(), vec![item("a.example.com", &["1.1.1.1"])]),
            ("q".to_string(), vec![item("a.example.com", &["2.2.2.2"])]),
        ];
        let merged = merge(sources, "name", MergeStrategy::Append);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn combine_is_idempotent() {
        let sources = vec![("p".to_string(), vec![item("a.example.com", &["1.1.1.1"])])];
        let first = merge(sources.clone(), "name", MergeStrategy::Combine);
        let second = merge(sources, "name", MergeStrategy::Combine);
        assert_eq!(first, second);
    }

    #[test]
    fn combine_is_commutative_on_non_colliding_keys() {
        let sources_ab = vec![
            ("p".to_string(), vec![item("a.example.com", &["1.1.1.1"])]),
            ("q".to_string(), vec![item("b.example.com", &["2.2.2.2"])]),
        ];
        let sources_ba = vec![
            ("q".to_string(), vec![item("b.example.com", &["2.2.2.2"])]),
            ("p".to_string(), vec![item("a.example.com", &["1.1.1.1"])]),
        ];
        let mut merged_ab = merge(sources_ab, "name", MergeStrategy::Combine);
        let mut merged_ba = merge(sources_ba, "name", MergeStrategy::Combine);
        merged_ab.sort_by_key(|v| v["name"].to_string());
        merged_ba.sort_by_key(|v| v["name"].to_string());
        assert_eq!(merged_ab, merged_ba);
    }

    #[test]
    fn items_missing_dedupe_key_are_skipped() {
        let sources = vec![("p".to_string(), vec![json!({"ips": ["1.1.1.1"]})])];
        let merged = merge(sources, "name", MergeStrategy::Combine);
        assert!(merged.is_empty());
    }

    #[test]
    fn scalar_items_are_wrapped_and_deduped_by_value() {
        let mut p = HashMap::new();
        p.insert("names".to_string(), json!(["a", "b"]));
        let mut q = HashMap::new();
        q.insert("names".to_string(), json!(["b", "c"]));

        let p_items = extract_source_items(&p, Some("names"));
        let q_items = extract_source_items(&q, Some("names"));
        let sources = vec![("p".to_string(), p_items), ("q".to_string(), q_items)];

        let merged = merge(sources, "_value", MergeStrategy::Combine);
        let mut values: Vec<String> = merged
            .iter()
            .map(|v| v["_value"].as_str().unwrap().to_string())
            .collect();
        values.sort();
        assert_eq!(values, vec!["a", "b", "c"]);
    }
}
