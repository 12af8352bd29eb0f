//! `httpx`: HTTP probing over a list of hosts, one JSON object per line
//! (`-json -silent`).

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::adapter::{AdapterMetadata, ToolAdapter};

pub struct HttpxAdapter;

fn hosts(params: &HashMap<String, Value>) -> Vec<String> {
    match params.get("urls") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => vec![],
    }
}

impl ToolAdapter for HttpxAdapter {
    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: "httpx".to_string(),
            category: "http_probe".to_string(),
            executable: "httpx".to_string(),
            requires_root: false,
            default_timeout: 300,
            supports_parallel: true,
        }
    }

    fn validate(&self, params: &HashMap<String, Value>) -> bool {
        !hosts(params).is_empty()
    }

    fn build_argv(&self, params: &HashMap<String, Value>) -> Vec<String> {
        vec![
            "httpx".to_string(),
            "-json".to_string(),
            "-silent".to_string(),
            "-l".to_string(),
            hosts(params).join(","),
        ]
    }

    fn parse(&self, stdout: &str, _stderr: &str, _exit_code: i32) -> Value {
        let mut probes = Vec::new();

        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            let url = parsed.get("url").and_then(Value::as_str).unwrap_or("");
            let status = parsed
                .get("status_code")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if url.is_empty() {
                continue;
            }
            probes.push(json!({"url": url, "status_code": status}));
        }

        json!({ "probes": probes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(urls: &[&str]) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("urls".to_string(), json!(urls));
        m
    }

    #[test]
    fn validate_requires_urls() {
        let adapter = HttpxAdapter;
        assert!(adapter.validate(&params(&["https://a.example.com"])));
        assert!(!adapter.validate(&HashMap::new()));
    }

    #[test]
    fn parse_extracts_live_hosts() {
        let adapter = HttpxAdapter;
        let stdout = "{\"url\":\"https://a.example.com\",\"status_code\":200}\n";
        let result = adapter.parse(stdout, "", 0);
        let probes = result["probes"].as_array().unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0]["status_code"], 200);
    }
}
