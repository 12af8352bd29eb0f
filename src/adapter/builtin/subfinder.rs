//! `subfinder`: passive subdomain enumeration, one JSON object per line on
//! stdout (`-json -silent`).

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::adapter::{AdapterMetadata, ToolAdapter};

pub struct SubfinderAdapter;

impl ToolAdapter for SubfinderAdapter {
    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: "subfinder".to_string(),
            category: "subdomain_enum".to_string(),
            executable: "subfinder".to_string(),
            requires_root: false,
            default_timeout: 300,
            supports_parallel: true,
        }
    }

    fn validate(&self, params: &HashMap<String, Value>) -> bool {
        params
            .get("domain")
            .and_then(Value::as_str)
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false)
    }

    fn build_argv(&self, params: &HashMap<String, Value>) -> Vec<String> {
        let domain = params
            .get("domain")
            .and_then(Value::as_str)
            .unwrap_or_default();
        vec![
            "subfinder".to_string(),
            "-d".to_string(),
            domain.to_string(),
            "-json".to_string(),
            "-silent".to_string(),
        ]
    }

    fn parse(&self, stdout: &str, _stderr: &str, _exit_code: i32) -> Value {
        let mut subdomains = Vec::new();
        let mut seen = HashSet::new();

        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if let Some(host) = parsed.get("host").and_then(Value::as_str) {
                if seen.insert(host.to_string()) {
                    subdomains.push(json!({"name": host, "source": "subfinder"}));
                }
            }
        }

        let mut unique: Vec<&str> = seen.iter().map(|s| s.as_str()).collect();
        unique.sort_unstable();

        json!({
            "subdomains": subdomains,
            "unique_subdomains": unique,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(domain: &str) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("domain".to_string(), json!(domain));
        m
    }

    #[test]
    fn validate_requires_domain() {
        let adapter = SubfinderAdapter;
        assert!(adapter.validate(&params("example.com")));
        assert!(!adapter.validate(&HashMap::new()));
    }

    #[test]
    fn build_argv_includes_json_silent() {
        let adapter = SubfinderAdapter;
        let argv = adapter.build_argv(&params("example.com"));
        assert_eq!(
            argv,
            vec!["subfinder", "-d", "example.com", "-json", "-silent"]
        );
    }

    #[test]
    fn parse_dedupes_hosts() {
        let adapter = SubfinderAdapter;
        let stdout = "{\"host\":\"a.example.com\"}\n{\"host\":\"b.example.com\"}\n{\"host\":\"a.example.com\"}\n";
        let result = adapter.parse(stdout, "", 0);
        let unique = result["unique_subdomains"].as_array().unwrap();
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn parse_tolerates_malformed_lines() {
        let adapter = SubfinderAdapter;
        let result = adapter.parse("not json\n\n", "", 0);
        assert_eq!(result["unique_subdomains"].as_array().unwrap().len(), 0);
    }
}
