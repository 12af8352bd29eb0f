//! `nuclei`: template-based vulnerability scanning over a list of URLs,
//! one JSON finding per line (`-json -silent`).

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::adapter::{AdapterMetadata, ToolAdapter};

pub struct NucleiAdapter;

fn urls(params: &HashMap<String, Value>) -> Vec<String> {
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

impl ToolAdapter for NucleiAdapter {
    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: "nuclei".to_string(),
            category: "vuln_scan".to_string(),
            executable: "nuclei".to_string(),
            requires_root: false,
            default_timeout: 1200,
            supports_parallel: true,
        }
    }

    fn validate(&self, params: &HashMap<String, Value>) -> bool {
        !urls(params).is_empty()
    }

    fn build_argv(&self, params: &HashMap<String, Value>) -> Vec<String> {
        vec![
            "nuclei".to_string(),
            "-json".to_string(),
            "-silent".to_string(),
            "-l".to_string(),
            urls(params).join(","),
        ]
    }

    fn parse(&self, stdout: &str, _stderr: &str, _exit_code: i32) -> Value {
        let mut findings = Vec::new();

        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            let template = parsed
                .get("template-id")
                .or_else(|| parsed.get("templateID"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let severity = parsed
                .pointer("/info/severity")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let matched = parsed
                .get("matched-at")
                .or_else(|| parsed.get("host"))
                .and_then(Value::as_str)
                .unwrap_or("");

            findings.push(json!({
                "template_id": template,
                "severity": severity,
                "matched_at": matched,
            }));
        }

        json!({ "findings": findings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_findings() {
        let adapter = NucleiAdapter;
        let stdout =
            "{\"template-id\":\"exposed-panel\",\"info\":{\"severity\":\"medium\"},\"matched-at\":\"https://a.example.com\"}\n";
        let result = adapter.parse(stdout, "", 0);
        let findings = result["findings"].as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["severity"], "medium");
    }

    #[test]
    fn parse_tolerates_empty_input() {
        let adapter = NucleiAdapter;
        let result = adapter.parse("", "", 0);
        assert_eq!(result["findings"].as_array().unwrap().len(), 0);
    }
}
