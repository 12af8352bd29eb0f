//! `nmap`: port scanning over a list of IPs, using greppable output
//! (`-oG -`) so parsing stays a line-oriented regex scan rather than a
//! full XML tree.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::adapter::{AdapterMetadata, ToolAdapter};

pub struct NmapAdapter;

fn targets(params: &HashMap<String, Value>) -> Vec<String> {
    match params.get("ips") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => vec![],
    }
}

impl ToolAdapter for NmapAdapter {
    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: "nmap".to_string(),
            category: "port_scan".to_string(),
            executable: "nmap".to_string(),
            requires_root: false,
            default_timeout: 600,
            supports_parallel: false,
        }
    }

    fn validate(&self, params: &HashMap<String, Value>) -> bool {
        !targets(params).is_empty()
    }

    fn build_argv(&self, params: &HashMap<String, Value>) -> Vec<String> {
        let ports = params
            .get("ports")
            .and_then(Value::as_str)
            .unwrap_or("1-1000");
        let mut argv = vec![
            "nmap".to_string(),
            "-p".to_string(),
            ports.to_string(),
            "-oG".to_string(),
            "-".to_string(),
        ];
        argv.extend(targets(params));
        argv
    }

    fn parse(&self, stdout: &str, _stderr: &str, _exit_code: i32) -> Value {
        let mut hosts = Vec::new();

        for line in stdout.lines() {
            if !line.starts_with("Host:") {
                continue;
            }
            let Some(ip) = line.split_whitespace().nth(1) else {
                continue;
            };
            let Some(ports_section) = line.split("Ports: ").nth(1) else {
                continue;
            };

            let mut ports = serde_json::Map::new();
            for entry in ports_section.split(',') {
                let fields: Vec<&str> = entry.trim().split('/').collect();
                if fields.len() < 5 {
                    continue;
                }
                let (port, state, service) = (fields[0], fields[1], fields[4]);
                if state != "open" {
                    continue;
                }
                ports.insert(port.to_string(), json!(service));
            }

            hosts.push(json!({"ip": ip, "ports": ports}));
        }

        json!({ "hosts": hosts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(ips: &[&str]) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("ips".to_string(), json!(ips));
        m
    }

    #[test]
    fn validate_requires_targets() {
        let adapter = NmapAdapter;
        assert!(adapter.validate(&params(&["1.2.3.4"])));
        assert!(!adapter.validate(&HashMap::new()));
    }

    #[test]
    fn build_argv_includes_targets() {
        let adapter = NmapAdapter;
        let argv = adapter.build_argv(&params(&["1.2.3.4", "5.6.7.8"]));
        assert!(argv.contains(&"1.2.3.4".to_string()));
        assert!(argv.contains(&"5.6.7.8".to_string()));
    }

    #[test]
    fn parse_extracts_open_ports() {
        let adapter = NmapAdapter;
        let stdout = "Host: 1.2.3.4 ()\tPorts: 80/open/tcp//http///, 443/closed/tcp//https///\n";
        let result = adapter.parse(stdout, "", 0);
        let hosts = result["hosts"].as_array().unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0]["ip"], "1.2.3.4");
        assert_eq!(hosts[0]["ports"]["80"], "http");
        assert!(hosts[0]["ports"].get("443").is_none());
    }

    #[test]
    fn parse_tolerates_empty_output() {
        let adapter = NmapAdapter;
        let result = adapter.parse("", "", 0);
        assert_eq!(result["hosts"].as_array().unwrap().len(), 0);
    }
}
