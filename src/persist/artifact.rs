//! Artifact Persister: the structured per-target directory layout for
//! raw, parsed, list, and final results.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

/// Strips scheme, path, and port from a free-form target string, yielding
/// the canonical directory token for that target.
pub fn target_token(target: &str) -> String {
    let without_scheme = target
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(target);

    let host_and_port = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);

    let host = match host_and_port.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_and_port,
    };

    host.to_string()
}

pub struct ArtifactPersister {
    data_root: PathBuf,
}

impl ArtifactPersister {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        ArtifactPersister {
            data_root: data_root.into(),
        }
    }

    fn scan_dir(&self, target: &str) -> PathBuf {
        self.data_root.join("scans").join(target_token(target))
    }

    pub fn ensure_layout(&self, target: &str) -> std::io::Result<()> {
        let root = self.scan_dir(target);
        for sub in ["raw", "parsed", "lists", "final"] {
            std::fs::create_dir_all(root.join(sub))?;
        }
        Ok(())
    }

    /// Best-effort: a write failure here is logged, never propagated, per
    /// the persister's "tool/merge writes are best-effort" contract.
    pub fn write_raw(&self, target: &str, tool: &str, ext: &str, content: &str) {
        let path = self.scan_dir(target).join("raw").join(tool).join(format!("output.{ext}"));
        self.best_effort_write(&path, content);
    }

    pub fn write_parsed(&self, target: &str, tool: &str, content: &Value) {
        let path = self
            .scan_dir(target)
            .join("parsed")
            .join(tool)
            .join("results.json");
        let text = serde_json::to_string_pretty(content).unwrap_or_default();
        self.best_effort_write(&path, &text);
    }

    fn best_effort_write(&self, path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %err, "failed to create artifact directory");
                return;
            }
        }
        if let Err(err) = std::fs::write(path, content) {
            warn!(path = %path.display(), error = %err, "failed to write artifact");
        }
    }

    /// Writes the merged subdomain list to `final/subdomains.json` and the
    /// three companion sorted-unique lists under `lists/`. Returns the
    /// paths written, keyed by purpose.
    pub fn write_merge_outputs(
        &self,
        target: &str,
        merged: &[Value],
    ) -> std::io::Result<std::collections::HashMap<String, String>> {
        let root = self.scan_dir(target);
        std::fs::create_dir_all(root.join("final"))?;
        std::fs::create_dir_all(root.join("lists"))?;

        let final_path = root.join("final").join("subdomains.json");
        std::fs::write(&final_path, serde_json::to_string_pretty(merged).unwrap_or_default())?;

        let names = sorted_unique_strings(merged, "name");
        let ips = sorted_unique_strings_from_list(merged, "ips");
        let asns = sorted_unique_strings_from_list(merged, "asns");

        let subdomains_path = root.join("lists").join("subdomains.txt");
        let ips_path = root.join("lists").join("ips.txt");
        let asns_path = root.join("lists").join("asns.txt");

        std::fs::write(&subdomains_path, names.join("\n"))?;
        std::fs::write(&ips_path, ips.join("\n"))?;
        std::fs::write(&asns_path, asns.join("\n"))?;

        let mut paths = std::collections::HashMap::new();
        paths.insert("final".to_string(), final_path.display().to_string());
        paths.insert("subdomains_list".to_string(), subdomains_path.display().to_string());
        paths.insert("ips_list".to_string(), ips_path.display().to_string());
        paths.insert("asns_list".to_string(), asns_path.display().to_string());
        Ok(paths)
    }

    /// Re-opens `final/subdomains.json` and adds a `ports` map to every
    /// entry whose `ips` matches one of `hosts`' `ip` fields — the
    /// port-scan enrichment convention described by the directory layout.
    pub fn enrich_subdomains_with_ports(&self, target: &str, hosts: &[Value]) {
        let path = self.scan_dir(target).join("final").join("subdomains.json");
        let Ok(existing) = std::fs::read_to_string(&path) else {
            warn!(path = %path.display(), "no existing subdomains.json to enrich");
            return;
        };
        let Ok(Value::Array(mut records)) = serde_json::from_str::<Value>(&existing) else {
            warn!(path = %path.display(), "subdomains.json is not a JSON array; skipping enrichment");
            return;
        };

        for record in records.iter_mut() {
            let Some(ips) = record.get("ips").and_then(Value::as_array) else {
                continue;
            };
            let record_ips: Vec<String> = ips
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();

            for host in hosts {
                let Some(host_ip) = host.get("ip").and_then(Value::as_str) else {
                    continue;
                };
                if record_ips.iter().any(|ip| ip == host_ip) {
                    if let Some(ports) = host.get("ports") {
                        record["ports"] = ports.clone();
                    }
                }
            }
        }

        self.best_effort_write(
            &path,
            &serde_json::to_string_pretty(&Value::Array(records)).unwrap_or_default(),
        );
    }
}

fn sorted_unique_strings(records: &[Value], field: &str) -> Vec<String> {
    let mut set: BTreeSet<String> = BTreeSet::new();
    for record in records {
        if let Some(s) = record.get(field).and_then(Value::as_str) {
            set.insert(s.to_string());
        }
    }
    set.into_iter().collect()
}

fn sorted_unique_strings_from_list(records: &[Value], field: &str) -> Vec<String> {
    let mut set: BTreeSet<String> = BTreeSet::new();
    for record in records {
        match record.get(field) {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(s) = item.as_str() {
                        set.insert(s.to_string());
                    }
                }
            }
            Some(Value::String(s)) => {
                set.insert(s.clone());
            }
            _ => {}
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_token_strips_scheme_path_port() {
        assert_eq!(target_token("https://example.com:8443/path?x=1"), "example.com");
        assert_eq!(target_token("example.com"), "example.com");
        assert_eq!(target_token("10.0.0.1:22"), "10.0.0.1");
    }

    #[test]
    fn ensure_layout_creates_four_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let persister = ArtifactPersister::new(dir.path());
        persister.ensure_layout("example.com").unwrap();
        for sub in ["raw", "parsed", "lists", "final"] {
            assert!(dir.path().join("scans/example.com").join(sub).is_dir());
        }
    }

    #[test]
    fn write_merge_outputs_produces_sorted_unique_lists() {
        let dir = tempfile::tempdir().unwrap();
        let persister = ArtifactPersister::new(dir.path());
        let merged = vec![
            json!({"name": "b.example.com", "ips": ["2.2.2.2"], "asns": ["AS2"]}),
            json!({"name": "a.example.com", "ips": ["1.1.1.1", "2.2.2.2"], "asns": ["AS1"]}),
        ];
        persister.write_merge_outputs("example.com", &merged).unwrap();
        let names = std::fs::read_to_string(
            dir.path().join("scans/example.com/lists/subdomains.txt"),
        )
        .unwrap();
        assert_eq!(names, "a.example.com\nb.example.com");
        let ips = std::fs::read_to_string(dir.path().join("scans/example.com/lists/ips.txt"))
            .unwrap();
        assert_eq!(ips, "1.1.1.1\n2.2.2.2");
    }

    #[test]
    fn enrich_adds_ports_to_matching_ip() {
        let dir = tempfile::tempdir().unwrap();
        let persister = ArtifactPersister::new(dir.path());
        let merged = vec![json!({"name": "a.example.com", "ips": ["1.1.1.1"], "asns": []})];
        persister.write_merge_outputs("example.com", &merged).unwrap();

        let hosts = vec![json!({"ip": "1.1.1.1", "ports": {"80": "http"}})];
        persister.enrich_subdomains_with_ports("example.com", &hosts);

        let text = std::fs::read_to_string(
            dir.path().join("scans/example.com/final/subdomains.json"),
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["ports"]["80"], "http");
    }
}
