//! Engine configuration: where artifacts live and which Run-State Store
//! backend a Driver is constructed with.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::persist::{InMemoryStateStore, JsonFileStateStore, RunStateStore};

fn default_data_root() -> String {
    "./data".to_string()
}

fn default_max_parallel_tasks() -> u8 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunStateBackend {
    Memory,
    JsonFile { path: String },
}

impl Default for RunStateBackend {
    fn default() -> Self {
        RunStateBackend::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_data_root")]
    pub data_root: String,
    #[serde(default = "default_max_parallel_tasks")]
    pub default_max_parallel_tasks: u8,
    #[serde(default)]
    pub state_backend: RunStateBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_root: default_data_root(),
            default_max_parallel_tasks: default_max_parallel_tasks(),
            state_backend: RunStateBackend::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn data_root_path(&self) -> PathBuf {
        PathBuf::from(&self.data_root)
    }

    pub fn build_state_store(&self) -> Arc<dyn RunStateStore> {
        match &self.state_backend {
            RunStateBackend::Memory => Arc::new(InMemoryStateStore::new()),
            RunStateBackend::JsonFile { path } => Arc::new(JsonFileStateStore::new(path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_memory_backend() {
        let config = EngineConfig::default();
        assert!(matches!(config.state_backend, RunStateBackend::Memory));
        assert_eq!(config.default_max_parallel_tasks, 4);
    }

    #[test]
    fn parses_json_file_backend_from_yaml() {
        let yaml = "data_root: /var/lib/reconflow\nstate_backend:\n  type: json_file\n  path: /var/lib/reconflow/runs\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        match config.state_backend {
            RunStateBackend::JsonFile { path } => assert_eq!(path, "/var/lib/reconflow/runs"),
            _ => panic!("expected json_file backend"),
        }
    }
}
