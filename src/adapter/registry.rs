//! Registry mapping adapter names (as used in `TaskKind::Tool.tool`) to
//! `ToolAdapter` instances.

use std::collections::HashMap;
use std::sync::Arc;

use super::builtin::{HttpxAdapter, NmapAdapter, NucleiAdapter, SubfinderAdapter};
use super::ToolAdapter;

pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ToolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        AdapterRegistry {
            adapters: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in adapters this crate
    /// ships.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("subfinder", Arc::new(SubfinderAdapter));
        registry.register("nmap", Arc::new(NmapAdapter));
        registry.register("httpx", Arc::new(HttpxAdapter));
        registry.register("nuclei", Arc::new(NucleiAdapter));
        registry
    }

    pub fn register(&mut self, name: &str, adapter: Arc<dyn ToolAdapter>) {
        self.adapters.insert(name.to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lists_four_adapters() {
        let registry = AdapterRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["httpx", "nmap", "nuclei", "subfinder"]
        );
    }

    #[test]
    fn unknown_name_returns_none() {
        let registry = AdapterRegistry::with_builtins();
        assert!(registry.get("ghost-tool").is_none());
    }
}
