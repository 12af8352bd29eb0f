//! Loads `WorkflowDefinition`s from YAML files or directories of them.

use std::path::Path;

use super::task::WorkflowDefinition;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn load_file(path: &Path) -> Result<WorkflowDefinition, LoadError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|error| LoadError::Yaml {
            file: path.display().to_string(),
            error,
        })
    }

    /// Loads every `.yaml`/`.yml` file directly under `dir` (non-recursive),
    /// in directory-listing order.
    pub fn load_directory(dir: &Path) -> Result<Vec<WorkflowDefinition>, LoadError> {
        let mut definitions = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }
            definitions.push(Self::load_file(&path)?);
        }

        Ok(definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_workflow(dir: &Path, filename: &str) {
        let mut file = std::fs::File::create(dir.join(filename)).unwrap();
        writeln!(
            file,
            "workflow_id: wf\nname: wf\ntarget: example.com\ntasks:\n  - task_id: a\n    name: a\n    task_type: TOOL\n    tool: subfinder\n    parameters: {{}}\n"
        )
        .unwrap();
    }

    #[test]
    fn loads_single_file() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(dir.path(), "basic.yaml");
        let def = WorkflowLoader::load_file(&dir.path().join("basic.yaml")).unwrap();
        assert_eq!(def.workflow_id, "wf");
    }

    #[test]
    fn loads_directory_skipping_non_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(dir.path(), "a.yaml");
        write_workflow(dir.path(), "b.yml");
        std::fs::write(dir.path().join("readme.txt"), "not a workflow").unwrap();

        let defs = WorkflowLoader::load_directory(dir.path()).unwrap();
        assert_eq!(defs.len(), 2);
    }
}
