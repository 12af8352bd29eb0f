//! Workflow validation: uniqueness, reference, and cycle checks that turn a
//! raw `WorkflowDefinition` into a `Workflow` safe to schedule.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use super::task::{TaskDefinition, TaskKind, WorkflowDefinition};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task '{task_id}' depends on unknown task '{missing}'")]
    UnknownDependency { task_id: String, missing: String },

    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("task '{task_id}' is missing required field '{field}'")]
    MissingField { task_id: String, field: String },

    #[error("task '{task_id}' field '{field}' has invalid value '{value}'")]
    InvalidEnum {
        task_id: String,
        field: String,
        value: String,
    },

    #[error("identifier '{0}' contains characters outside [A-Za-z0-9_.-]")]
    BadIdentifier(String),

    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),

    #[error("workflow has no tasks")]
    EmptyWorkflow,
}

/// A `WorkflowDefinition` that has passed every invariant in this module.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub workflow_id: String,
    pub name: String,
    pub description: String,
    pub target: String,
    pub tasks: HashMap<String, TaskDefinition>,
    pub declaration_order: Vec<String>,
    pub stop_on_failure: bool,
    pub max_parallel_tasks: u8,
}

impl Workflow {
    pub fn task(&self, task_id: &str) -> Option<&TaskDefinition> {
        self.tasks.get(task_id)
    }
}

fn check_identifier(value: &str) -> Result<(), ValidationError> {
    if IDENTIFIER_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::BadIdentifier(value.to_string()))
    }
}

fn check_task_fields(task: &TaskDefinition) -> Result<(), ValidationError> {
    match &task.kind {
        TaskKind::Tool { tool, .. } => {
            if tool.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    task_id: task.task_id.clone(),
                    field: "tool".to_string(),
                });
            }
        }
        TaskKind::Merge { merge_sources, .. } => {
            if merge_sources.is_empty() {
                return Err(ValidationError::MissingField {
                    task_id: task.task_id.clone(),
                    field: "merge_sources".to_string(),
                });
            }
        }
        TaskKind::FileOutput {
            source_task,
            source_field,
            output_file,
            ..
        } => {
            for (field, value) in [
                ("source_task", source_task.as_str()),
                ("source_field", source_field.as_str()),
                ("output_file", output_file.as_str()),
            ] {
                if value.trim().is_empty() {
                    return Err(ValidationError::MissingField {
                        task_id: task.task_id.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }
        TaskKind::JsonAggregate {
            output_file,
            sections,
            ..
        } => {
            if output_file.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    task_id: task.task_id.clone(),
                    field: "output_file".to_string(),
                });
            }
            if sections.is_empty() {
                return Err(ValidationError::MissingField {
                    task_id: task.task_id.clone(),
                    field: "sections".to_string(),
                });
            }
        }
        TaskKind::WebCrawl { .. } | TaskKind::ExploitLookup { .. } => {}
    }

    if !(1..=10).contains(&task.priority) {
        return Err(ValidationError::InvalidEnum {
            task_id: task.task_id.clone(),
            field: "priority".to_string(),
            value: task.priority.to_string(),
        });
    }
    if !(10..=7200).contains(&task.timeout) {
        return Err(ValidationError::InvalidEnum {
            task_id: task.task_id.clone(),
            field: "timeout".to_string(),
            value: task.timeout.to_string(),
        });
    }
    Ok(())
}

/// Three-color DFS cycle detection, adapted from the execution engine's
/// job-dependency topological sort: unvisited nodes are white, nodes on the
/// current DFS path are gray, finished nodes are black. A back-edge to a
/// gray node is the cycle.
fn detect_cycle(
    tasks: &HashMap<String, TaskDefinition>,
) -> Result<(), ValidationError> {
    #[derive(PartialEq, Eq, Clone, Copy)]
    enum Mark {
        OnStack,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut path: Vec<String> = Vec::new();

    fn visit<'a>(
        name: &'a str,
        tasks: &'a HashMap<String, TaskDefinition>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<String>,
    ) -> Result<(), ValidationError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::OnStack) => {
                let start = path.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(name.to_string());
                return Err(ValidationError::CircularDependency(cycle));
            }
            None => {}
        }

        marks.insert(name, Mark::OnStack);
        path.push(name.to_string());

        if let Some(task) = tasks.get(name) {
            for dep in &task.depends_on {
                visit(dep, tasks, marks, path)?;
            }
        }

        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    for name in tasks.keys() {
        visit(name, tasks, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Validates a raw definition and produces an immutable `Workflow`.
pub fn load_workflow(def: WorkflowDefinition) -> Result<Workflow, ValidationError> {
    if def.tasks.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    check_identifier(&def.workflow_id)?;

    let mut tasks: HashMap<String, TaskDefinition> = HashMap::new();
    let mut declaration_order = Vec::with_capacity(def.tasks.len());

    for task in def.tasks {
        check_identifier(&task.task_id)?;
        if tasks.contains_key(&task.task_id) {
            return Err(ValidationError::DuplicateTaskId(task.task_id));
        }
        declaration_order.push(task.task_id.clone());
        tasks.insert(task.task_id.clone(), task);
    }

    for task in tasks.values() {
        for dep in &task.depends_on {
            if !tasks.contains_key(dep) {
                return Err(ValidationError::UnknownDependency {
                    task_id: task.task_id.clone(),
                    missing: dep.clone(),
                });
            }
        }
        check_task_fields(task)?;
    }

    detect_cycle(&tasks)?;

    Ok(Workflow {
        workflow_id: def.workflow_id,
        name: def.name,
        description: def.description,
        target: def.target,
        tasks,
        declaration_order,
        stop_on_failure: def.stop_on_failure,
        max_parallel_tasks: def.max_parallel_tasks.clamp(1, 20),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::MergeStrategy;
    use std::collections::HashMap as Map;

    fn tool_task(id: &str, deps: &[&str]) -> TaskDefinition {
        TaskDefinition {
            task_id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            priority: 1,
            timeout: 300,
            retry: Default::default(),
            optional: false,
            kind: TaskKind::Tool {
                tool: "echo".to_string(),
                parameters: Map::new(),
            },
        }
    }

    fn workflow(tasks: Vec<TaskDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: "wf".to_string(),
            name: "wf".to_string(),
            description: String::new(),
            target: "example.com".to_string(),
            tasks,
            stop_on_failure: false,
            max_parallel_tasks: 4,
        }
    }

    #[test]
    fn accepts_linear_chain() {
        let wf = workflow(vec![tool_task("a", &[]), tool_task("b", &["a"])]);
        let built = load_workflow(wf).unwrap();
        assert_eq!(built.tasks.len(), 2);
    }

    #[test]
    fn rejects_unknown_dependency() {
        let wf = workflow(vec![tool_task("a", &["ghost"])]);
        let err = load_workflow(wf).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_duplicate_task_id() {
        let wf = workflow(vec![tool_task("a", &[]), tool_task("a", &[])]);
        let err = load_workflow(wf).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateTaskId(_)));
    }

    #[test]
    fn rejects_cycle() {
        let wf = workflow(vec![tool_task("a", &["b"]), tool_task("b", &["a"])]);
        let err = load_workflow(wf).unwrap_err();
        match err {
            ValidationError::CircularDependency(cycle) => {
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_tool_name() {
        let mut task = tool_task("a", &[]);
        task.kind = TaskKind::Tool {
            tool: String::new(),
            parameters: Map::new(),
        };
        let wf = workflow(vec![task]);
        let err = load_workflow(wf).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { .. }));
    }

    #[test]
    fn rejects_empty_merge_sources() {
        let merge = TaskDefinition {
            task_id: "m".to_string(),
            name: "m".to_string(),
            description: String::new(),
            depends_on: vec![],
            priority: 1,
            timeout: 300,
            retry: Default::default(),
            optional: false,
            kind: TaskKind::Merge {
                merge_sources: vec![],
                merge_field: None,
                dedupe_key: "name".to_string(),
                merge_strategy: MergeStrategy::Combine,
            },
        };
        let wf = workflow(vec![merge]);
        let err = load_workflow(wf).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { .. }));
    }

    #[test]
    fn rejects_bad_identifier() {
        let wf = workflow(vec![tool_task("bad id!", &[])]);
        let err = load_workflow(wf).unwrap_err();
        assert!(matches!(err, ValidationError::BadIdentifier(_)));
    }
}
