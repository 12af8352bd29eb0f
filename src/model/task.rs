//! Workflow and Task definitions: the typed DAG that a run executes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_priority() -> u8 {
    1
}

fn default_timeout() -> u32 {
    300
}

fn default_max_retries() -> u8 {
    0
}

fn default_retry_delay() -> u32 {
    5
}

fn default_max_parallel_tasks() -> u8 {
    4
}

fn default_dedupe_key() -> String {
    "name".to_string()
}

fn default_true() -> bool {
    true
}

/// Policy accepted on every task but, per the core loop's contract, never
/// re-invoked automatically (see `engine::driver`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_retry_delay")]
    pub delay_seconds: u32,
    #[serde(default)]
    pub retry_on_timeout: bool,
    #[serde(default = "default_true")]
    pub retry_on_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: default_max_retries(),
            delay_seconds: default_retry_delay(),
            retry_on_timeout: false,
            retry_on_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Combine,
    Replace,
    Append,
}

/// The tagged union over the kinds of work a task can perform. The
/// Scheduler never inspects this tag; only `engine::driver` dispatches on
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Tool {
        tool: String,
        #[serde(default)]
        parameters: HashMap<String, serde_json::Value>,
    },
    Merge {
        merge_sources: Vec<String>,
        #[serde(default)]
        merge_field: Option<String>,
        #[serde(default = "default_dedupe_key")]
        dedupe_key: String,
        merge_strategy: MergeStrategy,
    },
    FileOutput {
        source_task: String,
        source_field: String,
        output_file: String,
        #[serde(default)]
        extract_field: Option<String>,
        #[serde(default)]
        format: FileOutputFormat,
    },
    JsonAggregate {
        output_file: String,
        sections: Vec<AggregateSection>,
        #[serde(default = "default_true")]
        include_metadata: bool,
    },
    WebCrawl {
        #[serde(default)]
        parameters: HashMap<String, serde_json::Value>,
    },
    ExploitLookup {
        #[serde(default)]
        parameters: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileOutputFormat {
    #[default]
    Txt,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSection {
    pub name: String,
    pub source_task: String,
    pub source_field: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub optional: bool,
    #[serde(flatten)]
    pub kind: TaskKind,
}

impl TaskDefinition {
    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Tool { tool, .. } => Some(tool),
            _ => None,
        }
    }

    /// A human label for Step Records: the adapter name for TOOL tasks,
    /// the task-kind name otherwise.
    pub fn tool_or_type(&self) -> String {
        match &self.kind {
            TaskKind::Tool { tool, .. } => tool.clone(),
            TaskKind::Merge { .. } => "merge".to_string(),
            TaskKind::FileOutput { .. } => "file_output".to_string(),
            TaskKind::JsonAggregate { .. } => "json_aggregate".to_string(),
            TaskKind::WebCrawl { .. } => "web_crawl".to_string(),
            TaskKind::ExploitLookup { .. } => "exploit_lookup".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target: String,
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub stop_on_failure: bool,
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_tool_task() {
        let yaml = r#"
workflow_id: recon-basic
name: Basic recon
target: example.com
tasks:
  - task_id: subfinder
    name: Subfinder enumeration
    task_type: TOOL
    tool: subfinder
    parameters:
      domain: example.com
"#;
        let wf: WorkflowDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(wf.tasks.len(), 1);
        assert_eq!(wf.tasks[0].tool_name(), Some("subfinder"));
        assert_eq!(wf.max_parallel_tasks, 4);
    }

    #[test]
    fn deserialize_merge_task() {
        let yaml = r#"
workflow_id: recon-merge
name: Merge step
target: example.com
tasks:
  - task_id: p
    name: p
    task_type: TOOL
    tool: subfinder
    parameters: {}
  - task_id: m
    name: merge
    depends_on: [p]
    task_type: MERGE
    merge_sources: [p]
    merge_strategy: combine
"#;
        let wf: WorkflowDefinition = serde_yaml::from_str(yaml).unwrap();
        match &wf.tasks[1].kind {
            TaskKind::Merge {
                dedupe_key,
                merge_strategy,
                ..
            } => {
                assert_eq!(dedupe_key, "name");
                assert_eq!(*merge_strategy, MergeStrategy::Combine);
            }
            _ => panic!("expected merge task"),
        }
    }

    #[test]
    fn retry_policy_defaults() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.max_retries, 0);
        assert!(retry.retry_on_error);
    }
}
