//! In-memory and persisted result types: Task Result, Run Record, Step
//! Record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// The in-memory record the Driver owns exclusively; Scheduler and
/// Resolver only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub output: HashMap<String, Value>,
    #[serde(default)]
    pub raw_output: String,
    #[serde(default)]
    pub errors: Vec<String>,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u8,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub tool_missing: bool,
}

impl TaskResult {
    pub fn output_as_value(&self) -> Value {
        Value::Object(self.output.clone().into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub user_id: String,
    pub workflow_name: String,
    pub target: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub run_id: String,
    pub task_name: String,
    pub tool_or_type: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub errors: String,
}
