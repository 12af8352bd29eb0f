//! Progress events emitted by the Driver over the lifetime of a run,
//! grounded in the CLI's `RunEvent`/`EventType` pair.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    Progress,
    RunCompleted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f32>,
    #[serde(default)]
    pub is_final: bool,
}

impl ProgressEvent {
    pub fn task_started(run_id: &str, task_id: &str, task_name: &str) -> Self {
        ProgressEvent {
            kind: EventKind::TaskStarted,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            task_id: Some(task_id.to_string()),
            task_name: Some(task_name.to_string()),
            error: None,
            progress_percent: None,
            is_final: false,
        }
    }

    pub fn task_completed(run_id: &str, task_id: &str, task_name: &str) -> Self {
        ProgressEvent {
            kind: EventKind::TaskCompleted,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            task_id: Some(task_id.to_string()),
            task_name: Some(task_name.to_string()),
            error: None,
            progress_percent: None,
            is_final: false,
        }
    }

    pub fn task_failed(run_id: &str, task_id: &str, task_name: &str, error: &str) -> Self {
        ProgressEvent {
            kind: EventKind::TaskFailed,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            task_id: Some(task_id.to_string()),
            task_name: Some(task_name.to_string()),
            error: Some(error.to_string()),
            progress_percent: None,
            is_final: false,
        }
    }

    pub fn progress(run_id: &str, percent: f32) -> Self {
        ProgressEvent {
            kind: EventKind::Progress,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            task_id: None,
            task_name: None,
            error: None,
            progress_percent: Some(percent),
            is_final: false,
        }
    }

    pub fn run_completed(run_id: &str) -> Self {
        ProgressEvent {
            kind: EventKind::RunCompleted,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            task_id: None,
            task_name: None,
            error: None,
            progress_percent: None,
            is_final: true,
        }
    }
}
