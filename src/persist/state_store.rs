//! Run-State Store: durable records of runs and per-task status.
//!
//! Injected into the Driver as an explicit collaborator (constructor
//! injection), never reached for via a global, so tests can substitute a
//! fake.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::result::{RunRecord, RunStatus, StepRecord, TaskStatus};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("run '{0}' not found")]
    RunNotFound(String),
    #[error("step '{0}' not found")]
    StepNotFound(String),
    #[error("backing store I/O error: {0}")]
    Io(String),
}

#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn create_run(
        &self,
        user_id: &str,
        workflow_name: &str,
        target: &str,
    ) -> Result<String, StateStoreError>;

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
        results: Option<Value>,
    ) -> Result<(), StateStoreError>;

    async fn create_step(
        &self,
        run_id: &str,
        task_name: &str,
        tool_or_type: &str,
        started_at: DateTime<Utc>,
    ) -> Result<String, StateStoreError>;

    async fn update_step(
        &self,
        step_id: &str,
        status: TaskStatus,
        completed_at: DateTime<Utc>,
        output: Value,
        errors: String,
    ) -> Result<(), StateStoreError>;

    async fn get_run(&self, run_id: &str) -> Result<RunRecord, StateStoreError>;
}

/// Default backend: everything lives in a process-local map guarded by a
/// mutex, one lock acquisition per call satisfies the "atomic per call"
/// requirement.
#[derive(Default)]
pub struct InMemoryStateStore {
    runs: Mutex<HashMap<String, RunRecord>>,
    steps: Mutex<HashMap<String, StepRecord>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStateStore for InMemoryStateStore {
    async fn create_run(
        &self,
        user_id: &str,
        workflow_name: &str,
        target: &str,
    ) -> Result<String, StateStoreError> {
        let run_id = Uuid::new_v4().to_string();
        let record = RunRecord {
            run_id: run_id.clone(),
            user_id: user_id.to_string(),
            workflow_name: workflow_name.to_string(),
            target: target.to_string(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            results: Value::Null,
        };
        self.runs.lock().unwrap().insert(run_id.clone(), record);
        Ok(run_id)
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
        results: Option<Value>,
    ) -> Result<(), StateStoreError> {
        let mut runs = self.runs.lock().unwrap();
        let record = runs
            .get_mut(run_id)
            .ok_or_else(|| StateStoreError::RunNotFound(run_id.to_string()))?;
        record.status = status;
        if record.started_at.is_none() && matches!(status, RunStatus::Running) {
            record.started_at = Some(Utc::now());
        }
        if let Some(completed_at) = completed_at {
            record.completed_at = Some(completed_at);
        }
        if let Some(results) = results {
            record.results = results;
        }
        Ok(())
    }

    async fn create_step(
        &self,
        run_id: &str,
        task_name: &str,
        tool_or_type: &str,
        started_at: DateTime<Utc>,
    ) -> Result<String, StateStoreError> {
        let step_id = Uuid::new_v4().to_string();
        let record = StepRecord {
            step_id: step_id.clone(),
            run_id: run_id.to_string(),
            task_name: task_name.to_string(),
            tool_or_type: tool_or_type.to_string(),
            status: TaskStatus::Running,
            started_at,
            completed_at: None,
            output: Value::Null,
            errors: String::new(),
        };
        self.steps.lock().unwrap().insert(step_id.clone(), record);
        Ok(step_id)
    }

    async fn update_step(
        &self,
        step_id: &str,
        status: TaskStatus,
        completed_at: DateTime<Utc>,
        output: Value,
        errors: String,
    ) -> Result<(), StateStoreError> {
        let mut steps = self.steps.lock().unwrap();
        let record = steps
            .get_mut(step_id)
            .ok_or_else(|| StateStoreError::StepNotFound(step_id.to_string()))?;
        record.status = status;
        record.completed_at = Some(completed_at);
        record.output = output;
        record.errors = errors;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<RunRecord, StateStoreError> {
        self.runs
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .ok_or_else(|| StateStoreError::RunNotFound(run_id.to_string()))
    }
}

/// One JSON document per run under `<data_root>/runs/<run_id>.json` and
/// one per step under `<data_root>/steps/<step_id>.json`, each written
/// atomically via a temp-file-plus-rename so a crash mid-write never
/// leaves a half-written record.
pub struct JsonFileStateStore {
    data_root: PathBuf,
    memory: InMemoryStateStore,
}

impl JsonFileStateStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        JsonFileStateStore {
            data_root: data_root.into(),
            memory: InMemoryStateStore::new(),
        }
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.data_root.join("runs").join(format!("{run_id}.json"))
    }

    fn step_path(&self, step_id: &str) -> PathBuf {
        self.data_root.join("steps").join(format!("{step_id}.json"))
    }

    fn flush_run(&self, run_id: &str) -> Result<(), StateStoreError> {
        let record = self
            .memory
            .runs
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .ok_or_else(|| StateStoreError::RunNotFound(run_id.to_string()))?;

        let path = self.run_path(run_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateStoreError::Io(e.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&record).map_err(|e| StateStoreError::Io(e.to_string()))?;
        std::fs::write(&tmp_path, text).map_err(|e| StateStoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| StateStoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn flush_step(&self, step_id: &str) -> Result<(), StateStoreError> {
        let record = self
            .memory
            .steps
            .lock()
            .unwrap()
            .get(step_id)
            .cloned()
            .ok_or_else(|| StateStoreError::StepNotFound(step_id.to_string()))?;

        let path = self.step_path(step_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateStoreError::Io(e.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&record).map_err(|e| StateStoreError::Io(e.to_string()))?;
        std::fs::write(&tmp_path, text).map_err(|e| StateStoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| StateStoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl RunStateStore for JsonFileStateStore {
    async fn create_run(
        &self,
        user_id: &str,
        workflow_name: &str,
        target: &str,
    ) -> Result<String, StateStoreError> {
        let run_id = self.memory.create_run(user_id, workflow_name, target).await?;
        self.flush_run(&run_id)?;
        Ok(run_id)
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
        results: Option<Value>,
    ) -> Result<(), StateStoreError> {
        self.memory
            .update_run(run_id, status, completed_at, results)
            .await?;
        self.flush_run(run_id)
    }

    async fn create_step(
        &self,
        run_id: &str,
        task_name: &str,
        tool_or_type: &str,
        started_at: DateTime<Utc>,
    ) -> Result<String, StateStoreError> {
        let step_id = self
            .memory
            .create_step(run_id, task_name, tool_or_type, started_at)
            .await?;
        self.flush_step(&step_id)?;
        Ok(step_id)
    }

    async fn update_step(
        &self,
        step_id: &str,
        status: TaskStatus,
        completed_at: DateTime<Utc>,
        output: Value,
        errors: String,
    ) -> Result<(), StateStoreError> {
        self.memory
            .update_step(step_id, status, completed_at, output, errors)
            .await?;
        self.flush_step(step_id)
    }

    async fn get_run(&self, run_id: &str) -> Result<RunRecord, StateStoreError> {
        self.memory.get_run(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_update_run_round_trips() {
        let store = InMemoryStateStore::new();
        let run_id = store.create_run("alice", "basic-recon", "example.com").await.unwrap();
        store
            .update_run(&run_id, RunStatus::Running, None, None)
            .await
            .unwrap();
        let record = store.get_run(&run_id).await.unwrap();
        assert_eq!(record.status, RunStatus::Running);
        assert!(record.started_at.is_some());
    }

    #[tokio::test]
    async fn json_file_store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        let run_id = store.create_run("alice", "basic-recon", "example.com").await.unwrap();
        let path = dir.path().join("runs").join(format!("{run_id}.json"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn json_file_store_persists_steps_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        let run_id = store.create_run("alice", "basic-recon", "example.com").await.unwrap();
        let step_id = store
            .create_step(&run_id, "scan-subdomains", "subfinder", Utc::now())
            .await
            .unwrap();
        let path = dir.path().join("steps").join(format!("{step_id}.json"));
        assert!(path.exists());

        store
            .update_step(&step_id, TaskStatus::Completed, Utc::now(), Value::Null, String::new())
            .await
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Completed"));
    }

    #[tokio::test]
    async fn update_unknown_run_is_an_error() {
        let store = InMemoryStateStore::new();
        let err = store
            .update_run("ghost", RunStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::RunNotFound(_)));
    }
}
