//! Execution Driver: the top-level state machine.
//!
//! Opens a run, repeatedly polls the Scheduler for the next task, hands
//! `TOOL` tasks to the Tool Adapter contract and `MERGE`/`FILE_OUTPUT`/
//! `JSON_AGGREGATE` tasks to their built-in processors, persists every
//! outcome via the Run-State Store and Artifact Persister, and emits one
//! progress event per task transition. Single-worker-per-run: one task
//! runs to completion before the next scheduler poll.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::adapter::registry::AdapterRegistry;
use crate::adapter::{self};
use crate::engine::error::DriverError;
use crate::engine::events::ProgressEvent;
use crate::engine::result::{RunStatus, TaskResult, TaskStatus};
use crate::engine::scheduler::{PollOutcome, Scheduler};
use crate::merge;
use crate::model::resolver::resolve_parameters;
use crate::model::task::{TaskDefinition, TaskKind, WorkflowDefinition};
use crate::model::validate::{load_workflow, Workflow};
use crate::persist::{ArtifactPersister, RunStateStore};
use crate::processors::{file_output, json_aggregate};

/// Outcome of one complete run, returned once the Driver's loop exits.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub results: HashMap<String, TaskResult>,
}

/// Constructor-injected collaborators: state store, artifact persister,
/// and adapter registry are all passed in explicitly rather than looked
/// up from a global, so tests can substitute fakes.
pub struct Driver {
    state_store: Arc<dyn RunStateStore>,
    persister: ArtifactPersister,
    adapters: AdapterRegistry,
}

impl Driver {
    pub fn new(
        state_store: Arc<dyn RunStateStore>,
        persister: ArtifactPersister,
        adapters: AdapterRegistry,
    ) -> Self {
        Driver {
            state_store,
            persister,
            adapters,
        }
    }

    /// Validates and submits a workflow, then drives it to completion.
    /// `events` receives one `ProgressEvent` per task lifecycle
    /// transition plus an overall `Progress` event after each task and a
    /// final `RunCompleted` event. `stop` is checked at every scheduler
    /// poll and before every task dispatch; setting it cancels the run.
    #[instrument(skip(self, def, events, stop), fields(workflow_id = %def.workflow_id))]
    pub async fn run(
        &self,
        def: WorkflowDefinition,
        user_id: &str,
        events: mpsc::Sender<ProgressEvent>,
        stop: Arc<AtomicBool>,
    ) -> Result<RunOutcome, DriverError> {
        // Validation errors abort before the run is created.
        let workflow = load_workflow(def)?;

        let run_id = self
            .state_store
            .create_run(user_id, &workflow.name, &workflow.target)
            .await?;

        if let Err(err) = self.persister.ensure_layout(&workflow.target) {
            warn!(error = %err, "failed to create artifact directory layout");
        }

        self.state_store
            .update_run(&run_id, RunStatus::Running, None, None)
            .await?;

        let outcome = self
            .drive(&workflow, &run_id, &events, stop)
            .await;

        let (status, results) = match &outcome {
            Ok((status, results)) => (*status, results.clone()),
            Err(err) => {
                warn!(error = %err, "driver loop raised an internal error; ending run Failed");
                (RunStatus::Failed, HashMap::new())
            }
        };

        let results_blob = Value::Object(
            results
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
                .collect::<Map<String, Value>>(),
        );
        self.state_store
            .update_run(&run_id, status, Some(Utc::now()), Some(results_blob))
            .await?;

        let _ = events.send(ProgressEvent::run_completed(&run_id)).await;

        outcome.map(|_| RunOutcome {
            run_id,
            status,
            results,
        })
    }

    /// The core scheduling loop. Returns the final `RunStatus` and the
    /// in-memory Task Result map (owned exclusively by this loop; the
    /// Scheduler and Resolver only read from the snapshots passed to
    /// them).
    async fn drive(
        &self,
        workflow: &Workflow,
        run_id: &str,
        events: &mpsc::Sender<ProgressEvent>,
        stop: Arc<AtomicBool>,
    ) -> Result<(RunStatus, HashMap<String, TaskResult>), DriverError> {
        let scheduler = Scheduler::new(workflow);
        let mut results: HashMap<String, TaskResult> = HashMap::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut cancelled: HashSet<String> = HashSet::new();
        let mut any_nonoptional_failed = false;
        let total = workflow.tasks.len();

        'outer: loop {
            if stop.load(Ordering::SeqCst) {
                self.cancel_remaining(workflow, &completed, &failed, &mut cancelled, run_id, events)
                    .await;
                return Ok((RunStatus::Cancelled, results));
            }

            // Propagate dependency-failure poisoning until it stops
            // producing newly-poisoned tasks (a chain a -> b -> c needs
            // one round per link).
            loop {
                let poisoned: Vec<String> = scheduler
                    .newly_poisoned(&completed, &failed)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if poisoned.is_empty() {
                    break;
                }
                for task_id in poisoned {
                    let task = workflow.task(&task_id).expect("validated workflow");
                    self.record_poisoned(run_id, task, "Dependency failed", events, &mut results)
                        .await;
                    failed.insert(task_id);
                    any_nonoptional_failed = true;
                }
                self.emit_progress(run_id, &completed, &failed, total, events).await;

                if workflow.stop_on_failure && any_nonoptional_failed {
                    self.stop_remaining(workflow, &completed, &failed, run_id, events, &mut results)
                        .await;
                    break 'outer;
                }
            }

            match scheduler.poll(&completed, &failed) {
                PollOutcome::Done => break,
                PollOutcome::AllRemainingBlocked(remaining) => {
                    for task_id in remaining {
                        if completed.contains(task_id) || failed.contains(task_id) {
                            continue;
                        }
                        let task = workflow.task(task_id).expect("validated workflow");
                        self.record_poisoned(run_id, task, "Dependency failed", events, &mut results)
                            .await;
                        failed.insert(task_id.clone());
                        any_nonoptional_failed = any_nonoptional_failed || !task.optional;
                    }
                    self.emit_progress(run_id, &completed, &failed, total, events).await;
                    break;
                }
                PollOutcome::Ready(task_id) => {
                    let task = workflow.task(task_id).expect("validated workflow").clone();
                    let result = self
                        .execute_task(workflow, run_id, &task, &results, events)
                        .await;

                    let task_completed_ok = result.status == TaskStatus::Completed;
                    results.insert(task.task_id.clone(), result);
                    if task_completed_ok {
                        completed.insert(task.task_id.clone());
                    } else {
                        failed.insert(task.task_id.clone());
                        any_nonoptional_failed = any_nonoptional_failed || !task.optional;
                    }

                    self.emit_progress(run_id, &completed, &failed, total, events).await;

                    if workflow.stop_on_failure && any_nonoptional_failed {
                        self.stop_remaining(workflow, &completed, &failed, run_id, events, &mut results)
                            .await;
                        break;
                    }
                }
            }
        }

        let status = if !cancelled.is_empty() {
            RunStatus::Cancelled
        } else if any_nonoptional_failed {
            RunStatus::Failed
        } else if !failed.is_empty() {
            // Only optional tasks failed; the run otherwise completed.
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };

        Ok((status, results))
    }

    async fn emit_progress(
        &self,
        run_id: &str,
        completed: &HashSet<String>,
        failed: &HashSet<String>,
        total: usize,
        events: &mpsc::Sender<ProgressEvent>,
    ) {
        if total == 0 {
            return;
        }
        let percent = ((completed.len() + failed.len()) as f32 / total as f32) * 100.0;
        let _ = events.send(ProgressEvent::progress(run_id, percent)).await;
    }

    /// Marks a task failed without ever invoking a processor: used for
    /// dependency-failure poisoning and the "all remaining blocked"
    /// termination. Still creates and completes a Step Record so the
    /// "started_at set before any processor work" invariant and the
    /// "exactly one started precedes exactly one terminal event" rule
    /// both hold for tasks that never actually run.
    async fn record_poisoned(
        &self,
        run_id: &str,
        task: &TaskDefinition,
        reason: &str,
        events: &mpsc::Sender<ProgressEvent>,
        results: &mut HashMap<String, TaskResult>,
    ) {
        let started_at = Utc::now();
        let _ = events
            .send(ProgressEvent::task_started(run_id, &task.task_id, &task.name))
            .await;

        let step_id = self
            .state_store
            .create_step(run_id, &task.name, &task.tool_or_type(), started_at)
            .await;

        let completed_at = Utc::now();
        if let Ok(step_id) = step_id {
            let _ = self
                .state_store
                .update_step(
                    &step_id,
                    TaskStatus::Failed,
                    completed_at,
                    Value::Object(Map::new()),
                    reason.to_string(),
                )
                .await;
        }

        let _ = events
            .send(ProgressEvent::task_failed(
                run_id,
                &task.task_id,
                &task.name,
                reason,
            ))
            .await;

        results.insert(
            task.task_id.clone(),
            TaskResult {
                task_id: task.task_id.clone(),
                status: TaskStatus::Failed,
                output: HashMap::new(),
                raw_output: String::new(),
                errors: vec![reason.to_string()],
                execution_time: 0.0,
                timestamp: completed_at,
                retry_count: 0,
                exit_code: None,
                tool_missing: false,
            },
        );
    }

    /// `stop_on_failure` halt: everything not yet terminal is marked
    /// failed with a distinct reason from plain dependency poisoning.
    async fn stop_remaining(
        &self,
        workflow: &Workflow,
        completed: &HashSet<String>,
        failed: &HashSet<String>,
        run_id: &str,
        events: &mpsc::Sender<ProgressEvent>,
        results: &mut HashMap<String, TaskResult>,
    ) {
        for task_id in &workflow.declaration_order {
            if completed.contains(task_id) || failed.contains(task_id) {
                continue;
            }
            let task = workflow.task(task_id).expect("validated workflow");
            self.record_poisoned(run_id, task, "Run stopped after failure (stop_on_failure)", events, results)
                .await;
        }
    }

    async fn cancel_remaining(
        &self,
        workflow: &Workflow,
        completed: &HashSet<String>,
        failed: &HashSet<String>,
        cancelled: &mut HashSet<String>,
        run_id: &str,
        events: &mpsc::Sender<ProgressEvent>,
    ) {
        for task_id in &workflow.declaration_order {
            if completed.contains(task_id) || failed.contains(task_id) {
                continue;
            }
            let task = workflow.task(task_id).expect("validated workflow");
            let _ = events
                .send(ProgressEvent::task_started(run_id, &task.task_id, &task.name))
                .await;
            let started_at = Utc::now();
            if let Ok(step_id) = self
                .state_store
                .create_step(run_id, &task.name, &task.tool_or_type(), started_at)
                .await
            {
                let _ = self
                    .state_store
                    .update_step(
                        &step_id,
                        TaskStatus::Cancelled,
                        Utc::now(),
                        Value::Object(Map::new()),
                        "run cancelled".to_string(),
                    )
                    .await;
            }
            cancelled.insert(task_id.clone());
        }
    }

    /// Dispatches one ready task to the appropriate processor. Never
    /// returns `Err`: every failure mode becomes a failed `TaskResult`
    /// instead of aborting the run.
    #[instrument(skip(self, workflow, results, events), fields(task_id = %task.task_id))]
    async fn execute_task(
        &self,
        workflow: &Workflow,
        run_id: &str,
        task: &TaskDefinition,
        results: &HashMap<String, TaskResult>,
        events: &mpsc::Sender<ProgressEvent>,
    ) -> TaskResult {
        let started_at = Utc::now();
        let _ = events
            .send(ProgressEvent::task_started(run_id, &task.task_id, &task.name))
            .await;
        let step_id = self
            .state_store
            .create_step(run_id, &task.name, &task.tool_or_type(), started_at)
            .await
            .ok();

        let mut result = match &task.kind {
            TaskKind::Tool { tool, parameters } => {
                self.execute_tool(workflow, tool, parameters, task.timeout, results).await
            }
            TaskKind::Merge {
                merge_sources,
                merge_field,
                dedupe_key,
                merge_strategy,
            } => {
                self.execute_merge(
                    workflow,
                    merge_sources,
                    merge_field.as_deref(),
                    dedupe_key,
                    *merge_strategy,
                    results,
                )
            }
            TaskKind::FileOutput {
                source_task,
                source_field,
                output_file,
                extract_field,
                format,
            } => self.execute_file_output(
                source_task,
                source_field,
                output_file,
                extract_field.as_deref(),
                *format,
                results,
            ),
            TaskKind::JsonAggregate {
                output_file,
                sections,
                include_metadata,
            } => self.execute_json_aggregate(
                workflow,
                output_file,
                sections,
                *include_metadata,
                results,
            ),
            TaskKind::WebCrawl { .. } | TaskKind::ExploitLookup { .. } => TaskResult {
                task_id: String::new(),
                status: TaskStatus::Failed,
                output: HashMap::new(),
                raw_output: String::new(),
                errors: vec![format!(
                    "{} has no adapter in this core; web crawling and exploit lookup are instantiation-specific",
                    task.tool_or_type()
                )],
                execution_time: 0.0,
                timestamp: Utc::now(),
                retry_count: 0,
                exit_code: None,
                tool_missing: false,
            },
        };

        result.task_id = task.task_id.clone();
        let completed_at = Utc::now();

        if let Some(step_id) = step_id {
            let output_value = result.output_as_value();
            let errors_joined = result.errors.join("; ");
            let _ = self
                .state_store
                .update_step(&step_id, result.status, completed_at, output_value, errors_joined)
                .await;
        }

        match result.status {
            TaskStatus::Completed => {
                let _ = events
                    .send(ProgressEvent::task_completed(run_id, &task.task_id, &task.name))
                    .await;
            }
            _ => {
                let error_text = result.errors.join("; ");
                let _ = events
                    .send(ProgressEvent::task_failed(
                        run_id,
                        &task.task_id,
                        &task.name,
                        &error_text,
                    ))
                    .await;
            }
        }

        result
    }

    fn results_as_output_map(results: &HashMap<String, TaskResult>) -> HashMap<String, Value> {
        results
            .iter()
            .map(|(k, v)| (k.clone(), v.output_as_value()))
            .collect()
    }

    async fn execute_tool(
        &self,
        workflow: &Workflow,
        tool: &str,
        parameters: &HashMap<String, Value>,
        timeout: u32,
        results: &HashMap<String, TaskResult>,
    ) -> TaskResult {
        let Some(adapter) = self.adapters.get(tool) else {
            return TaskResult {
                task_id: String::new(),
                status: TaskStatus::Failed,
                output: HashMap::new(),
                raw_output: String::new(),
                errors: vec![format!("unknown adapter '{tool}'")],
                execution_time: 0.0,
                timestamp: Utc::now(),
                retry_count: 0,
                exit_code: None,
                tool_missing: false,
            };
        };

        let results_view = Self::results_as_output_map(results);
        let resolved = resolve_parameters(parameters, &results_view);

        let result = adapter::execute(adapter.as_ref(), &resolved, Some(timeout)).await;

        let ext = if result.raw_output.trim_start().starts_with('{')
            || result.raw_output.trim_start().starts_with('[')
        {
            "json"
        } else {
            "txt"
        };
        self.persister
            .write_raw(&workflow.target, tool, ext, &result.raw_output);
        self.persister
            .write_parsed(&workflow.target, tool, &result.output_as_value());

        if tool == "nmap" && result.status == TaskStatus::Completed {
            if let Some(Value::Array(hosts)) = result.output.get("hosts") {
                self.persister
                    .enrich_subdomains_with_ports(&workflow.target, hosts);
            }
        }

        result
    }

    fn execute_merge(
        &self,
        workflow: &Workflow,
        merge_sources: &[String],
        merge_field: Option<&str>,
        dedupe_key: &str,
        strategy: crate::model::task::MergeStrategy,
        results: &HashMap<String, TaskResult>,
    ) -> TaskResult {
        let start = std::time::Instant::now();
        let mut sources = Vec::with_capacity(merge_sources.len());

        for source_id in merge_sources {
            match results.get(source_id) {
                Some(r) if r.status == TaskStatus::Completed => {
                    let items = merge::extract_source_items(&r.output, merge_field);
                    sources.push((source_id.clone(), items));
                }
                _ => {
                    return TaskResult {
                        task_id: String::new(),
                        status: TaskStatus::Failed,
                        output: HashMap::new(),
                        raw_output: String::new(),
                        errors: vec![format!(
                            "merge source '{source_id}' did not complete successfully"
                        )],
                        execution_time: start.elapsed().as_secs_f64(),
                        timestamp: Utc::now(),
                        retry_count: 0,
                        exit_code: None,
                        tool_missing: false,
                    };
                }
            }
        }

        let merged = merge::merge(sources, dedupe_key, strategy);

        let output_files = match self.persister.write_merge_outputs(&workflow.target, &merged) {
            Ok(paths) => paths,
            Err(err) => {
                warn!(error = %err, "failed to write merge outputs; continuing best-effort");
                HashMap::new()
            }
        };

        let mut output = HashMap::new();
        output.insert("merged_data".to_string(), Value::Array(merged.clone()));
        output.insert(
            "output_files".to_string(),
            Value::Object(
                output_files
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        );
        output.insert("item_count".to_string(), Value::from(merged.len()));

        TaskResult {
            task_id: String::new(),
            status: TaskStatus::Completed,
            output,
            raw_output: String::new(),
            errors: vec![],
            execution_time: start.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
            retry_count: 0,
            exit_code: Some(0),
            tool_missing: false,
        }
    }

    fn execute_file_output(
        &self,
        source_task: &str,
        source_field: &str,
        output_file: &str,
        extract_field: Option<&str>,
        format: crate::model::task::FileOutputFormat,
        results: &HashMap<String, TaskResult>,
    ) -> TaskResult {
        let start = std::time::Instant::now();
        let by_task: HashMap<String, HashMap<String, Value>> = results
            .iter()
            .map(|(k, v)| (k.clone(), v.output.clone()))
            .collect();

        match file_output::run(&by_task, source_task, source_field, output_file, extract_field, format) {
            Ok(r) => {
                let mut output = HashMap::new();
                output.insert("success".to_string(), Value::Bool(true));
                output.insert("output_file".to_string(), Value::String(r.output_file));
                output.insert("items_written".to_string(), Value::from(r.items_written));
                TaskResult {
                    task_id: String::new(),
                    status: TaskStatus::Completed,
                    output,
                    raw_output: String::new(),
                    errors: vec![],
                    execution_time: start.elapsed().as_secs_f64(),
                    timestamp: Utc::now(),
                    retry_count: 0,
                    exit_code: Some(0),
                    tool_missing: false,
                }
            }
            Err(err) => TaskResult {
                task_id: String::new(),
                status: TaskStatus::Failed,
                output: HashMap::new(),
                raw_output: String::new(),
                errors: vec![err.to_string()],
                execution_time: start.elapsed().as_secs_f64(),
                timestamp: Utc::now(),
                retry_count: 0,
                exit_code: None,
                tool_missing: false,
            },
        }
    }

    fn execute_json_aggregate(
        &self,
        workflow: &Workflow,
        output_file: &str,
        sections: &[crate::model::task::AggregateSection],
        include_metadata: bool,
        results: &HashMap<String, TaskResult>,
    ) -> TaskResult {
        let start = std::time::Instant::now();
        let by_task: HashMap<String, HashMap<String, Value>> = results
            .iter()
            .map(|(k, v)| (k.clone(), v.output.clone()))
            .collect();

        match json_aggregate::run(&by_task, &workflow.workflow_id, output_file, sections, include_metadata) {
            Ok(r) => {
                let mut output = HashMap::new();
                output.insert("success".to_string(), Value::Bool(true));
                output.insert("output_file".to_string(), Value::String(r.output_file));
                output.insert("sections_written".to_string(), Value::from(r.sections_written));
                TaskResult {
                    task_id: String::new(),
                    status: TaskStatus::Completed,
                    output,
                    raw_output: String::new(),
                    errors: vec![],
                    execution_time: start.elapsed().as_secs_f64(),
                    timestamp: Utc::now(),
                    retry_count: 0,
                    exit_code: Some(0),
                    tool_missing: false,
                }
            }
            Err(err) => TaskResult {
                task_id: String::new(),
                status: TaskStatus::Failed,
                output: HashMap::new(),
                raw_output: String::new(),
                errors: vec![err.to_string()],
                execution_time: start.elapsed().as_secs_f64(),
                timestamp: Utc::now(),
                retry_count: 0,
                exit_code: None,
                tool_missing: false,
            },
        }
    }
}
