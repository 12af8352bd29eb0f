//! Tool Adapter contract: a uniform four-operation wrapper around
//! heterogeneous external binaries, plus a single generic `execute` that
//! every adapter shares.

pub mod builtin;
pub mod registry;

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::Duration;
use tracing::{info, instrument, warn};

use crate::engine::result::{TaskResult, TaskStatus};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid parameters for adapter '{0}'")]
    InvalidParameters(String),
    #[error("executable '{0}' not found")]
    ToolMissing(String),
    #[error("tool '{0}' timed out after {1}s")]
    Timeout(String, u32),
    #[error("failed to spawn '{0}': {1}")]
    SpawnFailed(String, String),
    #[error("failed to parse output of '{0}': {1}")]
    ParseFailed(String, String),
}

/// Static facts about an adapter, independent of any particular
/// invocation.
#[derive(Debug, Clone)]
pub struct AdapterMetadata {
    pub name: String,
    pub category: String,
    pub executable: String,
    pub requires_root: bool,
    pub default_timeout: u32,
    pub supports_parallel: bool,
}

/// The four pure operations every concrete tool wrapper supplies. Shared
/// behavior (timeout, spawn, capture) lives only in `execute`, never in
/// these implementations — no base class, just a flat capability.
pub trait ToolAdapter: Send + Sync {
    fn metadata(&self) -> AdapterMetadata;

    /// Cheap structural check; no I/O.
    fn validate(&self, params: &HashMap<String, Value>) -> bool;

    /// Pure synthesis of the subprocess argv; no I/O.
    fn build_argv(&self, params: &HashMap<String, Value>) -> Vec<String>;

    /// Must be deterministic and total: never raise on well-formed-but-empty
    /// input.
    fn parse(&self, stdout: &str, stderr: &str, exit_code: i32) -> Value;
}

/// Runs `adapter` against `params`, enforcing `timeout` (or the adapter's
/// default when `timeout` is `None`). This is the one place every adapter's
/// subprocess lifecycle is handled, mirroring the bash-action execution
/// helper this engine's process-spawning code is descended from.
#[instrument(skip(adapter, params), fields(tool = %adapter.metadata().name))]
pub async fn execute(
    adapter: &dyn ToolAdapter,
    params: &HashMap<String, Value>,
    timeout: Option<u32>,
) -> TaskResult {
    let metadata = adapter.metadata();
    let timeout_secs = timeout.unwrap_or(metadata.default_timeout);
    let start = Instant::now();

    if !adapter.validate(params) {
        return failed_result(
            "Invalid parameters".to_string(),
            start,
            false,
        );
    }

    let argv = adapter.build_argv(params);
    if argv.is_empty() {
        return failed_result("Invalid parameters".to_string(), start, false);
    }

    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the `wait_with_output` future on timeout below must
        // not leave the child running; kill_on_drop makes that drop
        // terminate the process instead of orphaning it.
        .kill_on_drop(true);

    let spawn_result = command.spawn();
    let child = match spawn_result {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(tool = %metadata.name, "executable not found");
            return TaskResult {
                task_id: String::new(),
                status: TaskStatus::Failed,
                output: HashMap::new(),
                raw_output: String::new(),
                errors: vec![format!("{} not found on PATH", metadata.name)],
                execution_time: start.elapsed().as_secs_f64(),
                timestamp: Utc::now(),
                retry_count: 0,
                exit_code: None,
                tool_missing: true,
            };
        }
        Err(err) => {
            return failed_result(format!("spawn failed: {err}"), start, false);
        }
    };

    // `wait_with_output` drains stdout and stderr concurrently and waits
    // on the child, so neither pipe can fill its OS buffer and deadlock
    // the other — reading them sequentially (stdout to EOF, then stderr)
    // blocks forever on any tool that writes beyond the pipe buffer on
    // one stream while the other is still open.
    match tokio::time::timeout(
        Duration::from_secs(timeout_secs as u64),
        child.wait_with_output(),
    )
    .await
    {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let data = adapter.parse(&stdout, &stderr, exit_code);
            let success = exit_code == 0;
            info!(tool = %metadata.name, success, exit_code, "tool finished");

            let mut output_map = HashMap::new();
            if let Value::Object(map) = data {
                output_map.extend(map.into_iter());
            } else {
                output_map.insert("data".to_string(), data);
            }

            TaskResult {
                task_id: String::new(),
                status: if success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                },
                output: output_map,
                raw_output: stdout,
                errors: if stderr.is_empty() {
                    vec![]
                } else {
                    vec![stderr]
                },
                execution_time: start.elapsed().as_secs_f64(),
                timestamp: Utc::now(),
                retry_count: 0,
                exit_code: Some(exit_code),
                tool_missing: false,
            }
        }
        Ok(Err(err)) => failed_result(format!("wait failed: {err}"), start, false),
        Err(_) => {
            // The timed-out future (and the child it owns) is dropped
            // here; `kill_on_drop` above terminates the process.
            warn!(tool = %metadata.name, timeout_secs, "tool timed out");
            failed_result(
                format!("{} timed out after {timeout_secs}s", metadata.name),
                start,
                false,
            )
        }
    }
}

fn failed_result(error: String, start: Instant, tool_missing: bool) -> TaskResult {
    TaskResult {
        task_id: String::new(),
        status: TaskStatus::Failed,
        output: HashMap::new(),
        raw_output: String::new(),
        errors: vec![error],
        execution_time: start.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
        retry_count: 0,
        exit_code: None,
        tool_missing,
    }
}
