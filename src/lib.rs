//! # reconflow
//!
//! A dependency-ordered execution engine for multi-tool security
//! reconnaissance pipelines: a workflow is a DAG of tasks (external tool
//! invocations, result merges, and output projections), scheduled by
//! priority and dependency readiness, with every task outcome persisted
//! to a Run-State Store and every artifact written to a structured
//! per-target directory layout.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reconflow::prelude::*;
//! use std::sync::{atomic::AtomicBool, Arc};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workflow_yaml = r#"
//! workflow_id: recon-basic
//! name: Basic recon
//! target: example.com
//! tasks:
//!   - task_id: subfinder
//!     name: Subdomain enumeration
//!     task_type: TOOL
//!     tool: subfinder
//!     parameters:
//!       domain: example.com
//! "#;
//!
//!     let definition: WorkflowDefinition = serde_yaml::from_str(workflow_yaml)?;
//!     let config = EngineConfig::default();
//!     let driver = Driver::new(
//!         config.build_state_store(),
//!         ArtifactPersister::new(config.data_root_path()),
//!         AdapterRegistry::with_builtins(),
//!     );
//!
//!     let (tx, _rx) = tokio::sync::mpsc::channel(64);
//!     let outcome = driver
//!         .run(definition, "local", tx, Arc::new(AtomicBool::new(false)))
//!         .await?;
//!
//!     println!("run {} finished: {:?}", outcome.run_id, outcome.status);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod engine;
pub mod merge;
pub mod model;
pub mod persist;
pub mod processors;

pub use config::{EngineConfig, RunStateBackend};
pub use engine::{Driver, DriverError, ProgressEvent, RunOutcome, RunStatus, TaskResult, TaskStatus};
pub use model::{load_workflow, TaskDefinition, TaskKind, ValidationError, Workflow, WorkflowDefinition};
pub use persist::{ArtifactPersister, InMemoryStateStore, JsonFileStateStore, RunStateStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adapter::registry::AdapterRegistry;
    pub use crate::adapter::ToolAdapter;
    pub use crate::config::EngineConfig;
    pub use crate::engine::{
        Driver, DriverError, EventKind, ProgressEvent, RunOutcome, RunStatus, TaskResult, TaskStatus,
    };
    pub use crate::model::{load_workflow, TaskDefinition, TaskKind, Workflow, WorkflowDefinition};
    pub use crate::persist::{ArtifactPersister, RunStateStore};
}
