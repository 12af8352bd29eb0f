//! Workflow/Task data model: definitions, validation, parameter
//! resolution, and file loading.

pub mod loader;
pub mod resolver;
pub mod task;
pub mod validate;

pub use loader::{LoadError, WorkflowLoader};
pub use task::{
    AggregateSection, FileOutputFormat, MergeStrategy, RetryPolicy, TaskDefinition, TaskKind,
    WorkflowDefinition,
};
pub use validate::{load_workflow, ValidationError, Workflow};
