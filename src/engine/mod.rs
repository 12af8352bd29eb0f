//! Execution engine: the Dependency Scheduler and the Execution Driver
//! that rides it, plus the shared result, event, and error types they
//! pass between each other and up to the CLI.
//!
//! - `scheduler` - ready-set computation and failure propagation
//! - `driver` - the run state machine that dispatches ready tasks
//! - `result` - Run Record, Step Record, and Task Result types
//! - `events` - `ProgressEvent`s streamed out of a running `Driver`
//! - `error` - the Driver's own error type

pub mod driver;
pub mod error;
pub mod events;
pub mod result;
pub mod scheduler;

pub use driver::{Driver, RunOutcome};
pub use error::DriverError;
pub use events::{EventKind, ProgressEvent};
pub use result::{RunRecord, RunStatus, StepRecord, TaskResult, TaskStatus};
pub use scheduler::{PollOutcome, Scheduler};
