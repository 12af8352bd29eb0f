//! Built-in transform tasks: FILE_OUTPUT and JSON_AGGREGATE. Both consume
//! prior task outputs rather than spawning a subprocess.

pub mod file_output;
pub mod json_aggregate;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("source task '{0}' not found among completed results")]
    SourceNotFound(String),
    #[error("field '{field}' not found in output of task '{task}'")]
    FieldNotFound { task: String, field: String },
    #[error("failed to write '{0}': {1}")]
    WriteFailed(String, String),
}
