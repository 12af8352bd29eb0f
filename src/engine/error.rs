//! Driver-level error type. Adapter and processor failures are converted
//! into a failed `TaskResult` and never reach this enum; only conditions
//! that abort the run itself do.

use crate::model::validate::ValidationError;
use crate::persist::state_store::StateStoreError;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("workflow validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("run-state store error: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("unknown adapter '{0}'")]
    UnknownAdapter(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
