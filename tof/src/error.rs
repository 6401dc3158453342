//! Typed engine errors carried inside `anyhow::Error`.
//!
//! Most functions return `anyhow::Result`. Callers that need to branch on a
//! failure kind use `err.downcast_ref::<EngineError>()`.

use thiserror::Error;

use crate::core::types::{ErrorKind, TaskStatus};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Oracle output held no structured action (or it failed validation).
    #[error("invalid oracle response: {0}")]
    InvalidOracleResponse(String),

    /// The oracle could not be reached or returned a transport error.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The oracle did not answer within its timeout.
    #[error("oracle timed out after {secs}s")]
    OracleTimeout { secs: u64 },

    #[error("snapshot {operation} failed: {message}")]
    Snapshot {
        operation: &'static str,
        message: String,
    },

    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("task '{id}' is {status} and can no longer change")]
    TerminalTask { id: String, status: TaskStatus },

    #[error("invalid update for task '{id}': {reasons}")]
    InvalidUpdate { id: String, reasons: String },

    #[error("run cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn snapshot(operation: &'static str, err: impl std::fmt::Display) -> Self {
        EngineError::Snapshot {
            operation,
            message: format!("{err:#}"),
        }
    }

    /// Persisted error code for failures that surface as attempt errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::InvalidOracleResponse(_) => Some(ErrorKind::InvalidOracleResponse),
            EngineError::OracleUnavailable(_) => Some(ErrorKind::OracleError),
            EngineError::OracleTimeout { .. } => Some(ErrorKind::Timeout),
            EngineError::Snapshot { .. } => Some(ErrorKind::SnapshotError),
            EngineError::TaskNotFound(_)
            | EngineError::TerminalTask { .. }
            | EngineError::InvalidUpdate { .. }
            | EngineError::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_through_anyhow_preserves_kind() {
        let err: anyhow::Error = EngineError::InvalidOracleResponse("no json".to_string()).into();
        let engine = err.downcast_ref::<EngineError>().expect("engine error");
        assert_eq!(engine.kind(), Some(ErrorKind::InvalidOracleResponse));
        assert_eq!(err.to_string(), "invalid oracle response: no json");
    }

    #[test]
    fn terminal_task_message_names_status() {
        let err = EngineError::TerminalTask {
            id: "t1".to_string(),
            status: TaskStatus::Success,
        };
        assert_eq!(err.to_string(), "task 't1' is success and can no longer change");
    }
}
