//! Shared deterministic types for engine core logic.
//!
//! These types define the persisted vocabulary (status enums, error codes,
//! captured outputs). Their string forms are part of the store schema and
//! must remain stable across releases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task node.
///
/// Only `pending -> in_progress -> {success, failed}` is legal; the two
/// terminal states never change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(AttemptStatus::Success),
            "failure" => Some(AttemptStatus::Failure),
            _ => None,
        }
    }
}

/// Whether another attempt at the same node is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Recoverable,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Recoverable => "recoverable",
            Severity::Fatal => "fatal",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "recoverable" => Some(Severity::Recoverable),
            "fatal" => Some(Severity::Fatal),
            _ => None,
        }
    }
}

/// Persisted error codes for failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Dispatch failed: nonzero exit, network failure, file write failure.
    ExecutionError,
    /// A blocking call exceeded its deadline.
    Timeout,
    /// Oracle output could not be parsed into a structured action.
    InvalidOracleResponse,
    /// The oracle transport itself failed (process crash, HTTP error).
    OracleError,
    /// The action kind has no execution strategy.
    UnsupportedAction,
    /// Checkpoint or restore failed.
    SnapshotError,
    /// Attempt count or wall-clock budget exhausted.
    CeilingExceeded,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ExecutionError => "EXECUTION_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InvalidOracleResponse => "INVALID_ORACLE_RESPONSE",
            ErrorKind::OracleError => "ORACLE_ERROR",
            ErrorKind::UnsupportedAction => "UNSUPPORTED_ACTION",
            ErrorKind::SnapshotError => "SNAPSHOT_ERROR",
            ErrorKind::CeilingExceeded => "CEILING_EXCEEDED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "EXECUTION_ERROR" => Some(ErrorKind::ExecutionError),
            "TIMEOUT" => Some(ErrorKind::Timeout),
            "INVALID_ORACLE_RESPONSE" => Some(ErrorKind::InvalidOracleResponse),
            "ORACLE_ERROR" => Some(ErrorKind::OracleError),
            "UNSUPPORTED_ACTION" => Some(ErrorKind::UnsupportedAction),
            "SNAPSHOT_ERROR" => Some(ErrorKind::SnapshotError),
            "CEILING_EXCEEDED" => Some(ErrorKind::CeilingExceeded),
            _ => None,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::ExecutionError
            | ErrorKind::Timeout
            | ErrorKind::InvalidOracleResponse
            | ErrorKind::OracleError => Severity::Recoverable,
            ErrorKind::UnsupportedAction | ErrorKind::SnapshotError | ErrorKind::CeilingExceeded => {
                Severity::Fatal
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error recorded on a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub code: ErrorKind,
    pub message: String,
    pub severity: Severity,
}

impl AttemptError {
    /// Build an error with the kind's default severity.
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.default_severity(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.severity.as_str(), self.message)
    }
}

/// Captured output of an executed action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ActionOutputs {
    pub fn is_empty(&self) -> bool {
        self == &ActionOutputs::default()
    }
}

/// A complete file to write into the environment (never a partial diff).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// Path relative to the environment workdir.
    pub path: String,
    pub content: String,
}

impl FileContent {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// When the engine checkpoints the environment before a mutating action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Before every state-mutating action.
    #[default]
    EveryAction,
    /// Once per task, before its first state-mutating action.
    EveryTask,
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip_through_strings() {
        for kind in [
            ErrorKind::ExecutionError,
            ErrorKind::Timeout,
            ErrorKind::InvalidOracleResponse,
            ErrorKind::OracleError,
            ErrorKind::UnsupportedAction,
            ErrorKind::SnapshotError,
            ErrorKind::CeilingExceeded,
        ] {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn serde_code_matches_persisted_code() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedAction).expect("serialize");
        assert_eq!(json, "\"UNSUPPORTED_ACTION\"");
    }

    #[test]
    fn unsupported_and_snapshot_errors_are_fatal() {
        assert!(AttemptError::new(ErrorKind::UnsupportedAction, "x").is_fatal());
        assert!(AttemptError::new(ErrorKind::SnapshotError, "x").is_fatal());
        assert!(!AttemptError::new(ErrorKind::ExecutionError, "x").is_fatal());
        assert!(!AttemptError::new(ErrorKind::Timeout, "x").is_fatal());
    }

    #[test]
    fn checkpoint_policy_parses_from_snake_case() {
        let policy: CheckpointPolicy = serde_json::from_str("\"every_task\"").expect("parse");
        assert_eq!(policy, CheckpointPolicy::EveryTask);
        assert_eq!(CheckpointPolicy::default(), CheckpointPolicy::EveryAction);
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("done"), None);
    }
}
