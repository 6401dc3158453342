//! Task nodes and their attempt history.
//!
//! Nodes form a tree through `parent_id` lookups only. Children are never
//! cached on the node; they are queried from the store on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::action::Action;
use crate::core::status::check_transition;
use crate::core::types::{ActionOutputs, AttemptError, AttemptStatus, TaskStatus};

/// Outcome of executing one action against one task node.
///
/// `error` is present iff `status` is `Failure`. Once appended to a node an
/// attempt is never edited, reordered or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub id: String,
    pub action: Action,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AttemptError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ActionOutputs>,
    pub created_at: DateTime<Utc>,
}

impl AttemptResult {
    pub fn success(action: Action, outputs: Option<ActionOutputs>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            status: AttemptStatus::Success,
            error: None,
            outputs,
            created_at: Utc::now(),
        }
    }

    pub fn failure(action: Action, error: AttemptError, outputs: Option<ActionOutputs>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            status: AttemptStatus::Failure,
            error: Some(error),
            outputs,
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success
    }

    /// Check the status/error pairing.
    pub fn validate(&self) -> Result<(), String> {
        match (self.status, &self.error) {
            (AttemptStatus::Success, None) | (AttemptStatus::Failure, Some(_)) => Ok(()),
            (AttemptStatus::Success, Some(_)) => {
                Err(format!("attempt '{}' succeeded but carries an error", self.id))
            }
            (AttemptStatus::Failure, None) => {
                Err(format!("attempt '{}' failed without an error", self.id))
            }
        }
    }
}

/// Input for creating a task node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub description: String,
    pub goal: String,
    pub parent_id: Option<String>,
}

impl NewTask {
    /// Root task whose goal is the description itself.
    pub fn root(description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            goal: description.clone(),
            description,
            parent_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub description: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_summary: Option<String>,
    pub attempts: Vec<AttemptResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskNode {
    pub fn new(task: NewTask) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: task.description,
            goal: task.goal,
            parent_id: task.parent_id,
            status: TaskStatus::Pending,
            environment_snapshot_id: None,
            continuation_summary: None,
            attempts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `to`, rejecting illegal transitions.
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), String> {
        check_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    pub fn last_attempt(&self) -> Option<&AttemptResult> {
        self.attempts.last()
    }

    /// Error of the most recent failed attempt, if the last attempt failed.
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.last_attempt().and_then(|attempt| attempt.error.as_ref())
    }

    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }
}
