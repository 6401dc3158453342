//! Backtrack selection after a failed attempt.
//!
//! Selectors are pure: they look at the failing node, its error and (for the
//! ancestor policy) the chain of ancestors, and return a decision. Restoring
//! snapshots and persisting the outcome is the engine's job.

use serde::{Deserialize, Serialize};

use crate::core::task::TaskNode;
use crate::core::types::AttemptError;

/// Which selector a workspace uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktrackPolicy {
    #[default]
    SingleBranch,
    Ancestor,
}

/// What the engine should do after a recoverable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktrackDecision {
    /// Restore `snapshot_id` (if any) and try this node again.
    Retry { snapshot_id: Option<String> },
    /// Give this node up and resume exploration at an ancestor.
    Escalate {
        ancestor_id: String,
        snapshot_id: String,
    },
    /// Mark the node failed.
    GiveUp { reason: String },
}

/// Inputs to a backtrack decision.
#[derive(Debug, Clone, Copy)]
pub struct BacktrackContext<'a> {
    pub node: &'a TaskNode,
    pub error: &'a AttemptError,
    /// Ancestors of `node`, nearest first.
    pub ancestors: &'a [TaskNode],
    pub max_attempts: u32,
}

pub trait BacktrackSelector {
    fn select(&self, ctx: &BacktrackContext<'_>) -> BacktrackDecision;
}

/// Build the selector configured for a workspace.
pub fn selector_for(policy: BacktrackPolicy) -> Box<dyn BacktrackSelector> {
    match policy {
        BacktrackPolicy::SingleBranch => Box::new(SingleBranchSelector),
        BacktrackPolicy::Ancestor => Box::new(AncestorSelector),
    }
}

/// Retry the same node from its most recent snapshot until the budget runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleBranchSelector;

impl BacktrackSelector for SingleBranchSelector {
    fn select(&self, ctx: &BacktrackContext<'_>) -> BacktrackDecision {
        if ctx.error.is_fatal() {
            return BacktrackDecision::GiveUp {
                reason: format!("fatal error: {}", ctx.error),
            };
        }
        if is_exhausted(ctx.node, ctx.max_attempts) {
            return BacktrackDecision::GiveUp {
                reason: format!(
                    "attempt budget exhausted ({}/{})",
                    ctx.node.attempt_count(),
                    ctx.max_attempts
                ),
            };
        }
        BacktrackDecision::Retry {
            snapshot_id: ctx.node.environment_snapshot_id.clone(),
        }
    }
}

/// Like [`SingleBranchSelector`], but once a node's budget is spent, walk up
/// `parent_id` links to the nearest ancestor that can still explore.
#[derive(Debug, Clone, Copy, Default)]
pub struct AncestorSelector;

impl BacktrackSelector for AncestorSelector {
    fn select(&self, ctx: &BacktrackContext<'_>) -> BacktrackDecision {
        let local = SingleBranchSelector.select(ctx);
        if ctx.error.is_fatal() || !is_exhausted(ctx.node, ctx.max_attempts) {
            return local;
        }
        ctx.ancestors
            .iter()
            .find_map(|ancestor| {
                if ancestor.is_terminal() || is_exhausted(ancestor, ctx.max_attempts) {
                    return None;
                }
                let snapshot_id = ancestor.environment_snapshot_id.clone()?;
                Some(BacktrackDecision::Escalate {
                    ancestor_id: ancestor.id.clone(),
                    snapshot_id,
                })
            })
            .unwrap_or(local)
    }
}

fn is_exhausted(node: &TaskNode, max_attempts: u32) -> bool {
    node.attempt_count() >= max_attempts
}
