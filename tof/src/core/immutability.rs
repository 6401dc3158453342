//! Immutability checks between a stored task node and a proposed update.

use crate::core::status::check_transition;
use crate::core::task::TaskNode;

/// Validate that `next` is a legal successor of `prev`.
///
/// Enforces:
/// - Identity fields (`id`, `description`, `goal`, `parent_id`, `created_at`)
///   are unchanged.
/// - `prev` is not terminal and the status change is a legal transition.
/// - `next.attempts` starts with every attempt of `prev`, in order, each one
///   identical by value (append-only history).
///
/// Returns a list of stable error messages in field order.
pub fn check_task_update(prev: &TaskNode, next: &TaskNode) -> Vec<String> {
    let mut errors = Vec::new();

    if prev.id != next.id {
        errors.push(format!("task id changed from '{}' to '{}'", prev.id, next.id));
    }
    if prev.description != next.description {
        errors.push(format!("task '{}' description is immutable", prev.id));
    }
    if prev.goal != next.goal {
        errors.push(format!("task '{}' goal is immutable", prev.id));
    }
    if prev.parent_id != next.parent_id {
        errors.push(format!(
            "task '{}' moved from parent '{}' to '{}'",
            prev.id,
            parent_label(prev.parent_id.as_deref()),
            parent_label(next.parent_id.as_deref())
        ));
    }
    if prev.created_at != next.created_at {
        errors.push(format!("task '{}' created_at is immutable", prev.id));
    }
    if let Err(err) = check_transition(prev.status, next.status) {
        errors.push(format!("task '{}': {err}", prev.id));
    }

    errors.extend(check_append_only(prev, next));
    errors
}

/// Validate that `next.attempts` extends `prev.attempts` without rewriting it.
pub fn check_append_only(prev: &TaskNode, next: &TaskNode) -> Vec<String> {
    let mut errors = Vec::new();
    if next.attempts.len() < prev.attempts.len() {
        errors.push(format!(
            "task '{}' lost attempts ({} -> {})",
            prev.id,
            prev.attempts.len(),
            next.attempts.len()
        ));
        return errors;
    }
    for (idx, (before, after)) in prev.attempts.iter().zip(&next.attempts).enumerate() {
        if before != after {
            errors.push(format!(
                "task '{}' attempt #{} ('{}') was rewritten",
                prev.id,
                idx + 1,
                before.id
            ));
        }
    }
    errors
}

fn parent_label(parent_id: Option<&str>) -> &str {
    parent_id.unwrap_or("<root>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Action, ActionKind, ShellParams};
    use crate::core::task::{AttemptResult, NewTask};
    use crate::core::types::TaskStatus;

    fn attempt(command: &str) -> AttemptResult {
        AttemptResult::success(
            Action::new(
                command,
                ActionKind::Shell(ShellParams {
                    command: command.to_string(),
                }),
            ),
            None,
        )
    }

    #[test]
    fn status_and_summary_updates_pass() {
        let prev = TaskNode::new(NewTask::root("goal"));
        let mut next = prev.clone();
        next.status = TaskStatus::InProgress;
        next.continuation_summary = Some("next: run tests".to_string());
        assert!(check_task_update(&prev, &next).is_empty());
    }

    #[test]
    fn identity_changes_are_reported() {
        let prev = TaskNode::new(NewTask::root("goal"));
        let mut next = prev.clone();
        next.goal = "other".to_string();
        next.parent_id = Some("p".to_string());
        let errors = check_task_update(&prev, &next);
        assert!(errors.iter().any(|err| err.contains("goal is immutable")));
        assert!(errors.iter().any(|err| err.contains("moved from parent '<root>' to 'p'")));
    }

    #[test]
    fn terminal_prev_rejects_any_update() {
        let mut prev = TaskNode::new(NewTask::root("goal"));
        prev.status = TaskStatus::Failed;
        let next = prev.clone();
        let errors = check_task_update(&prev, &next);
        assert!(errors.iter().any(|err| err.contains("terminal")));
    }

    #[test]
    fn rewriting_history_is_reported() {
        let mut prev = TaskNode::new(NewTask::root("goal"));
        prev.attempts.push(attempt("a"));
        prev.attempts.push(attempt("b"));

        let mut reordered = prev.clone();
        reordered.attempts.swap(0, 1);
        let errors = check_append_only(&prev, &reordered);
        assert_eq!(errors.len(), 2);

        let mut truncated = prev.clone();
        truncated.attempts.pop();
        let errors = check_append_only(&prev, &truncated);
        assert!(errors[0].contains("lost attempts (2 -> 1)"));

        let mut extended = prev.clone();
        extended.attempts.push(attempt("c"));
        assert!(check_append_only(&prev, &extended).is_empty());
    }
}
