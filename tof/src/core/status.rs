//! Status transition rules for task nodes.

use crate::core::types::TaskStatus;

/// Validate a status change.
///
/// Legal moves: `pending -> in_progress`, `in_progress -> success|failed`, and
/// staying in a non-terminal state (a resumed node re-enters `in_progress`).
/// Terminal states accept nothing, not even a no-op write.
pub fn check_transition(from: TaskStatus, to: TaskStatus) -> Result<(), String> {
    if from.is_terminal() {
        return Err(format!("status '{from}' is terminal and cannot change to '{to}'"));
    }
    let allowed = match from {
        TaskStatus::Pending => matches!(to, TaskStatus::Pending | TaskStatus::InProgress),
        TaskStatus::InProgress => matches!(
            to,
            TaskStatus::InProgress | TaskStatus::Success | TaskStatus::Failed
        ),
        TaskStatus::Success | TaskStatus::Failed => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(format!("illegal status transition '{from}' -> '{to}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(check_transition(TaskStatus::Pending, TaskStatus::InProgress).is_ok());
        assert!(check_transition(TaskStatus::InProgress, TaskStatus::Success).is_ok());
        assert!(check_transition(TaskStatus::InProgress, TaskStatus::Failed).is_ok());
        assert!(check_transition(TaskStatus::InProgress, TaskStatus::InProgress).is_ok());
    }

    #[test]
    fn skipping_in_progress_is_rejected() {
        let err = check_transition(TaskStatus::Pending, TaskStatus::Success).unwrap_err();
        assert!(err.contains("illegal"));
        assert!(check_transition(TaskStatus::Pending, TaskStatus::Failed).is_err());
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in [TaskStatus::Success, TaskStatus::Failed] {
            for to in [
                TaskStatus::Pending,
                TaskStatus::InProgress,
                TaskStatus::Success,
                TaskStatus::Failed,
            ] {
                assert!(check_transition(from, to).is_err(), "{from} -> {to}");
            }
        }
    }
}
