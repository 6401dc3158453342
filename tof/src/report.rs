//! Plain-text rendering for `list` and `view`.

use std::fmt::Write as _;

use anyhow::Result;

use crate::core::task::TaskNode;
use crate::core::types::ActionOutputs;
use crate::io::oracle::clip;
use crate::io::store::TaskStore;
use crate::snapshot::SnapshotManager;

/// Outputs shown by `view` are clipped to this many bytes per stream.
const VIEW_OUTPUT_LIMIT: usize = 2_000;

/// One line per task: id, status, attempt count, parent, description.
pub fn render_list(tasks: &[TaskNode]) -> String {
    let mut buf = String::new();
    for task in tasks {
        let _ = writeln!(
            buf,
            "{}  {:<11}  {:>3}  {}  {}",
            task.id,
            task.status,
            task.attempts.len(),
            task.parent_id.as_deref().unwrap_or("-"),
            first_line(&task.description)
        );
    }
    buf
}

pub fn list(store: &TaskStore) -> Result<String> {
    Ok(render_list(&store.list()?))
}

/// Full report for one task: fields, snapshot chain, children and attempts.
pub fn view(store: &TaskStore, task_id: &str) -> Result<String> {
    let task = store.require(task_id)?;
    let children = store.children(task_id)?;
    let chain = match &task.environment_snapshot_id {
        Some(id) => SnapshotManager::new(store).chain(id)?,
        None => Vec::new(),
    };

    let mut buf = String::new();
    let _ = writeln!(buf, "id:          {}", task.id);
    let _ = writeln!(buf, "status:      {}", task.status);
    let _ = writeln!(buf, "description: {}", task.description);
    if task.goal != task.description {
        let _ = writeln!(buf, "goal:        {}", task.goal);
    }
    if let Some(parent_id) = &task.parent_id {
        let _ = writeln!(buf, "parent:      {parent_id}");
    }
    if let Some(summary) = &task.continuation_summary {
        let _ = writeln!(buf, "summary:     {summary}");
    }
    let _ = writeln!(buf, "created:     {}", task.created_at.to_rfc3339());
    let _ = writeln!(buf, "updated:     {}", task.updated_at.to_rfc3339());

    if !chain.is_empty() {
        let _ = writeln!(buf, "\nsnapshots (newest first):");
        for record in &chain {
            let _ = writeln!(buf, "  {}  task {}  {}", record.id, record.task_id, record.created_at.to_rfc3339());
        }
    }

    if !children.is_empty() {
        let _ = writeln!(buf, "\nchildren:");
        for child in &children {
            let _ = writeln!(buf, "  {}  {}  {}", child.id, child.status, first_line(&child.description));
        }
    }

    let _ = writeln!(buf, "\nattempts ({}):", task.attempts.len());
    for (idx, attempt) in task.attempts.iter().enumerate() {
        let _ = writeln!(
            buf,
            "#{} {} {} [{}] {}",
            idx + 1,
            attempt.created_at.to_rfc3339(),
            attempt.status.as_str(),
            attempt.action.action_type(),
            first_line(&attempt.action.description)
        );
        if let Some(error) = &attempt.error {
            let _ = writeln!(
                buf,
                "   error: {} ({}) {}",
                error.code,
                error.severity.as_str(),
                error.message
            );
        }
        if let Some(outputs) = &attempt.outputs {
            render_outputs(&mut buf, outputs);
        }
    }
    Ok(buf)
}

fn render_outputs(buf: &mut String, outputs: &ActionOutputs) {
    if let Some(code) = outputs.exit_code {
        let _ = writeln!(buf, "   exit code: {code}");
    }
    if let Some(status) = outputs.http_status {
        let _ = writeln!(buf, "   http status: {status}");
    }
    for (label, text) in [
        ("stdout", &outputs.stdout),
        ("stderr", &outputs.stderr),
        ("result", &outputs.result),
    ] {
        let Some(text) = text else {
            continue;
        };
        let kept = clip(text, VIEW_OUTPUT_LIMIT);
        let _ = writeln!(buf, "   {label}:");
        for line in kept.lines() {
            let _ = writeln!(buf, "     {line}");
        }
        if kept.len() < text.len() {
            let _ = writeln!(buf, "     [{} more bytes]", text.len() - kept.len());
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{AttemptResult, NewTask};
    use crate::core::types::{AttemptError, ErrorKind};
    use crate::test_support::shell;

    #[test]
    fn list_shows_one_line_per_task() {
        let store = TaskStore::open_in_memory().expect("store");
        let root = store.create(NewTask::root("install package x")).expect("root");
        store
            .create(NewTask {
                description: "configure x\nwith details".to_string(),
                goal: "configured".to_string(),
                parent_id: Some(root.id.clone()),
            })
            .expect("child");
        let text = list(&store).expect("list");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&root.id));
        assert!(lines[0].contains("pending"));
        assert!(lines[1].contains(&root.id));
        assert!(lines[1].ends_with("configure x"));
    }

    #[test]
    fn view_includes_attempt_errors_and_clipped_outputs() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("install package x")).expect("task");
        let attempt = AttemptResult::failure(
            shell("apt-get install x"),
            AttemptError::new(ErrorKind::ExecutionError, "exit status 100"),
            Some(ActionOutputs {
                stderr: Some("E".repeat(VIEW_OUTPUT_LIMIT + 10)),
                exit_code: Some(100),
                ..ActionOutputs::default()
            }),
        );
        store.append_attempt(&task.id, &attempt).expect("append");

        let text = view(&store, &task.id).expect("view");
        assert!(text.contains("status:      pending"));
        assert!(text.contains("attempts (1):"));
        assert!(text.contains("[shell] apt-get install x"));
        assert!(text.contains("error: EXECUTION_ERROR (recoverable) exit status 100"));
        assert!(text.contains("exit code: 100"));
        assert!(text.contains("[10 more bytes]"));
    }

    #[test]
    fn view_of_missing_task_fails() {
        let store = TaskStore::open_in_memory().expect("store");
        assert!(view(&store, "nope").is_err());
    }
}
