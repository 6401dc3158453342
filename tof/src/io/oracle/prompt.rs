//! Prompt rendering for the oracle.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use super::clip;
use crate::core::action::Message;
use crate::core::task::TaskNode;
use crate::core::types::{ActionOutputs, AttemptError};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const NEXT_ACTION_TEMPLATE: &str = include_str!("prompts/next_action.md");
const AFTER_FAILURE_TEMPLATE: &str = include_str!("prompts/after_failure.md");
const CONTINUATION_TEMPLATE: &str = include_str!("prompts/continuation.md");

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
    output_limit_bytes: usize,
}

impl PromptEngine {
    /// `output_limit_bytes` bounds each stdout/stderr/result embedded in a prompt.
    pub fn new(output_limit_bytes: usize) -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("next_action", NEXT_ACTION_TEMPLATE)
            .expect("next_action template should be valid");
        env.add_template("after_failure", AFTER_FAILURE_TEMPLATE)
            .expect("after_failure template should be valid");
        env.add_template("continuation", CONTINUATION_TEMPLATE)
            .expect("continuation template should be valid");
        Self {
            env,
            output_limit_bytes,
        }
    }

    pub fn next_action(&self, task: &TaskNode, workdir: &str) -> Result<Vec<Message>> {
        let prompt_task = self.prompt_task(task);
        let user = self
            .env
            .get_template("next_action")?
            .render(context! {
                task => &prompt_task,
                task_json => task_json(&prompt_task)?,
            })
            .context("render next_action prompt")?;
        Ok(vec![self.system(workdir)?, Message::user(user)])
    }

    pub fn after_failure(
        &self,
        task: &TaskNode,
        error: &AttemptError,
        workdir: &str,
    ) -> Result<Vec<Message>> {
        let prompt_task = self.prompt_task(task);
        let user = self
            .env
            .get_template("after_failure")?
            .render(context! {
                task => &prompt_task,
                task_json => task_json(&prompt_task)?,
                error => error,
            })
            .context("render after_failure prompt")?;
        Ok(vec![self.system(workdir)?, Message::user(user)])
    }

    pub fn continuation(&self, task: &TaskNode) -> Result<Vec<Message>> {
        let prompt_task = self.prompt_task(task);
        let user = self
            .env
            .get_template("continuation")?
            .render(context! {
                task => &prompt_task,
                task_json => task_json(&prompt_task)?,
            })
            .context("render continuation prompt")?;
        Ok(vec![Message::user(user)])
    }

    fn system(&self, workdir: &str) -> Result<Message> {
        let text = self
            .env
            .get_template("system")?
            .render(context! { workdir => workdir })
            .context("render system prompt")?;
        Ok(Message::system(text))
    }

    /// Copy of `task` whose attempt outputs are clipped for the prompt.
    fn prompt_task(&self, task: &TaskNode) -> TaskNode {
        let mut clipped = task.clone();
        for attempt in &mut clipped.attempts {
            if let Some(outputs) = attempt.outputs.as_mut() {
                clip_outputs(outputs, self.output_limit_bytes);
            }
        }
        clipped
    }
}

fn task_json(task: &TaskNode) -> Result<String> {
    serde_json::to_string_pretty(task).context("serialize task for prompt")
}

fn clip_outputs(outputs: &mut ActionOutputs, limit: usize) {
    for field in [&mut outputs.stdout, &mut outputs.stderr, &mut outputs.result] {
        if let Some(text) = field.as_mut() {
            if text.len() > limit {
                let dropped = text.len() - clip(text, limit).len();
                let mut kept = clip(text, limit).to_string();
                kept.push_str(&format!("\n[clipped {dropped} bytes]"));
                *text = kept;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Action, ActionKind, Role, ShellParams};
    use crate::core::task::{AttemptResult, NewTask};
    use crate::core::types::ErrorKind;

    fn task_with_long_output() -> TaskNode {
        let mut task = TaskNode::new(NewTask::root("install package x"));
        task.attempts.push(AttemptResult::failure(
            Action::new(
                "install",
                ActionKind::Shell(ShellParams {
                    command: "apt-get install x".to_string(),
                }),
            ),
            AttemptError::new(ErrorKind::ExecutionError, "exit status 100"),
            Some(ActionOutputs {
                stderr: Some("E".repeat(500)),
                exit_code: Some(100),
                ..ActionOutputs::default()
            }),
        ));
        task
    }

    #[test]
    fn next_action_embeds_goal_and_workdir() {
        let engine = PromptEngine::new(4000);
        let task = TaskNode::new(NewTask::root("install package x"));
        let messages = engine.next_action(&task, "/work").expect("render");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Working directory: /work"));
        assert!(messages[1].content.starts_with("Goal: install package x"));
        assert!(messages[1].content.contains(&task.id));
    }

    #[test]
    fn after_failure_names_the_error() {
        let engine = PromptEngine::new(4000);
        let task = task_with_long_output();
        let error = task.last_error().expect("error").clone();
        let messages = engine.after_failure(&task, &error, "/work").expect("render");
        let user = &messages[1].content;
        assert!(user.contains("Error code: EXECUTION_ERROR"));
        assert!(user.contains("Severity: recoverable"));
        assert!(user.contains("apt-get install x"));
    }

    #[test]
    fn outputs_are_clipped_in_prompts_only() {
        let engine = PromptEngine::new(100);
        let task = task_with_long_output();
        let messages = engine.continuation(&task).expect("render");
        assert!(messages[0].content.contains("[clipped 400 bytes]"));
        assert!(!messages[0].content.contains(&"E".repeat(101)));
        let stored = task.attempts[0].outputs.as_ref().expect("outputs");
        assert_eq!(stored.stderr.as_ref().map(String::len), Some(500));
    }
}
