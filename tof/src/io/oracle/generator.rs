//! Action generator backed by a text completion provider.

use anyhow::Result;
use tracing::{debug, instrument};

use super::parse::{parse_continuation, parse_proposal};
use super::prompt::PromptEngine;
use super::{ActionGenerator, Completion, Continuation, OracleCall, Proposal};
use crate::core::action::{CompletionOptions, Message};
use crate::core::task::TaskNode;
use crate::core::types::AttemptError;

/// Renders prompts from task state, calls a [`Completion`] and parses the reply.
#[derive(Debug)]
pub struct OracleGenerator<C: Completion> {
    completion: C,
    prompts: PromptEngine,
    defaults: CompletionOptions,
    workdir: String,
}

impl<C: Completion> OracleGenerator<C> {
    /// `workdir` is the environment label shown to the oracle.
    pub fn new(
        completion: C,
        defaults: CompletionOptions,
        prompt_output_limit_bytes: usize,
        workdir: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            prompts: PromptEngine::new(prompt_output_limit_bytes),
            defaults,
            workdir: workdir.into(),
        }
    }

    fn ask(&self, messages: &[Message], call: &OracleCall) -> Result<String> {
        let text = self.completion.complete(messages, &self.defaults, call)?;
        debug!(bytes = text.len(), "oracle replied");
        Ok(text)
    }
}

impl<C: Completion> ActionGenerator for OracleGenerator<C> {
    #[instrument(skip_all, fields(task_id = %task.id, attempts = task.attempts.len()))]
    fn next_action(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Proposal> {
        let messages = self.prompts.next_action(task, &self.workdir)?;
        let text = self.ask(&messages, call)?;
        Ok(parse_proposal(&text)?)
    }

    #[instrument(skip_all, fields(task_id = %task.id, error_code = %error.code))]
    fn next_action_after_failure(
        &mut self,
        task: &TaskNode,
        error: &AttemptError,
        call: &OracleCall,
    ) -> Result<Proposal> {
        let messages = self.prompts.after_failure(task, error, &self.workdir)?;
        let text = self.ask(&messages, call)?;
        Ok(parse_proposal(&text)?)
    }

    #[instrument(skip_all, fields(task_id = %task.id))]
    fn continuation_summary(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Continuation> {
        let messages = self.prompts.continuation(task)?;
        let text = self.ask(&messages, call)?;
        Ok(parse_continuation(&text)?)
    }

    fn complete(
        &mut self,
        messages: &[Message],
        options: &CompletionOptions,
        call: &OracleCall,
    ) -> Result<String> {
        let merged = CompletionOptions {
            model: options.model.clone().or_else(|| self.defaults.model.clone()),
            temperature: options.temperature.or(self.defaults.temperature),
            max_tokens: options.max_tokens.or(self.defaults.max_tokens),
        };
        self.completion.complete(messages, &merged, call)
    }
}
