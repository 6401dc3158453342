//! Oracle adapters: completion providers and the action generator built on them.
//!
//! A [`Completion`] turns a message list into text. The [`ActionGenerator`]
//! turns task state into the next action by rendering a prompt, calling a
//! completion, and parsing the reply. Tests script [`ActionGenerator`]
//! directly without any completion provider.

pub mod command;
pub mod generator;
pub mod http;
pub mod parse;
pub mod prompt;

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::action::{Action, CompletionOptions, Message};
use crate::core::cancel::CancelToken;
use crate::core::task::TaskNode;
use crate::core::types::{AttemptError, FileContent};

pub use command::CommandCompletion;
pub use generator::OracleGenerator;
pub use http::HttpCompletion;

/// Bounds for one oracle round-trip.
#[derive(Debug, Clone)]
pub struct OracleCall {
    pub timeout: Duration,
    pub cancel: CancelToken,
}

/// A proposed action plus the complete files to write before running it.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub action: Action,
    pub files: Vec<FileContent>,
}

/// Oracle verdict after a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub summary: String,
    pub goal_complete: bool,
}

/// Text completion backend.
///
/// Transport failures surface as `EngineError::OracleUnavailable`, timeouts
/// as `EngineError::OracleTimeout`, cancellation as `EngineError::Cancelled`.
pub trait Completion {
    fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        call: &OracleCall,
    ) -> Result<String>;
}

/// Source of actions for the engine.
///
/// Each operation sees the full task, including every prior attempt.
pub trait ActionGenerator {
    fn next_action(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Proposal>;

    fn next_action_after_failure(
        &mut self,
        task: &TaskNode,
        error: &AttemptError,
        call: &OracleCall,
    ) -> Result<Proposal>;

    fn continuation_summary(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Continuation>;

    /// Raw completion, used to execute `reasoning-call` actions.
    fn complete(
        &mut self,
        messages: &[Message],
        options: &CompletionOptions,
        call: &OracleCall,
    ) -> Result<String>;
}

/// Completion provider selected by configuration.
#[derive(Debug)]
pub enum AnyCompletion {
    Command(CommandCompletion),
    Http(HttpCompletion),
}

/// Longest prefix of `text` that fits in `limit` bytes without splitting a char.
pub fn clip(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl Completion for AnyCompletion {
    fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        call: &OracleCall,
    ) -> Result<String> {
        match self {
            AnyCompletion::Command(completion) => completion.complete(messages, options, call),
            AnyCompletion::Http(completion) => completion.complete(messages, options, call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("héllo", 2), "h");
        assert_eq!(clip("abc", 10), "abc");
        assert_eq!(clip("abc", 0), "");
    }
}
