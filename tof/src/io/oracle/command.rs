//! Completion provider that shells out to a local CLI.
//!
//! The rendered conversation is written to the command's stdin and its stdout
//! is the completion. Options are passed through `TOF_MODEL`,
//! `TOF_TEMPERATURE` and `TOF_MAX_TOKENS` for wrappers that care.

use std::process::Command;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use super::{Completion, OracleCall};
use crate::core::action::{CompletionOptions, Message};
use crate::error::EngineError;
use crate::io::process::{RunLimits, run_command};

/// Completions larger than this are cut; a reply this long is not a usable action anyway.
const COMPLETION_LIMIT_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CommandCompletion {
    argv: Vec<String>,
}

impl CommandCompletion {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self { argv }),
            _ => Err(anyhow!("oracle command must be a non-empty array")),
        }
    }
}

impl Completion for CommandCompletion {
    #[instrument(skip_all, fields(program = %self.argv[0], messages = messages.len()))]
    fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        call: &OracleCall,
    ) -> Result<String> {
        if call.cancel.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        if let Some(model) = &options.model {
            cmd.env("TOF_MODEL", model);
        }
        if let Some(temperature) = options.temperature {
            cmd.env("TOF_TEMPERATURE", temperature.to_string());
        }
        if let Some(max_tokens) = options.max_tokens {
            cmd.env("TOF_MAX_TOKENS", max_tokens.to_string());
        }

        let prompt = render_transcript(messages);
        let limits = RunLimits {
            timeout: call.timeout,
            output_limit_bytes: COMPLETION_LIMIT_BYTES,
            cancel: call.cancel.clone(),
        };
        let output = run_command(cmd, Some(prompt.as_bytes()), &limits)
            .map_err(|err| EngineError::OracleUnavailable(format!("{err:#}")))?;

        if output.timed_out() {
            warn!(timeout_secs = call.timeout.as_secs(), "oracle command timed out");
            return Err(EngineError::OracleTimeout {
                secs: call.timeout.as_secs(),
            }
            .into());
        }
        if output.cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        if !output.status.success() {
            return Err(EngineError::OracleUnavailable(format!(
                "{} exited with status {:?}: {}",
                self.argv[0],
                output.status.code(),
                output.stderr_text().trim()
            ))
            .into());
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = text.len(), "oracle command completed");
        Ok(text)
    }
}

/// Flatten a conversation into plain text for CLI oracles.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut buf = String::new();
    for message in messages {
        buf.push_str("## ");
        buf.push_str(message.role.as_str());
        buf.push_str("\n\n");
        buf.push_str(message.content.trim_end());
        buf.push_str("\n\n");
    }
    buf
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::cancel::CancelToken;

    fn call(timeout: Duration) -> OracleCall {
        OracleCall {
            timeout,
            cancel: CancelToken::new(),
        }
    }

    fn sh(script: &str) -> CommandCompletion {
        CommandCompletion::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
            .expect("command")
    }

    #[test]
    fn stdin_receives_transcript() {
        let completion = sh("cat");
        let text = completion
            .complete(
                &[Message::system("rules"), Message::user("do it")],
                &CompletionOptions::default(),
                &call(Duration::from_secs(10)),
            )
            .expect("complete");
        assert_eq!(text, "## system\n\nrules\n\n## user\n\ndo it\n\n");
    }

    #[test]
    fn options_are_exported() {
        let completion = sh("printf '%s' \"$TOF_MODEL\"");
        let options = CompletionOptions {
            model: Some("m1".to_string()),
            ..CompletionOptions::default()
        };
        let text = completion
            .complete(&[], &options, &call(Duration::from_secs(10)))
            .expect("complete");
        assert_eq!(text, "m1");
    }

    #[test]
    fn nonzero_exit_is_oracle_unavailable() {
        let err = sh("echo boom >&2; exit 2")
            .complete(&[], &CompletionOptions::default(), &call(Duration::from_secs(10)))
            .unwrap_err();
        let engine = err.downcast_ref::<EngineError>().expect("engine error");
        assert!(matches!(engine, EngineError::OracleUnavailable(msg) if msg.contains("boom")));
    }

    #[test]
    fn slow_command_times_out() {
        let err = sh("sleep 5")
            .complete(&[], &CompletionOptions::default(), &call(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::OracleTimeout { .. })
        ));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(CommandCompletion::new(Vec::new()).is_err());
        assert!(CommandCompletion::new(vec![" ".to_string()]).is_err());
    }
}
