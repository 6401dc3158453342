//! Extract structured actions, file blocks and continuations from oracle text.
//!
//! Recognized shapes:
//! - a fenced ```` ```json ```` block holding the action (first one wins), or
//!   the whole reply when it is bare JSON;
//! - fenced ```` ```file:<relative path> ```` blocks with complete contents;
//! - for continuations, JSON `{"summary": ..., "goal_complete": ...}`.
//!
//! Everything is validated against the bundled schemas before it is
//! deserialized. Failures are [`EngineError::InvalidOracleResponse`].

use std::sync::LazyLock;

use jsonschema::Validator;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{Continuation, Proposal};
use crate::core::action::{Action, ActionKind, ActionType};
use crate::core::types::FileContent;
use crate::error::EngineError;

const ACTION_SCHEMA: &str = include_str!("../../../schemas/action.schema.json");
const CONTINUATION_SCHEMA: &str = include_str!("../../../schemas/continuation.schema.json");

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^```[ \t]*([^\n`]*?)[ \t]*\n(.*?)^```[ \t]*$").expect("fence regex is valid")
});

static ACTION_VALIDATOR: LazyLock<Validator> =
    LazyLock::new(|| compile_schema(ACTION_SCHEMA, "action"));

static CONTINUATION_VALIDATOR: LazyLock<Validator> =
    LazyLock::new(|| compile_schema(CONTINUATION_SCHEMA, "continuation"));

fn compile_schema(raw: &str, name: &str) -> Validator {
    let schema: Value = serde_json::from_str(raw)
        .unwrap_or_else(|err| panic!("bundled {name} schema is not JSON: {err}"));
    jsonschema::validator_for(&schema)
        .unwrap_or_else(|err| panic!("bundled {name} schema is invalid: {err}"))
}

/// Action as the oracle writes it: a flat object with an optional id.
#[derive(Debug, Deserialize)]
struct ActionReply {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    action_type: ActionType,
    description: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug)]
struct FencedBlock<'a> {
    info: &'a str,
    body: &'a str,
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            Some(FencedBlock {
                info: caps.get(1)?.as_str(),
                body: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Locate the structured JSON payload in a reply.
fn json_payload(text: &str) -> Result<Value, EngineError> {
    let blocks = fenced_blocks(text);
    let candidate = blocks
        .iter()
        .find(|block| block.info.eq_ignore_ascii_case("json"))
        .map(|block| block.body.trim())
        .unwrap_or_else(|| text.trim());
    if !candidate.starts_with('{') {
        return Err(EngineError::InvalidOracleResponse(
            "no JSON block found in oracle output".to_string(),
        ));
    }
    serde_json::from_str(candidate)
        .map_err(|err| EngineError::InvalidOracleResponse(format!("malformed JSON: {err}")))
}

fn validate(validator: &Validator, instance: &Value, what: &str) -> Result<(), EngineError> {
    if validator.is_valid(instance) {
        return Ok(());
    }
    let messages = validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(EngineError::InvalidOracleResponse(format!(
        "{what} failed schema validation: {}",
        messages.join("; ")
    )))
}

/// Parse an action reply into a [`Proposal`].
pub fn parse_proposal(text: &str) -> Result<Proposal, EngineError> {
    let payload = json_payload(text)?;
    validate(&ACTION_VALIDATOR, &payload, "action")?;
    let reply: ActionReply = serde_json::from_value(payload)
        .map_err(|err| EngineError::InvalidOracleResponse(format!("action shape: {err}")))?;
    let kind = ActionKind::from_parts(reply.action_type, reply.params).map_err(|err| {
        EngineError::InvalidOracleResponse(format!("{} params: {err}", reply.action_type))
    })?;
    let action = Action {
        id: reply
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        description: reply.description,
        kind,
    };
    Ok(Proposal {
        action,
        files: parse_file_blocks(text),
    })
}

/// Collect every ```` ```file:<path> ```` block in order of appearance.
pub fn parse_file_blocks(text: &str) -> Vec<FileContent> {
    fenced_blocks(text)
        .into_iter()
        .filter_map(|block| {
            let path = block.info.strip_prefix("file:")?.trim();
            (!path.is_empty()).then(|| FileContent::new(path, block.body))
        })
        .collect()
}

/// Parse a continuation reply.
pub fn parse_continuation(text: &str) -> Result<Continuation, EngineError> {
    let payload = json_payload(text)?;
    validate(&CONTINUATION_VALIDATOR, &payload, "continuation")?;
    serde_json::from_value(payload)
        .map_err(|err| EngineError::InvalidOracleResponse(format!("continuation shape: {err}")))
}
