//! Actions the engine can dispatch.
//!
//! `ActionKind` is a closed sum type: the executor matches it exhaustively,
//! so adding a kind means touching exactly one dispatch site.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::types::FileContent;

/// Tag of an action kind as persisted in `attempt.action_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    Shell,
    Files,
    Http,
    ReasoningCall,
    EnvironmentOp,
    Custom,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Shell => "shell",
            ActionType::Files => "files",
            ActionType::Http => "http",
            ActionType::ReasoningCall => "reasoning-call",
            ActionType::EnvironmentOp => "environment-op",
            ActionType::Custom => "custom",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "shell" => Some(ActionType::Shell),
            "files" => Some(ActionType::Files),
            "http" => Some(ActionType::Http),
            "reasoning-call" => Some(ActionType::ReasoningCall),
            "environment-op" => Some(ActionType::EnvironmentOp),
            "custom" => Some(ActionType::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation to perform against one task node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub description: String,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(description: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            kind,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }
}

/// Parameters for each action kind, tagged as `{"type": .., "params": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "kebab-case")]
pub enum ActionKind {
    Shell(ShellParams),
    Files(FilesParams),
    Http(HttpParams),
    ReasoningCall(ReasoningParams),
    EnvironmentOp(EnvironmentOpParams),
    Custom(Value),
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::Shell(_) => ActionType::Shell,
            ActionKind::Files(_) => ActionType::Files,
            ActionKind::Http(_) => ActionType::Http,
            ActionKind::ReasoningCall(_) => ActionType::ReasoningCall,
            ActionKind::EnvironmentOp(_) => ActionType::EnvironmentOp,
            ActionKind::Custom(_) => ActionType::Custom,
        }
    }

    /// True if running this action can change the environment.
    pub fn is_state_mutating(&self) -> bool {
        matches!(
            self,
            ActionKind::Shell(_) | ActionKind::Files(_) | ActionKind::EnvironmentOp(_)
        )
    }

    /// The `params` payload on its own, as stored in `attempt.action_params`.
    pub fn params_value(&self) -> Result<Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("params")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Rebuild a kind from its persisted tag and params payload.
    pub fn from_parts(action_type: ActionType, params: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({
            "type": action_type.as_str(),
            "params": params,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellParams {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesParams {
    pub files: Vec<FileContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    #[serde(default = "default_http_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningParams {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: CompletionOptions,
}

/// Argv-style command run inside the environment without a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentOpParams {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call overrides for a completion provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}
