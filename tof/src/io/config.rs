//! Engine configuration stored under `.tof/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::selector::BacktrackPolicy;
use crate::core::types::CheckpointPolicy;

/// Engine configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Oracle rounds (and persisted attempts) allowed per task node.
    pub max_attempts: u32,

    /// Wall-clock budget for a single `run` call, in seconds.
    pub wall_clock_secs: u64,

    /// Upper bound for a single shell/program/http action.
    pub action_timeout_secs: u64,

    /// Upper bound for a single oracle round-trip.
    pub oracle_timeout_secs: u64,

    /// Captured stdout/stderr beyond this many bytes is dropped.
    pub output_limit_bytes: usize,

    /// Attempt outputs embedded in oracle prompts are clipped to this size.
    pub prompt_output_limit_bytes: usize,

    pub checkpoint: CheckpointPolicy,

    pub backtrack: BacktrackPolicy,

    pub environment: EnvironmentConfig,

    pub oracle: OracleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            wall_clock_secs: 30 * 60,
            action_timeout_secs: 10 * 60,
            oracle_timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            prompt_output_limit_bytes: 4_000,
            checkpoint: CheckpointPolicy::default(),
            backtrack: BacktrackPolicy::default(),
            environment: EnvironmentConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    /// The workspace directory itself, snapshotted through a private git dir.
    #[default]
    Local,
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub kind: EnvironmentKind,

    /// Local working directory, relative to the workspace root.
    pub workdir: PathBuf,

    /// Base image for the docker environment.
    pub image: String,

    /// Name of the long-lived container that actions run in.
    pub container_name: String,

    pub container_workdir: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            kind: EnvironmentKind::Local,
            workdir: PathBuf::from("."),
            image: String::new(),
            container_name: "tof-workspace".to_string(),
            container_workdir: "/workspace".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    /// A local CLI that reads the prompt on stdin and prints the completion.
    #[default]
    Command,
    /// An OpenAI-compatible `/chat/completions` endpoint.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub kind: OracleKind,

    /// Command to execute for completions (e.g. `["llm", "-m", "gpt-4o"]`).
    pub command: Vec<String>,

    pub base_url: String,

    pub model: String,

    /// Name of the environment variable holding the bearer key.
    pub api_key_env: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: OracleKind::Command,
            command: vec!["llm".to_string()],
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.wall_clock_secs == 0 {
            return Err(anyhow!("wall_clock_secs must be > 0"));
        }
        if self.action_timeout_secs == 0 {
            return Err(anyhow!("action_timeout_secs must be > 0"));
        }
        if self.oracle_timeout_secs == 0 {
            return Err(anyhow!("oracle_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_output_limit_bytes == 0 {
            return Err(anyhow!("prompt_output_limit_bytes must be > 0"));
        }
        if self.environment.kind == EnvironmentKind::Docker {
            if self.environment.image.trim().is_empty() {
                return Err(anyhow!("environment.image is required for docker"));
            }
            if self.environment.container_name.trim().is_empty() {
                return Err(anyhow!("environment.container_name must not be empty"));
            }
            if !self.environment.container_workdir.starts_with('/') {
                return Err(anyhow!("environment.container_workdir must be absolute"));
            }
        }
        match self.oracle.kind {
            OracleKind::Command => {
                if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
                    return Err(anyhow!("oracle.command must be a non-empty array"));
                }
            }
            OracleKind::Http => {
                if self.oracle.base_url.trim().is_empty() {
                    return Err(anyhow!("oracle.base_url is required for http"));
                }
                if self.oracle.model.trim().is_empty() {
                    return Err(anyhow!("oracle.model is required for http"));
                }
            }
        }
        if let Some(temperature) = self.oracle.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow!("oracle.temperature must be within 0.0..=2.0"));
            }
        }
        Ok(())
    }

    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.wall_clock_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = EngineConfig::default();
        cfg.checkpoint = CheckpointPolicy::EveryTask;
        cfg.backtrack = BacktrackPolicy::Ancestor;
        cfg.oracle.temperature = Some(0.5);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "max_attempts = 3\ncheckpoint = \"never\"\n\n[oracle]\nkind = \"http\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.checkpoint, CheckpointPolicy::Never);
        assert_eq!(cfg.oracle.kind, OracleKind::Http);
        assert_eq!(cfg.oracle.model, OracleConfig::default().model);
        assert_eq!(cfg.wall_clock_secs, 1800);
    }

    #[test]
    fn docker_requires_image() {
        let mut cfg = EngineConfig::default();
        cfg.environment.kind = EnvironmentKind::Docker;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("environment.image"));
        cfg.environment.image = "ubuntu:24.04".to_string();
        cfg.validate().expect("valid");
    }

    #[test]
    fn zero_ceilings_are_rejected() {
        let cfg = EngineConfig {
            max_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = EngineConfig {
            wall_clock_secs: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
