//! Checkpointable execution environments.
//!
//! The [`Environment`] trait is the only way the engine touches the mutable
//! world: it runs commands, writes files, and takes or restores snapshots.
//! An environment is owned by one task run at a time (`&mut self`).

pub mod docker;
pub mod local;

use std::path::{Component, Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::types::FileContent;
use crate::io::process::{CommandOutput, Interrupted, RunLimits};

pub use docker::DockerContainer;
pub use local::GitWorkspace;

/// Output of a command run inside an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub interrupted: Option<Interrupted>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.interrupted.is_none() && self.exit_code == Some(0)
    }
}

impl From<CommandOutput> for ExecOutput {
    fn from(output: CommandOutput) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            interrupted: output.interrupted,
        }
    }
}

pub trait Environment {
    /// Human-readable location, for logs and prompts.
    fn workdir_label(&self) -> String;

    /// Run `command` through `sh -c` in the working directory.
    fn run_shell(&mut self, command: &str, limits: &RunLimits) -> Result<ExecOutput>;

    /// Run `program` with `args` directly, without a shell.
    fn run_program(&mut self, program: &str, args: &[String], limits: &RunLimits)
    -> Result<ExecOutput>;

    /// Write complete file contents, creating parent directories.
    ///
    /// Paths are relative to the working directory and must stay inside it.
    fn write_files(&mut self, files: &[FileContent]) -> Result<()>;

    /// Capture the current state. Returns the new snapshot id only once the
    /// snapshot is fully usable.
    fn checkpoint(&mut self, parent: Option<&str>) -> Result<String>;

    /// Make the environment equivalent to `snapshot_id`. The snapshot itself
    /// is left untouched and can be restored again.
    fn restore(&mut self, snapshot_id: &str) -> Result<()>;
}

/// Environment selected by configuration.
#[derive(Debug)]
pub enum AnyEnvironment {
    Local(GitWorkspace),
    Docker(DockerContainer),
}

impl Environment for AnyEnvironment {
    fn workdir_label(&self) -> String {
        match self {
            AnyEnvironment::Local(env) => env.workdir_label(),
            AnyEnvironment::Docker(env) => env.workdir_label(),
        }
    }

    fn run_shell(&mut self, command: &str, limits: &RunLimits) -> Result<ExecOutput> {
        match self {
            AnyEnvironment::Local(env) => env.run_shell(command, limits),
            AnyEnvironment::Docker(env) => env.run_shell(command, limits),
        }
    }

    fn run_program(
        &mut self,
        program: &str,
        args: &[String],
        limits: &RunLimits,
    ) -> Result<ExecOutput> {
        match self {
            AnyEnvironment::Local(env) => env.run_program(program, args, limits),
            AnyEnvironment::Docker(env) => env.run_program(program, args, limits),
        }
    }

    fn write_files(&mut self, files: &[FileContent]) -> Result<()> {
        match self {
            AnyEnvironment::Local(env) => env.write_files(files),
            AnyEnvironment::Docker(env) => env.write_files(files),
        }
    }

    fn checkpoint(&mut self, parent: Option<&str>) -> Result<String> {
        match self {
            AnyEnvironment::Local(env) => env.checkpoint(parent),
            AnyEnvironment::Docker(env) => env.checkpoint(parent),
        }
    }

    fn restore(&mut self, snapshot_id: &str) -> Result<()> {
        match self {
            AnyEnvironment::Local(env) => env.restore(snapshot_id),
            AnyEnvironment::Docker(env) => env.restore(snapshot_id),
        }
    }
}

/// Validate a file path proposed by the oracle.
///
/// Rejects empty, absolute, and parent-escaping paths; `.` components are
/// dropped.
pub fn checked_relative_path(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(anyhow!("file path '{raw}' escapes the working directory"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("file path '{raw}' must be relative"));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(anyhow!("file path '{raw}' is empty"));
    }
    Ok(clean)
}

/// Validate every path up front so a bad entry writes nothing.
pub fn checked_file_paths(files: &[FileContent]) -> Result<Vec<PathBuf>> {
    files
        .iter()
        .map(|file| checked_relative_path(&file.path))
        .collect()
}
