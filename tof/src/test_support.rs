//! Test-only doubles: a scripted oracle, an in-memory environment, and
//! builders for actions and workspaces.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::core::action::{Action, ActionKind, CompletionOptions, Message, ShellParams};
use crate::core::cancel::CancelToken;
use crate::core::task::TaskNode;
use crate::core::types::{AttemptError, FileContent};
use crate::error::EngineError;
use crate::io::environment::{Environment, ExecOutput, checked_file_paths};
use crate::io::init::{InitOptions, TofPaths, init_workspace};
use crate::io::oracle::{ActionGenerator, Continuation, OracleCall, Proposal};
use crate::io::process::{Interrupted, RunLimits};

/// Shell action whose description is the command itself.
pub fn shell(command: &str) -> Action {
    Action::new(
        command,
        ActionKind::Shell(ShellParams {
            command: command.to_string(),
        }),
    )
}

/// Action with no execution strategy.
pub fn custom() -> Action {
    Action::new("custom step", ActionKind::Custom(serde_json::json!({"op": "magic"})))
}

/// One scripted oracle reply.
#[derive(Debug, Clone)]
pub enum Step {
    Propose(Action),
    ProposeWithFiles(Action, Vec<FileContent>),
    /// Reply that could not be parsed into an action.
    Invalid(String),
    /// Transport failure.
    Unavailable(String),
    Continue { summary: String, goal_complete: bool },
}

/// [`ActionGenerator`] that replays a fixed script.
///
/// Proposal calls and continuation calls share one queue; a step of the
/// wrong kind is reported as an invalid oracle response. An exhausted
/// script answers with `OracleUnavailable`.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    steps: VecDeque<Step>,
    completion: Option<String>,
    calls: usize,
    after_failure_calls: usize,
    seen_errors: Vec<AttemptError>,
    seen_attempt_counts: Vec<usize>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            ..Self::default()
        }
    }

    /// Reply for `reasoning-call` completions.
    pub fn with_completion(mut self, text: &str) -> Self {
        self.completion = Some(text.to_string());
        self
    }

    /// Proposal and continuation calls made so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn after_failure_calls(&self) -> usize {
        self.after_failure_calls
    }

    /// Errors passed to `next_action_after_failure`, in order.
    pub fn seen_errors(&self) -> &[AttemptError] {
        &self.seen_errors
    }

    /// Attempt history length the oracle saw on each call.
    pub fn seen_attempt_counts(&self) -> &[usize] {
        &self.seen_attempt_counts
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    fn next_step(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Step> {
        if call.cancel.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        self.calls += 1;
        self.seen_attempt_counts.push(task.attempts.len());
        self.steps
            .pop_front()
            .ok_or_else(|| EngineError::OracleUnavailable("script exhausted".to_string()).into())
    }

    fn proposal(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Proposal> {
        match self.next_step(task, call)? {
            Step::Propose(action) => Ok(Proposal {
                action,
                files: Vec::new(),
            }),
            Step::ProposeWithFiles(action, files) => Ok(Proposal { action, files }),
            Step::Invalid(text) => Err(EngineError::InvalidOracleResponse(text).into()),
            Step::Unavailable(text) => Err(EngineError::OracleUnavailable(text).into()),
            Step::Continue { .. } => Err(EngineError::InvalidOracleResponse(
                "script has a continuation where a proposal was expected".to_string(),
            )
            .into()),
        }
    }
}

impl ActionGenerator for ScriptedGenerator {
    fn next_action(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Proposal> {
        self.proposal(task, call)
    }

    fn next_action_after_failure(
        &mut self,
        task: &TaskNode,
        error: &AttemptError,
        call: &OracleCall,
    ) -> Result<Proposal> {
        self.after_failure_calls += 1;
        self.seen_errors.push(error.clone());
        self.proposal(task, call)
    }

    fn continuation_summary(&mut self, task: &TaskNode, call: &OracleCall) -> Result<Continuation> {
        match self.next_step(task, call)? {
            Step::Continue {
                summary,
                goal_complete,
            } => Ok(Continuation {
                summary,
                goal_complete,
            }),
            Step::Unavailable(text) => Err(EngineError::OracleUnavailable(text).into()),
            _ => Err(EngineError::InvalidOracleResponse(
                "script has a proposal where a continuation was expected".to_string(),
            )
            .into()),
        }
    }

    fn complete(
        &mut self,
        _messages: &[Message],
        _options: &CompletionOptions,
        _call: &OracleCall,
    ) -> Result<String> {
        self.completion
            .clone()
            .ok_or_else(|| EngineError::OracleUnavailable("no completion scripted".to_string()).into())
    }
}

/// In-memory environment with whole-state snapshots.
///
/// Commands are recorded and succeed unless they contain a registered
/// failure pattern. `touch <path>` and `rm <path>` edit the fake file tree so
/// tests can observe rollbacks.
#[derive(Debug, Default)]
pub struct FakeEnvironment {
    files: BTreeMap<String, String>,
    snapshots: HashMap<String, BTreeMap<String, String>>,
    commands: Vec<String>,
    failing: Vec<String>,
    timing_out: Vec<String>,
    cancelling: Vec<(String, CancelToken)>,
    fail_checkpoints: bool,
    fail_restores: bool,
    checkpoints: usize,
    restores: usize,
}

impl FakeEnvironment {
    pub fn write(&mut self, path: &str, content: &str) {
        self.files.insert(path.to_string(), content.to_string());
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Commands containing `pattern` exit with status 1.
    pub fn fail_commands_matching(&mut self, pattern: &str) {
        self.failing.push(pattern.to_string());
    }

    /// Commands containing `pattern` report a timeout.
    pub fn time_out_commands_matching(&mut self, pattern: &str) {
        self.timing_out.push(pattern.to_string());
    }

    /// Commands containing `pattern` fire `cancel` while they run, then
    /// complete normally.
    pub fn cancel_during_commands_matching(&mut self, pattern: &str, cancel: CancelToken) {
        self.cancelling.push((pattern.to_string(), cancel));
    }

    pub fn fail_checkpoints(&mut self, fail: bool) {
        self.fail_checkpoints = fail;
    }

    pub fn fail_restores(&mut self, fail: bool) {
        self.fail_restores = fail;
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn checkpoints(&self) -> usize {
        self.checkpoints
    }

    pub fn restores(&self) -> usize {
        self.restores
    }

    fn run(&mut self, command: String, limits: &RunLimits) -> ExecOutput {
        self.commands.push(command.clone());
        if limits.cancel.is_cancelled() {
            return ExecOutput {
                exit_code: None,
                interrupted: Some(Interrupted::Cancelled),
                ..ExecOutput::default()
            };
        }
        if self.timing_out.iter().any(|pattern| command.contains(pattern)) {
            return ExecOutput {
                exit_code: None,
                interrupted: Some(Interrupted::TimedOut),
                ..ExecOutput::default()
            };
        }
        for (pattern, cancel) in &self.cancelling {
            if command.contains(pattern.as_str()) {
                cancel.cancel();
            }
        }
        if self.failing.iter().any(|pattern| command.contains(pattern)) {
            return ExecOutput {
                exit_code: Some(1),
                stderr: format!("{command}: failed\n"),
                ..ExecOutput::default()
            };
        }
        if let Some(path) = command.strip_prefix("touch ") {
            self.files.insert(path.trim().to_string(), String::new());
        } else if let Some(path) = command.strip_prefix("rm ") {
            self.files.remove(path.trim());
        }
        ExecOutput {
            exit_code: Some(0),
            stdout: format!("{command}: ok\n"),
            ..ExecOutput::default()
        }
    }
}

impl Environment for FakeEnvironment {
    fn workdir_label(&self) -> String {
        "fake://workspace".to_string()
    }

    fn run_shell(&mut self, command: &str, limits: &RunLimits) -> Result<ExecOutput> {
        Ok(self.run(command.to_string(), limits))
    }

    fn run_program(&mut self, program: &str, args: &[String], limits: &RunLimits) -> Result<ExecOutput> {
        let mut command = program.to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        Ok(self.run(command, limits))
    }

    fn write_files(&mut self, files: &[FileContent]) -> Result<()> {
        let paths = checked_file_paths(files)?;
        for (file, path) in files.iter().zip(paths) {
            self.files
                .insert(path.to_string_lossy().into_owned(), file.content.clone());
        }
        Ok(())
    }

    fn checkpoint(&mut self, _parent: Option<&str>) -> Result<String> {
        if self.fail_checkpoints {
            return Err(anyhow!("checkpoint refused by fake environment"));
        }
        self.checkpoints += 1;
        let id = format!("snap-{}", uuid::Uuid::new_v4());
        self.snapshots.insert(id.clone(), self.files.clone());
        Ok(id)
    }

    fn restore(&mut self, snapshot_id: &str) -> Result<()> {
        if self.fail_restores {
            return Err(anyhow!("restore refused by fake environment"));
        }
        let files = self
            .snapshots
            .get(snapshot_id)
            .ok_or_else(|| anyhow!("unknown snapshot '{snapshot_id}'"))?;
        self.files = files.clone();
        self.restores += 1;
        Ok(())
    }
}

/// Initialized workspace in a temporary directory.
#[derive(Debug)]
pub struct TestWorkspace {
    _temp: tempfile::TempDir,
    paths: TofPaths,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = init_workspace(temp.path(), &InitOptions::default())?;
        Ok(Self { _temp: temp, paths })
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn paths(&self) -> &TofPaths {
        &self.paths
    }
}
