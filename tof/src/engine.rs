//! Orchestrator: drives one task node to a terminal status.
//!
//! The loop is a plain iterative state machine. Each round asks the
//! generator for an action, checkpoints if the action can mutate the
//! environment, dispatches it, and persists the attempt before the next
//! oracle call. Failures go through the backtrack selector; a hard
//! attempt/wall-clock ceiling bounds the whole run.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::{Ceiling, CeilingBreach};
use crate::core::cancel::CancelToken;
use crate::core::selector::{
    BacktrackContext, BacktrackDecision, BacktrackPolicy, BacktrackSelector, selector_for,
};
use crate::core::task::{AttemptResult, NewTask, TaskNode};
use crate::core::types::{AttemptError, CheckpointPolicy, ErrorKind, TaskStatus};
use crate::error::EngineError;
use crate::io::config::EngineConfig;
use crate::io::environment::Environment;
use crate::io::executor::{ActionExecutor, Dispatch, oracle_error};
use crate::io::oracle::{ActionGenerator, OracleCall, Proposal};
use crate::io::store::TaskStore;
use crate::snapshot::SnapshotManager;

/// Knobs the orchestrator reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_attempts: u32,
    pub wall_clock: Duration,
    pub action_timeout: Duration,
    pub oracle_timeout: Duration,
    pub output_limit_bytes: usize,
    pub checkpoint: CheckpointPolicy,
    pub backtrack: BacktrackPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            wall_clock: cfg.wall_clock(),
            action_timeout: cfg.action_timeout(),
            oracle_timeout: cfg.oracle_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            checkpoint: cfg.checkpoint,
            backtrack: cfg.backtrack,
        }
    }
}

/// Why a run ended with the node `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The last attempt failed with fatal severity.
    Fatal(AttemptError),
    /// The selector gave up on the node.
    GaveUp(String),
    CeilingExceeded(CeilingBreach),
    /// A snapshot could not be restored while backtracking.
    Snapshot(String),
}

impl FailureReason {
    pub fn describe(&self) -> String {
        match self {
            FailureReason::Fatal(error) => format!("fatal error: {error}"),
            FailureReason::GaveUp(reason) => reason.clone(),
            FailureReason::CeilingExceeded(breach) => breach.describe(),
            FailureReason::Snapshot(message) => format!("snapshot restore failed: {message}"),
        }
    }
}

/// Reason why `run` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// The node was already `success` or `failed`; nothing changed.
    AlreadyTerminal,
    Succeeded,
    Failed(FailureReason),
    /// The cancel token fired. The node is still `in_progress` and resumable.
    Cancelled,
    /// The node was given up and exploration moved to `ancestor_id`, whose
    /// snapshot is now restored. `error` is what the ancestor should hear
    /// about the abandoned subtree.
    Escalated {
        ancestor_id: String,
        error: AttemptError,
    },
}

/// Summary of one `run` call.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub task: TaskNode,
    pub stop: RunStop,
    /// Oracle rounds issued by this call.
    pub rounds: u32,
}

/// The orchestrator. Owns the environment and generator for the duration of
/// a run; borrows the store.
pub struct Engine<'a, E: Environment, G: ActionGenerator> {
    store: &'a TaskStore,
    env: E,
    generator: G,
    executor: ActionExecutor,
    selector: Box<dyn BacktrackSelector>,
    settings: EngineSettings,
    cancel: CancelToken,
}

impl<'a, E: Environment, G: ActionGenerator> Engine<'a, E, G> {
    pub fn new(store: &'a TaskStore, env: E, generator: G, settings: EngineSettings) -> Result<Self> {
        Ok(Self {
            store,
            env,
            generator,
            executor: ActionExecutor::new(settings.output_limit_bytes)?,
            selector: selector_for(settings.backtrack),
            settings,
            cancel: CancelToken::new(),
        })
    }

    /// Use `cancel` instead of a private token, so another thread can stop the run.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &'a TaskStore {
        self.store
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Create a pending child of `parent_id`.
    pub fn spawn_subtask(&self, parent_id: &str, description: &str, goal: &str) -> Result<TaskNode> {
        let parent = self.store.require(parent_id)?;
        if parent.is_terminal() {
            return Err(EngineError::TerminalTask {
                id: parent.id,
                status: parent.status,
            }
            .into());
        }
        self.store.create(NewTask {
            description: description.to_string(),
            goal: goal.to_string(),
            parent_id: Some(parent.id),
        })
    }

    /// Drive `task` to a terminal status (or until cancelled/escalated) and
    /// return the node as persisted.
    pub fn run(&mut self, task: TaskNode) -> Result<TaskNode> {
        Ok(self.run_with_outcome(task)?.task)
    }

    pub fn run_with_outcome(&mut self, task: TaskNode) -> Result<RunOutcome> {
        self.run_from(task, None)
    }

    /// Run `task` with `error` as the failure its first oracle round reacts
    /// to. Used to continue at an ancestor after a subtree was abandoned; the
    /// environment is expected to already hold the ancestor's snapshot.
    pub fn run_after_failure(&mut self, task: TaskNode, error: AttemptError) -> Result<RunOutcome> {
        self.run_from(task, Some(error))
    }

    #[instrument(skip_all, fields(task_id = %task.id, seeded = seeded_error.is_some()))]
    fn run_from(&mut self, task: TaskNode, seeded_error: Option<AttemptError>) -> Result<RunOutcome> {
        if task.is_terminal() {
            return Ok(outcome(task, RunStop::AlreadyTerminal, 0));
        }
        let mut task = self.store.require(&task.id)?;
        if task.is_terminal() {
            return Ok(outcome(task, RunStop::AlreadyTerminal, 0));
        }

        let ceiling = Ceiling::start(self.settings.max_attempts, self.settings.wall_clock);
        if task.status != TaskStatus::InProgress {
            self.set_status(&mut task, TaskStatus::InProgress)?;
        }
        info!(attempts = task.attempts.len(), "run started");

        let prior_attempts = task.attempt_count();
        let mut rounds = 0u32;
        let mut checkpointed = false;
        let mut pending_error = seeded_error.clone().or_else(|| task.last_error().cloned());
        if seeded_error.is_none() && pending_error.is_some() {
            if let Some(snapshot_id) = task.environment_snapshot_id.clone() {
                if let Err(err) = SnapshotManager::new(self.store).restore(&mut self.env, &snapshot_id) {
                    return self.fail(task, FailureReason::Snapshot(format!("{err:#}")), rounds);
                }
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                info!("run cancelled");
                return Ok(outcome(task, RunStop::Cancelled, rounds));
            }
            if let Some(breach) = ceiling.check(prior_attempts.saturating_add(rounds)) {
                warn!(breach = %breach.describe(), "ceiling reached");
                return self.fail(task, FailureReason::CeilingExceeded(breach), rounds);
            }

            let call = self.oracle_call(&ceiling);
            rounds += 1;
            debug!(round = rounds, retrying = pending_error.is_some(), "asking oracle");
            let proposal = match &pending_error {
                Some(error) => self.generator.next_action_after_failure(&task, error, &call),
                None => self.generator.next_action(&task, &call),
            };
            let proposal = match proposal {
                Ok(proposal) => proposal,
                Err(err) => {
                    if self.interrupted(&err) {
                        return Ok(outcome(task, RunStop::Cancelled, rounds));
                    }
                    let error = oracle_error(&err);
                    warn!(code = %error.code, message = %error.message, "oracle round failed");
                    pending_error = Some(error);
                    continue;
                }
            };

            if self.wants_checkpoint(&proposal, checkpointed) {
                match SnapshotManager::new(self.store).checkpoint(&mut self.env, &task) {
                    Ok(snapshot_id) => {
                        task.environment_snapshot_id = Some(snapshot_id);
                        self.store.update(&mut task)?;
                        checkpointed = true;
                    }
                    Err(err) => {
                        let error = AttemptError::new(ErrorKind::SnapshotError, format!("{err:#}"));
                        let attempt = AttemptResult::failure(proposal.action, error.clone(), None);
                        self.record_attempt(&mut task, attempt)?;
                        return self.fail(task, FailureReason::Fatal(error), rounds);
                    }
                }
            }

            let dispatch = Dispatch {
                timeout: ceiling.call_timeout(self.settings.action_timeout),
                cancel: self.cancel.clone(),
            };
            let attempt = self.executor.execute(
                &mut self.env,
                &mut self.generator,
                &proposal.action,
                &proposal.files,
                &dispatch,
            );
            let error = attempt.error.clone();
            self.record_attempt(&mut task, attempt)?;
            if self.cancel.is_cancelled() {
                info!("run cancelled after attempt");
                return Ok(outcome(task, RunStop::Cancelled, rounds));
            }

            let Some(error) = error else {
                let call = self.oracle_call(&ceiling);
                match self.generator.continuation_summary(&task, &call) {
                    Ok(continuation) => {
                        task.continuation_summary = Some(continuation.summary);
                        if continuation.goal_complete {
                            self.set_status(&mut task, TaskStatus::Success)?;
                            info!(attempts = task.attempts.len(), "task succeeded");
                            return Ok(outcome(task, RunStop::Succeeded, rounds));
                        }
                        self.store.update(&mut task)?;
                    }
                    Err(err) => {
                        if self.interrupted(&err) {
                            return Ok(outcome(task, RunStop::Cancelled, rounds));
                        }
                        warn!(err = %format!("{err:#}"), "continuation summary unavailable");
                    }
                }
                pending_error = None;
                continue;
            };

            if error.is_fatal() {
                return self.fail(task, FailureReason::Fatal(error), rounds);
            }

            let ancestors = self.store.ancestors(&task.id)?;
            let decision = self.selector.select(&BacktrackContext {
                node: &task,
                error: &error,
                ancestors: &ancestors,
                max_attempts: self.settings.max_attempts,
            });
            debug!(?decision, "backtrack decision");
            match decision {
                BacktrackDecision::Retry { snapshot_id } => {
                    if let Some(snapshot_id) = snapshot_id {
                        if let Err(err) =
                            SnapshotManager::new(self.store).restore(&mut self.env, &snapshot_id)
                        {
                            return self.fail(task, FailureReason::Snapshot(format!("{err:#}")), rounds);
                        }
                    }
                    pending_error = Some(error);
                }
                BacktrackDecision::Escalate {
                    ancestor_id,
                    snapshot_id,
                } => {
                    if let Err(err) = SnapshotManager::new(self.store).restore(&mut self.env, &snapshot_id) {
                        return self.fail(task, FailureReason::Snapshot(format!("{err:#}")), rounds);
                    }
                    self.set_status(&mut task, TaskStatus::Failed)?;
                    info!(ancestor_id = %ancestor_id, snapshot_id = %snapshot_id, "escalated to ancestor");
                    let error = AttemptError {
                        message: format!(
                            "subtask {} ('{}') abandoned after {} attempts: {}",
                            task.id,
                            task.description,
                            task.attempts.len(),
                            error.message
                        ),
                        ..error
                    };
                    return Ok(outcome(task, RunStop::Escalated { ancestor_id, error }, rounds));
                }
                BacktrackDecision::GiveUp { reason } => {
                    return self.fail(task, FailureReason::GaveUp(reason), rounds);
                }
            }
        }
    }

    fn oracle_call(&self, ceiling: &Ceiling) -> OracleCall {
        OracleCall {
            timeout: ceiling.call_timeout(self.settings.oracle_timeout),
            cancel: self.cancel.clone(),
        }
    }

    fn wants_checkpoint(&self, proposal: &Proposal, checkpointed: bool) -> bool {
        let mutating = proposal.action.kind.is_state_mutating() || !proposal.files.is_empty();
        match self.settings.checkpoint {
            CheckpointPolicy::EveryAction => mutating,
            CheckpointPolicy::EveryTask => mutating && !checkpointed,
            CheckpointPolicy::Never => false,
        }
    }

    fn interrupted(&self, err: &anyhow::Error) -> bool {
        self.cancel.is_cancelled()
            || matches!(err.downcast_ref::<EngineError>(), Some(EngineError::Cancelled))
    }

    /// Persist first, then mirror into the in-memory node.
    fn record_attempt(&self, task: &mut TaskNode, attempt: AttemptResult) -> Result<()> {
        task.updated_at = self.store.append_attempt(&task.id, &attempt)?;
        debug!(
            attempt = task.attempts.len() + 1,
            action_type = %attempt.action.action_type(),
            status = attempt.status.as_str(),
            "attempt recorded"
        );
        task.attempts.push(attempt);
        Ok(())
    }

    /// Apply a status transition and persist it.
    fn set_status(&self, task: &mut TaskNode, to: TaskStatus) -> Result<()> {
        task.transition(to).map_err(|reasons| EngineError::InvalidUpdate {
            id: task.id.clone(),
            reasons,
        })?;
        self.store.update(task)
    }

    fn fail(&self, mut task: TaskNode, reason: FailureReason, rounds: u32) -> Result<RunOutcome> {
        self.set_status(&mut task, TaskStatus::Failed)?;
        warn!(reason = %reason.describe(), attempts = task.attempts.len(), "task failed");
        Ok(outcome(task, RunStop::Failed(reason), rounds))
    }
}

fn outcome(task: TaskNode, stop: RunStop, rounds: u32) -> RunOutcome {
    RunOutcome { task, stop, rounds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::ActionType;
    use crate::core::types::{AttemptStatus, Severity};
    use crate::test_support::{FakeEnvironment, ScriptedGenerator, Step, custom, shell};

    fn settings() -> EngineSettings {
        EngineSettings {
            max_attempts: 4,
            ..EngineSettings::default()
        }
    }

    #[test]
    fn terminal_task_is_returned_unchanged() {
        let store = TaskStore::open_in_memory().expect("store");
        let mut task = store.create(NewTask::root("done already")).expect("task");
        task.transition(TaskStatus::InProgress).expect("start");
        store.update(&mut task).expect("update");
        task.transition(TaskStatus::Success).expect("finish");
        store.update(&mut task).expect("update");

        let mut engine = Engine::new(
            &store,
            FakeEnvironment::default(),
            ScriptedGenerator::default(),
            settings(),
        )
        .expect("engine");
        let result = engine.run_with_outcome(task.clone()).expect("run");
        assert_eq!(result.stop, RunStop::AlreadyTerminal);
        assert_eq!(result.task, task);
        assert_eq!(engine.generator().calls(), 0);
    }

    #[test]
    fn success_on_first_attempt_with_goal_complete() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("say hi")).expect("task");
        let generator = ScriptedGenerator::new(vec![
            Step::Propose(shell("echo hi")),
            Step::Continue {
                summary: "said hi".to_string(),
                goal_complete: true,
            },
        ]);
        let mut engine =
            Engine::new(&store, FakeEnvironment::default(), generator, settings()).expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        assert_eq!(result.stop, RunStop::Succeeded);
        assert_eq!(result.task.status, TaskStatus::Success);
        assert_eq!(result.task.continuation_summary.as_deref(), Some("said hi"));
        assert_eq!(result.task.attempts.len(), 1);
        assert_eq!(engine.env().checkpoints(), 1);
    }

    #[test]
    fn unfinished_goal_loops_to_next_action() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("two steps")).expect("task");
        let generator = ScriptedGenerator::new(vec![
            Step::Propose(shell("step one")),
            Step::Continue {
                summary: "now step two".to_string(),
                goal_complete: false,
            },
            Step::Propose(shell("step two")),
            Step::Continue {
                summary: "all done".to_string(),
                goal_complete: true,
            },
        ]);
        let mut engine =
            Engine::new(&store, FakeEnvironment::default(), generator, settings()).expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        assert_eq!(result.stop, RunStop::Succeeded);
        assert_eq!(result.task.attempts.len(), 2);
        assert_eq!(engine.generator().after_failure_calls(), 0);
    }

    #[test]
    fn fatal_failure_stops_without_more_oracle_calls() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("magic")).expect("task");
        let generator = ScriptedGenerator::new(vec![Step::Propose(custom())]);
        let mut engine =
            Engine::new(&store, FakeEnvironment::default(), generator, settings()).expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        let RunStop::Failed(FailureReason::Fatal(error)) = &result.stop else {
            panic!("expected fatal failure, got {:?}", result.stop);
        };
        assert_eq!(error.code, ErrorKind::UnsupportedAction);
        assert_eq!(result.task.status, TaskStatus::Failed);
        assert_eq!(result.task.attempts.len(), 1);
        assert_eq!(result.task.attempts[0].action.action_type(), ActionType::Custom);
        assert_eq!(engine.generator().calls(), 1);
        assert_eq!(engine.env().checkpoints(), 0);
    }

    #[test]
    fn every_failure_hits_the_ceiling() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("never works")).expect("task");
        let steps = (0..10).map(|_| Step::Propose(shell("exit 1"))).collect();
        let mut env = FakeEnvironment::default();
        env.fail_commands_matching("exit 1");
        let mut engine = Engine::new(&store, env, ScriptedGenerator::new(steps), settings())
            .expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        assert!(matches!(result.stop, RunStop::Failed(_)));
        assert_eq!(result.task.status, TaskStatus::Failed);
        assert_eq!(result.task.attempts.len(), 4);
        assert!(
            result
                .task
                .attempts
                .iter()
                .all(|attempt| attempt.status == AttemptStatus::Failure)
        );
        assert_eq!(engine.env().restores(), 3);
    }

    #[test]
    fn invalid_oracle_responses_count_toward_the_ceiling() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("confused oracle")).expect("task");
        let steps = (0..10).map(|_| Step::Invalid("no json here".to_string())).collect();
        let mut engine = Engine::new(
            &store,
            FakeEnvironment::default(),
            ScriptedGenerator::new(steps),
            settings(),
        )
        .expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        assert!(matches!(
            result.stop,
            RunStop::Failed(FailureReason::CeilingExceeded(CeilingBreach::Attempts { used: 4, max: 4 }))
        ));
        assert!(result.task.attempts.is_empty());
        assert_eq!(result.rounds, 4);
        assert_eq!(engine.generator().after_failure_calls(), 3);
        let stored = store.require(&result.task.id).expect("stored");
        assert!(stored.attempts.is_empty());
        assert_eq!(stored.status, TaskStatus::Failed);
    }

    #[test]
    fn cancellation_before_first_call_leaves_node_in_progress() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("cancelled")).expect("task");
        let mut engine = Engine::new(
            &store,
            FakeEnvironment::default(),
            ScriptedGenerator::new(vec![Step::Propose(shell("true"))]),
            settings(),
        )
        .expect("engine");
        engine.cancel_token().cancel();
        let result = engine.run_with_outcome(task).expect("run");
        assert_eq!(result.stop, RunStop::Cancelled);
        assert_eq!(result.task.status, TaskStatus::InProgress);
        assert_eq!(engine.generator().calls(), 0);
        let stored = store.require(&result.task.id).expect("stored");
        assert_eq!(stored.status, TaskStatus::InProgress);
    }

    #[test]
    fn cancellation_after_attempt_returns_the_stored_node() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("interrupted")).expect("task");
        let cancel = CancelToken::new();
        let mut env = FakeEnvironment::default();
        env.cancel_during_commands_matching("make", cancel.clone());
        let mut engine = Engine::new(
            &store,
            env,
            ScriptedGenerator::new(vec![Step::Propose(shell("make install"))]),
            settings(),
        )
        .expect("engine")
        .with_cancel(cancel);

        let result = engine.run_with_outcome(task).expect("run");
        assert_eq!(result.stop, RunStop::Cancelled);
        assert_eq!(result.task.attempts.len(), 1);
        let stored = store.require(&result.task.id).expect("stored");
        assert_eq!(stored.updated_at, result.task.updated_at);
        assert_eq!(stored, result.task);
    }

    #[test]
    fn checkpoint_failure_records_snapshot_error_without_dispatch() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("unprotected")).expect("task");
        let mut env = FakeEnvironment::default();
        env.fail_checkpoints(true);
        let mut engine = Engine::new(
            &store,
            env,
            ScriptedGenerator::new(vec![Step::Propose(shell("rm -rf build"))]),
            settings(),
        )
        .expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        assert_eq!(result.task.status, TaskStatus::Failed);
        let error = result.task.attempts[0].error.as_ref().expect("error");
        assert_eq!(error.code, ErrorKind::SnapshotError);
        assert_eq!(error.severity, Severity::Fatal);
        assert!(engine.env().commands().is_empty());
    }

    #[test]
    fn never_policy_retries_without_restore() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("no snapshots")).expect("task");
        let mut env = FakeEnvironment::default();
        env.fail_commands_matching("broken");
        let generator = ScriptedGenerator::new(vec![
            Step::Propose(shell("broken")),
            Step::Propose(shell("fixed")),
            Step::Continue {
                summary: "ok".to_string(),
                goal_complete: true,
            },
        ]);
        let settings = EngineSettings {
            checkpoint: CheckpointPolicy::Never,
            ..settings()
        };
        let mut engine = Engine::new(&store, env, generator, settings).expect("engine");
        let result = engine.run_with_outcome(task).expect("run");
        assert_eq!(result.stop, RunStop::Succeeded);
        assert_eq!(engine.env().checkpoints(), 0);
        assert_eq!(engine.env().restores(), 0);
        assert!(result.task.environment_snapshot_id.is_none());
    }

    #[test]
    fn every_task_policy_checkpoints_once_per_run() {
        let store = TaskStore::open_in_memory().expect("store");
        let task = store.create(NewTask::root("one snapshot")).expect("task");
        let generator = ScriptedGenerator::new(vec![
            Step::Propose(shell("a")),
            Step::Continue {
                summary: "next b".to_string(),
                goal_complete: false,
            },
            Step::Propose(shell("b")),
            Step::Continue {
                summary: "done".to_string(),
                goal_complete: true,
            },
        ]);
        let settings = EngineSettings {
            checkpoint: CheckpointPolicy::EveryTask,
            ..settings()
        };
        let mut engine =
            Engine::new(&store, FakeEnvironment::default(), generator, settings).expect("engine");
        engine.run_with_outcome(task).expect("run");
        assert_eq!(engine.env().checkpoints(), 1);
    }

    #[test]
    fn spawn_subtask_links_parent() {
        let store = TaskStore::open_in_memory().expect("store");
        let root = store.create(NewTask::root("root")).expect("root");
        let engine = Engine::new(
            &store,
            FakeEnvironment::default(),
            ScriptedGenerator::default(),
            settings(),
        )
        .expect("engine");
        let child = engine
            .spawn_subtask(&root.id, "child step", "child goal")
            .expect("child");
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(store.children(&root.id).expect("children"), vec![child]);
    }
}
