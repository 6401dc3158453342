//! Workspace wiring: configuration to store, environment and oracle, plus
//! the operations behind each CLI command.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::core::action::CompletionOptions;
use crate::core::cancel::CancelToken;
use crate::core::task::{NewTask, TaskNode};
use crate::engine::{Engine, EngineSettings, RunOutcome, RunStop};
use crate::error::EngineError;
use crate::io::config::{EngineConfig, EnvironmentKind, OracleKind, load_config};
use crate::io::environment::{AnyEnvironment, DockerContainer, Environment, GitWorkspace};
use crate::io::init::{InitOptions, TofPaths, init_workspace};
use crate::io::oracle::{
    ActionGenerator, AnyCompletion, CommandCompletion, HttpCompletion, OracleGenerator,
};
use crate::io::store::TaskStore;
use crate::snapshot::SnapshotManager;

/// Engine type used by the CLI.
pub type WorkspaceEngine<'a> = Engine<'a, AnyEnvironment, OracleGenerator<AnyCompletion>>;

/// An initialized `.tof/` workspace with its store open.
#[derive(Debug)]
pub struct Workspace {
    paths: TofPaths,
    config: EngineConfig,
    store: TaskStore,
}

impl Workspace {
    /// Create the `.tof/` scaffolding under `root`.
    pub fn init(root: &Path, options: &InitOptions) -> Result<TofPaths> {
        init_workspace(root, options)
    }

    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn open(root: &Path) -> Result<Self> {
        let paths = TofPaths::new(root);
        paths.ensure_initialized()?;
        let config = load_config(&paths.config_path)?;
        let store = TaskStore::open(&paths.db_path)?;
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    pub fn paths(&self) -> &TofPaths {
        &self.paths
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    /// Open the configured execution environment.
    pub fn environment(&self) -> Result<AnyEnvironment> {
        let env = &self.config.environment;
        match env.kind {
            EnvironmentKind::Local => {
                let workdir = self.paths.root.join(&env.workdir);
                Ok(AnyEnvironment::Local(GitWorkspace::open(
                    &workdir,
                    &self.paths.snapshots_git_dir,
                )?))
            }
            EnvironmentKind::Docker => Ok(AnyEnvironment::Docker(DockerContainer::open(
                &env.container_name,
                &env.image,
                &env.container_workdir,
            )?)),
        }
    }

    /// Build the configured completion provider.
    pub fn completion(&self) -> Result<AnyCompletion> {
        let oracle = &self.config.oracle;
        match oracle.kind {
            OracleKind::Command => Ok(AnyCompletion::Command(CommandCompletion::new(
                oracle.command.clone(),
            )?)),
            OracleKind::Http => Ok(AnyCompletion::Http(HttpCompletion::from_env(
                &oracle.base_url,
                &oracle.api_key_env,
                self.completion_defaults(),
            )?)),
        }
    }

    fn completion_defaults(&self) -> CompletionOptions {
        let oracle = &self.config.oracle;
        CompletionOptions {
            model: (!oracle.model.trim().is_empty()).then(|| oracle.model.clone()),
            temperature: oracle.temperature,
            max_tokens: oracle.max_tokens,
        }
    }

    /// Engine over the configured environment and oracle.
    pub fn engine(&self, cancel: CancelToken) -> Result<WorkspaceEngine<'_>> {
        let env = self.environment()?;
        let generator = OracleGenerator::new(
            self.completion()?,
            self.completion_defaults(),
            self.config.prompt_output_limit_bytes,
            env.workdir_label(),
        );
        Ok(Engine::new(&self.store, env, generator, EngineSettings::from_config(&self.config))?
            .with_cancel(cancel))
    }

    /// Create a task (root, or child of `parent`) without running it.
    pub fn create_task(
        &self,
        description: &str,
        goal: Option<&str>,
        parent: Option<&str>,
    ) -> Result<TaskNode> {
        if description.trim().is_empty() {
            return Err(anyhow!("task description must not be empty"));
        }
        if let Some(parent_id) = parent {
            let parent = self.store.require(parent_id)?;
            if parent.is_terminal() {
                return Err(EngineError::TerminalTask {
                    id: parent.id,
                    status: parent.status,
                }
                .into());
            }
        }
        self.store.create(NewTask {
            description: description.to_string(),
            goal: goal.unwrap_or(description).to_string(),
            parent_id: parent.map(str::to_string),
        })
    }

    /// `prompt`: create a task and run the engine on it.
    pub fn prompt(
        &self,
        description: &str,
        goal: Option<&str>,
        parent: Option<&str>,
        cancel: CancelToken,
    ) -> Result<RunOutcome> {
        let task = self.create_task(description, goal, parent)?;
        info!(task_id = %task.id, "task created");
        let mut engine = self.engine(cancel)?;
        drive(&mut engine, task)
    }

    /// `resume`: reload a task from the store and run the engine on it.
    pub fn resume(&self, task_id: &str, cancel: CancelToken) -> Result<RunOutcome> {
        let task = self.store.require(task_id)?;
        let mut engine = self.engine(cancel)?;
        drive(&mut engine, task)
    }

    /// `rollback`: restore the environment to a stored snapshot of `task_id`
    /// without running the engine. Returns the restored snapshot id.
    pub fn rollback(&self, task_id: &str, snapshot_id: Option<&str>) -> Result<String> {
        let mut env = self.environment()?;
        rollback(&self.store, &mut env, task_id, snapshot_id)
    }
}

/// Run `task`, following escalations up the tree until a run ends for
/// another reason.
pub fn drive<E: Environment, G: ActionGenerator>(
    engine: &mut Engine<'_, E, G>,
    task: TaskNode,
) -> Result<RunOutcome> {
    let mut outcome = engine.run_with_outcome(task)?;
    while let RunStop::Escalated { ancestor_id, error } = &outcome.stop {
        info!(from = %outcome.task.id, to = %ancestor_id, "resuming at ancestor");
        let ancestor = engine.store().require(ancestor_id)?;
        let error = error.clone();
        outcome = engine.run_after_failure(ancestor, error)?;
    }
    Ok(outcome)
}

/// Restore `snapshot_id` (default: the task's latest snapshot) into `env`.
///
/// The snapshot must belong to the task or one of its ancestors.
pub fn rollback<E: Environment>(
    store: &TaskStore,
    env: &mut E,
    task_id: &str,
    snapshot_id: Option<&str>,
) -> Result<String> {
    let task = store.require(task_id)?;
    let target = match snapshot_id {
        Some(id) => id.to_string(),
        None => task
            .environment_snapshot_id
            .clone()
            .with_context(|| format!("task '{task_id}' has no snapshot to roll back to"))?,
    };
    let record = store.get_snapshot(&target)?.ok_or_else(|| EngineError::Snapshot {
        operation: "rollback",
        message: format!("unknown snapshot '{target}'"),
    })?;
    let mut owners = vec![task.id.clone()];
    owners.extend(store.ancestors(&task.id)?.into_iter().map(|ancestor| ancestor.id));
    if !owners.contains(&record.task_id) {
        return Err(anyhow!(
            "snapshot '{target}' belongs to task '{}', not '{task_id}' or its ancestors",
            record.task_id
        ));
    }
    SnapshotManager::new(store).restore(env, &target)?;
    info!(task_id = %task_id, snapshot_id = %target, "rolled back");
    Ok(target)
}
