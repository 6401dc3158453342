//! Snapshot manager: binds environment checkpoints to the task store.
//!
//! Every checkpoint is recorded with its parent snapshot so the chain mirrors
//! the task tree. A snapshot is only attached to a node after both the
//! environment and the store accepted it.

use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument};

use crate::core::task::TaskNode;
use crate::error::EngineError;
use crate::io::environment::Environment;
use crate::io::store::{SnapshotRecord, TaskStore};

#[derive(Debug, Clone, Copy)]
pub struct SnapshotManager<'a> {
    store: &'a TaskStore,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(store: &'a TaskStore) -> Self {
        Self { store }
    }

    /// Capture `env` on behalf of `task` and return the new snapshot id.
    ///
    /// The parent is the node's latest snapshot, else the nearest ancestor's.
    /// Failures are [`EngineError::Snapshot`]; `task` is never modified here.
    #[instrument(skip_all, fields(task_id = %task.id))]
    pub fn checkpoint<E: Environment>(&self, env: &mut E, task: &TaskNode) -> Result<String> {
        let parent_id = self.parent_for(task)?;
        let id = env
            .checkpoint(parent_id.as_deref())
            .map_err(|err| EngineError::snapshot("checkpoint", err))?;
        self.store
            .record_snapshot(&SnapshotRecord {
                id: id.clone(),
                parent_id,
                task_id: task.id.clone(),
                created_at: Utc::now(),
            })
            .map_err(|err| EngineError::snapshot("checkpoint", err))?;
        info!(snapshot_id = %id, "checkpoint taken");
        Ok(id)
    }

    /// Restore a recorded snapshot into `env`. Unknown ids are rejected
    /// before the environment is touched.
    #[instrument(skip_all, fields(snapshot_id = %snapshot_id))]
    pub fn restore<E: Environment>(&self, env: &mut E, snapshot_id: &str) -> Result<()> {
        let known = self
            .store
            .get_snapshot(snapshot_id)
            .map_err(|err| EngineError::snapshot("restore", err))?;
        if known.is_none() {
            return Err(EngineError::Snapshot {
                operation: "restore",
                message: format!("unknown snapshot '{snapshot_id}'"),
            }
            .into());
        }
        env.restore(snapshot_id)
            .map_err(|err| EngineError::snapshot("restore", err))?;
        info!("snapshot restored");
        Ok(())
    }

    /// `snapshot_id` followed by its ancestors, newest first.
    pub fn chain(&self, snapshot_id: &str) -> Result<Vec<SnapshotRecord>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(snapshot_id.to_string());
        while let Some(id) = next {
            if !seen.insert(id.clone()) {
                break;
            }
            let Some(record) = self.store.get_snapshot(&id)? else {
                break;
            };
            next = record.parent_id.clone();
            chain.push(record);
        }
        Ok(chain)
    }

    fn parent_for(&self, task: &TaskNode) -> Result<Option<String>> {
        if let Some(id) = &task.environment_snapshot_id {
            return Ok(Some(id.clone()));
        }
        if task.parent_id.is_none() {
            return Ok(None);
        }
        let ancestors = self.store.ancestors(&task.id)?;
        Ok(ancestors
            .into_iter()
            .find_map(|ancestor| ancestor.environment_snapshot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::NewTask;
    use crate::test_support::FakeEnvironment;

    #[test]
    fn checkpoints_chain_through_the_task_tree() {
        let store = TaskStore::open_in_memory().expect("store");
        let mut env = FakeEnvironment::default();
        let manager = SnapshotManager::new(&store);

        let mut root = store.create(NewTask::root("root")).expect("root");
        let first = manager.checkpoint(&mut env, &root).expect("checkpoint");
        root.environment_snapshot_id = Some(first.clone());
        store.update(&mut root).expect("update");

        let child = store
            .create(NewTask {
                description: "child".to_string(),
                goal: "child".to_string(),
                parent_id: Some(root.id.clone()),
            })
            .expect("child");
        let second = manager.checkpoint(&mut env, &child).expect("checkpoint");

        let chain = manager.chain(&second).expect("chain");
        let ids: Vec<&str> = chain.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(chain[0].task_id, child.id);
    }

    #[test]
    fn unknown_snapshot_is_rejected_without_touching_env() {
        let store = TaskStore::open_in_memory().expect("store");
        let mut env = FakeEnvironment::default();
        env.write("a.txt", "1");
        let manager = SnapshotManager::new(&store);
        let err = manager.restore(&mut env, "nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Snapshot { operation: "restore", .. })
        ));
        assert_eq!(env.restores(), 0);
        assert_eq!(env.read("a.txt").as_deref(), Some("1"));
    }

    #[test]
    fn failed_checkpoint_is_a_snapshot_error() {
        let store = TaskStore::open_in_memory().expect("store");
        let mut env = FakeEnvironment::default();
        env.fail_checkpoints(true);
        let task = store.create(NewTask::root("t")).expect("task");
        let err = SnapshotManager::new(&store)
            .checkpoint(&mut env, &task)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Snapshot { operation: "checkpoint", .. })
        ));
        assert!(store.snapshots_for(&task.id).expect("snapshots").is_empty());
    }

    #[test]
    fn restore_returns_recorded_state() {
        let store = TaskStore::open_in_memory().expect("store");
        let mut env = FakeEnvironment::default();
        let manager = SnapshotManager::new(&store);
        let task = store.create(NewTask::root("t")).expect("task");
        env.write("a.txt", "before");
        let id = manager.checkpoint(&mut env, &task).expect("checkpoint");
        env.write("a.txt", "after");
        env.write("b.txt", "new");
        manager.restore(&mut env, &id).expect("restore");
        assert_eq!(env.read("a.txt").as_deref(), Some("before"));
        assert_eq!(env.read("b.txt"), None);
    }
}
