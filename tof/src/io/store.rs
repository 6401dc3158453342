//! Durable task tree backed by SQLite.
//!
//! The store owns one connection behind a mutex, so every write is serialized
//! (single writer per node falls out of single writer per store). Each
//! mutation runs in an immediate transaction.
//!
//! The schema enforces the data model at the backend level: CHECK constraints
//! on every enum column, foreign keys from attempts and snapshots to tasks,
//! and triggers that reject changes to terminal tasks and rewrites of
//! attempts. The checks in Rust produce readable errors first; the triggers
//! are the backstop for anything that bypasses this module.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::action::{Action, ActionKind, ActionType};
use crate::core::immutability::check_task_update;
use crate::core::task::{AttemptResult, NewTask, TaskNode};
use crate::core::types::{ActionOutputs, AttemptError, AttemptStatus, ErrorKind, Severity, TaskStatus};
use crate::error::EngineError;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS task (
    id TEXT PRIMARY KEY NOT NULL,
    description TEXT NOT NULL,
    goal TEXT NOT NULL,
    parent_id TEXT REFERENCES task(id),
    continuation_summary TEXT,
    status TEXT NOT NULL
        CHECK (status IN ('pending', 'in_progress', 'success', 'failed')),
    environment_snapshot_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS task_parent_idx ON task(parent_id);

CREATE TABLE IF NOT EXISTS attempt (
    id TEXT PRIMARY KEY NOT NULL,
    task_id TEXT NOT NULL REFERENCES task(id),
    action_type TEXT NOT NULL
        CHECK (action_type IN ('shell', 'files', 'http', 'reasoning-call', 'environment-op', 'custom')),
    action_id TEXT NOT NULL,
    action_description TEXT NOT NULL,
    action_params TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('success', 'failure')),
    error_code TEXT CHECK (error_code IS NULL OR error_code IN (
        'EXECUTION_ERROR', 'TIMEOUT', 'INVALID_ORACLE_RESPONSE', 'ORACLE_ERROR',
        'UNSUPPORTED_ACTION', 'SNAPSHOT_ERROR', 'CEILING_EXCEEDED'
    )),
    error_message TEXT,
    error_severity TEXT CHECK (error_severity IS NULL OR error_severity IN ('recoverable', 'fatal')),
    outputs TEXT,
    created_at TEXT NOT NULL,
    CHECK (
        (status = 'success' AND error_code IS NULL)
        OR (status = 'failure' AND error_code IS NOT NULL AND error_severity IS NOT NULL)
    )
);

CREATE INDEX IF NOT EXISTS attempt_task_idx ON attempt(task_id);

CREATE TABLE IF NOT EXISTS snapshot (
    id TEXT PRIMARY KEY NOT NULL,
    parent_id TEXT REFERENCES snapshot(id),
    task_id TEXT NOT NULL REFERENCES task(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS snapshot_task_idx ON snapshot(task_id);

CREATE TRIGGER IF NOT EXISTS task_terminal_is_final
BEFORE UPDATE ON task
WHEN OLD.status IN ('success', 'failed')
BEGIN
    SELECT RAISE(ABORT, 'task is terminal');
END;

CREATE TRIGGER IF NOT EXISTS attempt_requires_open_task
BEFORE INSERT ON attempt
WHEN (SELECT status FROM task WHERE id = NEW.task_id) IN ('success', 'failed')
BEGIN
    SELECT RAISE(ABORT, 'task is terminal');
END;

CREATE TRIGGER IF NOT EXISTS attempt_no_update
BEFORE UPDATE ON attempt
BEGIN
    SELECT RAISE(ABORT, 'attempts are append-only');
END;

CREATE TRIGGER IF NOT EXISTS attempt_no_delete
BEFORE DELETE ON attempt
BEGIN
    SELECT RAISE(ABORT, 'attempts are append-only');
END;
";

const TASK_COLUMNS: &str = "id, description, goal, parent_id, continuation_summary, status, \
     environment_snapshot_id, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, action_type, action_id, action_description, action_params, \
     status, error_code, error_message, error_severity, outputs, created_at";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One recorded environment checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

/// Handle to the task database. Pass it into the engine; drop or `close` it
/// when done.
#[derive(Debug)]
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (creating if needed) the database at `path` and bootstrap the schema.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open task store {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("set task store busy timeout")?;
        Self::bootstrap(conn)
    }

    /// Private in-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory task store")?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("enable foreign keys")?;
        conn.execute_batch(SCHEMA).context("bootstrap task store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Close the underlying connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| anyhow!("task store lock poisoned"))?;
        conn.close()
            .map_err(|(_, err)| anyhow!(err).context("close task store"))
    }

    /// Insert a new `pending` node.
    #[instrument(skip_all, fields(parent_id = ?task.parent_id))]
    pub fn create(&self, task: NewTask) -> Result<TaskNode> {
        let node = TaskNode::new(task);
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(parent_id) = node.parent_id.as_deref() {
            if !task_exists(&tx, parent_id)? {
                return Err(EngineError::TaskNotFound(parent_id.to_string()).into());
            }
        }
        tx.execute(
            "INSERT INTO task (id, description, goal, parent_id, continuation_summary, status,
                environment_snapshot_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                node.id,
                node.description,
                node.goal,
                node.parent_id,
                node.continuation_summary,
                node.status.as_str(),
                node.environment_snapshot_id,
                timestamp(node.created_at),
                timestamp(node.updated_at),
            ],
        )
        .with_context(|| format!("insert task '{}'", node.id))?;
        tx.commit().context("commit task insert")?;
        debug!(task_id = %node.id, "task created");
        Ok(node)
    }

    /// Load a node with its full attempt history.
    pub fn get(&self, id: &str) -> Result<Option<TaskNode>> {
        let conn = self.lock()?;
        load_task(&conn, id)
    }

    /// Like [`TaskStore::get`], but a missing node is an [`EngineError::TaskNotFound`].
    pub fn require(&self, id: &str) -> Result<TaskNode> {
        self.get(id)?
            .ok_or_else(|| EngineError::TaskNotFound(id.to_string()).into())
    }

    /// Persist the mutable fields of `task` (status, snapshot id, continuation
    /// summary) and advance `updated_at`.
    ///
    /// Rejected when the stored node is terminal, when an immutable field or
    /// a stored attempt differs, when the status change is illegal, or when
    /// `task` carries attempts that were never appended.
    #[instrument(skip_all, fields(task_id = %task.id, status = %task.status))]
    pub fn update(&self, task: &mut TaskNode) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored =
            load_task(&tx, &task.id)?.ok_or_else(|| EngineError::TaskNotFound(task.id.clone()))?;
        if stored.is_terminal() {
            return Err(EngineError::TerminalTask {
                id: stored.id,
                status: stored.status,
            }
            .into());
        }
        let mut reasons = check_task_update(&stored, task);
        if task.attempts.len() > stored.attempts.len() {
            reasons.push(format!(
                "task '{}' has {} attempt(s) that were not appended",
                task.id,
                task.attempts.len() - stored.attempts.len()
            ));
        }
        if !reasons.is_empty() {
            return Err(EngineError::InvalidUpdate {
                id: task.id.clone(),
                reasons: reasons.join("; "),
            }
            .into());
        }

        let updated_at = Utc::now().max(stored.updated_at);
        tx.execute(
            "UPDATE task
             SET status = ?2, environment_snapshot_id = ?3, continuation_summary = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                task.id,
                task.status.as_str(),
                task.environment_snapshot_id,
                task.continuation_summary,
                timestamp(updated_at),
            ],
        )
        .with_context(|| format!("update task '{}'", task.id))?;
        tx.commit().context("commit task update")?;
        task.updated_at = updated_at;
        Ok(())
    }

    /// Every node, in creation order.
    pub fn list(&self) -> Result<Vec<TaskNode>> {
        let conn = self.lock()?;
        let ids = query_ids(&conn, "SELECT id FROM task ORDER BY rowid", params![])?;
        load_all(&conn, &ids)
    }

    /// Direct children of `parent_id`, in creation order.
    pub fn children(&self, parent_id: &str) -> Result<Vec<TaskNode>> {
        let conn = self.lock()?;
        let ids = query_ids(
            &conn,
            "SELECT id FROM task WHERE parent_id = ?1 ORDER BY rowid",
            params![parent_id],
        )?;
        load_all(&conn, &ids)
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Result<Vec<TaskNode>> {
        let conn = self.lock()?;
        let start = load_task(&conn, id)?.ok_or_else(|| EngineError::TaskNotFound(id.to_string()))?;
        let mut seen = HashSet::from([start.id.clone()]);
        let mut ancestors = Vec::new();
        let mut next = start.parent_id;
        while let Some(parent_id) = next {
            if !seen.insert(parent_id.clone()) {
                return Err(anyhow!("task '{id}' has a cyclic parent chain at '{parent_id}'"));
            }
            let parent = load_task(&conn, &parent_id)?
                .ok_or_else(|| EngineError::TaskNotFound(parent_id.clone()))?;
            next = parent.parent_id.clone();
            ancestors.push(parent);
        }
        Ok(ancestors)
    }

    /// Append one attempt to the end of a node's history.
    ///
    /// This is the only write path for attempts. Order is insertion order.
    /// Returns the node's new `updated_at`.
    #[instrument(skip_all, fields(task_id = %task_id, attempt_id = %attempt.id, status = attempt.status.as_str()))]
    pub fn append_attempt(&self, task_id: &str, attempt: &AttemptResult) -> Result<DateTime<Utc>> {
        attempt.validate().map_err(|reason| EngineError::InvalidUpdate {
            id: task_id.to_string(),
            reasons: reason,
        })?;
        let params_json = serde_json::to_string(
            &attempt
                .action
                .kind
                .params_value()
                .context("serialize action params")?,
        )
        .context("encode action params")?;
        let outputs_json = attempt
            .outputs
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("encode attempt outputs")?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row: Option<(String, String)> = tx
            .query_row(
                "SELECT status, updated_at FROM task WHERE id = ?1",
                params![task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("look up task status")?;
        let Some((status, stored_updated_at)) = row else {
            return Err(EngineError::TaskNotFound(task_id.to_string()).into());
        };
        let status = parse_task_status(&status)?;
        let updated_at = Utc::now().max(parse_timestamp(&stored_updated_at)?);
        if status.is_terminal() {
            return Err(EngineError::TerminalTask {
                id: task_id.to_string(),
                status,
            }
            .into());
        }

        let error = attempt.error.as_ref();
        tx.execute(
            "INSERT INTO attempt (id, task_id, action_type, action_id, action_description,
                action_params, status, error_code, error_message, error_severity, outputs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                attempt.id,
                task_id,
                attempt.action.action_type().as_str(),
                attempt.action.id,
                attempt.action.description,
                params_json,
                attempt.status.as_str(),
                error.map(|err| err.code.code()),
                error.map(|err| err.message.as_str()),
                error.map(|err| err.severity.as_str()),
                outputs_json,
                timestamp(attempt.created_at),
            ],
        )
        .with_context(|| format!("insert attempt '{}'", attempt.id))?;
        tx.execute(
            "UPDATE task SET updated_at = ?2 WHERE id = ?1",
            params![task_id, timestamp(updated_at)],
        )
        .context("touch task after attempt")?;
        tx.commit().context("commit attempt insert")?;
        debug!("attempt appended");
        Ok(updated_at)
    }

    pub fn record_snapshot(&self, record: &SnapshotRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO snapshot (id, parent_id, task_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.parent_id,
                record.task_id,
                timestamp(record.created_at),
            ],
        )
        .with_context(|| format!("record snapshot '{}'", record.id))?;
        Ok(())
    }

    pub fn get_snapshot(&self, id: &str) -> Result<Option<SnapshotRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT id, parent_id, task_id, created_at FROM snapshot WHERE id = ?1",
                params![id],
                snapshot_row,
            )
            .optional()
            .with_context(|| format!("load snapshot '{id}'"))?;
        raw.map(RawSnapshot::into_record).transpose()
    }

    /// Snapshots taken for `task_id`, oldest first.
    pub fn snapshots_for(&self, task_id: &str) -> Result<Vec<SnapshotRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, task_id, created_at FROM snapshot WHERE task_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![task_id], snapshot_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("load snapshots for task '{task_id}'"))?;
        rows.into_iter().map(RawSnapshot::into_record).collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("task store lock poisoned"))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp '{raw}'"))?
        .with_timezone(&Utc))
}

fn parse_task_status(raw: &str) -> Result<TaskStatus> {
    TaskStatus::parse(raw).ok_or_else(|| anyhow!("unknown task status '{raw}'"))
}

fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM task WHERE id = ?1", params![id], |row| row.get(0))
        .optional()
        .context("look up task")?;
    Ok(found.is_some())
}

fn query_ids(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(args, |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("list task ids")?;
    Ok(ids)
}

fn load_all(conn: &Connection, ids: &[String]) -> Result<Vec<TaskNode>> {
    let mut nodes = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(node) = load_task(conn, id)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

struct RawTask {
    id: String,
    description: String,
    goal: String,
    parent_id: Option<String>,
    continuation_summary: Option<String>,
    status: String,
    environment_snapshot_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn task_row(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get("id")?,
        description: row.get("description")?,
        goal: row.get("goal")?,
        parent_id: row.get("parent_id")?,
        continuation_summary: row.get("continuation_summary")?,
        status: row.get("status")?,
        environment_snapshot_id: row.get("environment_snapshot_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

struct RawAttempt {
    id: String,
    action_type: String,
    action_id: String,
    action_description: String,
    action_params: String,
    status: String,
    error_code: Option<String>,
    error_message: Option<String>,
    error_severity: Option<String>,
    outputs: Option<String>,
    created_at: String,
}

fn attempt_row(row: &Row<'_>) -> rusqlite::Result<RawAttempt> {
    Ok(RawAttempt {
        id: row.get("id")?,
        action_type: row.get("action_type")?,
        action_id: row.get("action_id")?,
        action_description: row.get("action_description")?,
        action_params: row.get("action_params")?,
        status: row.get("status")?,
        error_code: row.get("error_code")?,
        error_message: row.get("error_message")?,
        error_severity: row.get("error_severity")?,
        outputs: row.get("outputs")?,
        created_at: row.get("created_at")?,
    })
}

impl RawAttempt {
    fn into_attempt(self) -> Result<AttemptResult> {
        let action_type = ActionType::parse(&self.action_type)
            .ok_or_else(|| anyhow!("unknown action type '{}'", self.action_type))?;
        let params = serde_json::from_str(&self.action_params)
            .with_context(|| format!("decode params of attempt '{}'", self.id))?;
        let kind = ActionKind::from_parts(action_type, params)
            .with_context(|| format!("decode action of attempt '{}'", self.id))?;
        let status = AttemptStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("unknown attempt status '{}'", self.status))?;
        let error = match (self.error_code, self.error_severity) {
            (Some(code), Some(severity)) => Some(AttemptError {
                code: ErrorKind::from_code(&code)
                    .ok_or_else(|| anyhow!("unknown error code '{code}'"))?,
                message: self.error_message.unwrap_or_default(),
                severity: Severity::parse(&severity)
                    .ok_or_else(|| anyhow!("unknown severity '{severity}'"))?,
            }),
            (None, None) => None,
            _ => return Err(anyhow!("attempt '{}' has a partial error record", self.id)),
        };
        let outputs: Option<ActionOutputs> = self
            .outputs
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("decode outputs of attempt '{}'", self.id))?;
        Ok(AttemptResult {
            id: self.id,
            action: Action {
                id: self.action_id,
                description: self.action_description,
                kind,
            },
            status,
            error,
            outputs,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct RawSnapshot {
    id: String,
    parent_id: Option<String>,
    task_id: String,
    created_at: String,
}

fn snapshot_row(row: &Row<'_>) -> rusqlite::Result<RawSnapshot> {
    Ok(RawSnapshot {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        task_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl RawSnapshot {
    fn into_record(self) -> Result<SnapshotRecord> {
        Ok(SnapshotRecord {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            parent_id: self.parent_id,
            task_id: self.task_id,
        })
    }
}

fn load_task(conn: &Connection, id: &str) -> Result<Option<TaskNode>> {
    let raw = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1"),
            params![id],
            task_row,
        )
        .optional()
        .with_context(|| format!("load task '{id}'"))?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempt WHERE task_id = ?1 ORDER BY rowid"
    ))?;
    let attempts = stmt
        .query_map(params![id], attempt_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("load attempts for task '{id}'"))?
        .into_iter()
        .map(RawAttempt::into_attempt)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(TaskNode {
        status: parse_task_status(&raw.status)?,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
        id: raw.id,
        description: raw.description,
        goal: raw.goal,
        parent_id: raw.parent_id,
        environment_snapshot_id: raw.environment_snapshot_id,
        continuation_summary: raw.continuation_summary,
        attempts,
    }))
}
