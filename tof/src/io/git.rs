//! Git plumbing used for workspace snapshots.
//!
//! Snapshots live in a private git directory (never the user's own `.git`),
//! so checkpoints do not touch the user's branches, index or history. Each
//! snapshot is a commit pinned by `refs/tof/snapshots/<id>`.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

const SNAPSHOT_REF_PREFIX: &str = "refs/tof/snapshots/";

/// Wrapper for git commands against a separate git dir and work tree.
#[derive(Debug, Clone)]
pub struct Git {
    git_dir: PathBuf,
    work_tree: PathBuf,
    /// Work-tree paths (relative to its root) that snapshots never capture or clean.
    excluded: Vec<String>,
}

impl Git {
    pub fn new(git_dir: impl Into<PathBuf>, work_tree: impl Into<PathBuf>, excluded: &[&str]) -> Self {
        Self {
            git_dir: git_dir.into(),
            work_tree: work_tree.into(),
            excluded: excluded
                .iter()
                .map(|path| path.trim_matches('/').to_string())
                .filter(|path| !path.is_empty())
                .collect(),
        }
    }

    /// Create the snapshot git dir if missing.
    #[instrument(skip_all, fields(git_dir = %self.git_dir.display()))]
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.git_dir.join("HEAD").exists() {
            debug!("initializing snapshot git dir");
            fs::create_dir_all(&self.git_dir)
                .with_context(|| format!("create {}", self.git_dir.display()))?;
            let output = Command::new("git")
                .arg("init")
                .arg("--quiet")
                .arg("--bare")
                .arg(&self.git_dir)
                .output()
                .context("spawn git init")?;
            check_output("init", &output)?;
        }
        let info_dir = self.git_dir.join("info");
        fs::create_dir_all(&info_dir)
            .with_context(|| format!("create {}", info_dir.display()))?;
        let mut exclude = String::new();
        for path in &self.excluded {
            exclude.push('/');
            exclude.push_str(path);
            exclude.push_str("/\n");
        }
        let exclude_path = info_dir.join("exclude");
        fs::write(&exclude_path, exclude)
            .with_context(|| format!("write {}", exclude_path.display()))
    }

    /// Commit the full work tree, ignored files included, and pin it under `id`.
    ///
    /// The ref is written last, so a failure earlier leaves no visible snapshot.
    #[instrument(skip_all, fields(snapshot_id = id))]
    pub fn commit_snapshot(&self, id: &str, parent: Option<&str>) -> Result<String> {
        self.stage_everything()?;
        let tree = self.capture(&["write-tree"])?;
        let message = format!("tof snapshot {id}");
        let mut args = vec!["commit-tree", tree.as_str(), "-m", message.as_str()];
        let parent_commit = match parent {
            Some(parent_id) => self.resolve_snapshot(parent_id).ok(),
            None => None,
        };
        if let Some(commit) = parent_commit.as_deref() {
            args.push("-p");
            args.push(commit);
        }
        let commit = self.capture(&args)?;
        let reference = snapshot_ref(id);
        self.run_checked(&["update-ref", &reference, &commit])?;
        debug!(%commit, "snapshot committed");
        Ok(commit)
    }

    /// Resolve a snapshot id to its commit sha.
    pub fn resolve_snapshot(&self, id: &str) -> Result<String> {
        let reference = format!("{}^{{commit}}", snapshot_ref(id));
        self.capture(&["rev-parse", "--verify", "--quiet", &reference])
            .with_context(|| format!("unknown snapshot '{id}'"))
    }

    /// Make the work tree match snapshot `id` exactly.
    ///
    /// Files are reset to the snapshot tree and anything the snapshot does not
    /// contain is removed, ignored files included. Excluded paths are left
    /// alone. The snapshot ref is only read.
    #[instrument(skip_all, fields(snapshot_id = id))]
    pub fn checkout_snapshot(&self, id: &str) -> Result<()> {
        let commit = self.resolve_snapshot(id)?;
        // Stage current state so files added since the snapshot are known to the index
        // and get removed by the reset below.
        self.stage_everything()?;
        self.run_checked(&["read-tree", "--reset", "-u", &commit])?;
        let mut args = vec!["clean".to_string(), "-f".into(), "-d".into(), "-x".into(), "--quiet".into()];
        for path in &self.excluded {
            args.push("-e".into());
            args.push(format!("/{path}/"));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&args)?;
        debug!(%commit, "work tree restored");
        Ok(())
    }

    /// `add --all --force`, skipping excluded paths. The project's ignore
    /// rules must not hide build outputs or dependencies from a snapshot.
    fn stage_everything(&self) -> Result<()> {
        let mut args = vec![
            "add".to_string(),
            "--all".into(),
            "--force".into(),
            "--".into(),
            ".".into(),
        ];
        for path in &self.excluded {
            args.push(format!(":(exclude,top){path}"));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&args)?;
        Ok(())
    }

    fn capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        check_output(&args.join(" "), &output)?;
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .arg("--git-dir")
            .arg(&self.git_dir)
            .arg("--work-tree")
            .arg(&self.work_tree)
            .args(args)
            .current_dir(&self.work_tree)
            .env("GIT_AUTHOR_NAME", "tof")
            .env("GIT_AUTHOR_EMAIL", "tof@localhost")
            .env("GIT_COMMITTER_NAME", "tof")
            .env("GIT_COMMITTER_EMAIL", "tof@localhost")
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn snapshot_ref(id: &str) -> String {
    format!("{SNAPSHOT_REF_PREFIX}{id}")
}

fn check_output(label: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!("git {label} failed: {}", stderr.trim()))
}
