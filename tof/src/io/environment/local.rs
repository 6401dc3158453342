//! The workspace directory as an environment, snapshotted through git.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use super::{Environment, ExecOutput, checked_file_paths};
use crate::core::types::FileContent;
use crate::io::git::Git;
use crate::io::process::{RunLimits, run_command};

/// Paths excluded from snapshots, relative to the work tree.
const EXCLUDED: &[&str] = &["/.tof/"];

/// Local directory whose checkpoints are commits in a private git dir.
#[derive(Debug)]
pub struct GitWorkspace {
    workdir: PathBuf,
    git: Git,
}

impl GitWorkspace {
    /// Open `workdir`, storing snapshots in `snapshots_git_dir`.
    pub fn open(workdir: &Path, snapshots_git_dir: &Path) -> Result<Self> {
        fs::create_dir_all(workdir)
            .with_context(|| format!("create workdir {}", workdir.display()))?;
        let workdir = workdir
            .canonicalize()
            .with_context(|| format!("resolve workdir {}", workdir.display()))?;
        let git = Git::new(snapshots_git_dir, &workdir, EXCLUDED);
        git.ensure_initialized()?;
        Ok(Self { workdir, git })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

impl Environment for GitWorkspace {
    fn workdir_label(&self) -> String {
        self.workdir.display().to_string()
    }

    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    fn run_shell(&mut self, command: &str, limits: &RunLimits) -> Result<ExecOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.workdir);
        Ok(run_command(cmd, None, limits)?.into())
    }

    #[instrument(skip_all, fields(workdir = %self.workdir.display(), program = %program))]
    fn run_program(
        &mut self,
        program: &str,
        args: &[String],
        limits: &RunLimits,
    ) -> Result<ExecOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        Ok(run_command(cmd, None, limits)?.into())
    }

    fn write_files(&mut self, files: &[FileContent]) -> Result<()> {
        let paths = checked_file_paths(files)?;
        for (file, relative) in files.iter().zip(paths) {
            let path = self.workdir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            fs::write(&path, &file.content)
                .with_context(|| format!("write file {}", path.display()))?;
            debug!(path = %file.path, bytes = file.content.len(), "file written");
        }
        Ok(())
    }

    fn checkpoint(&mut self, parent: Option<&str>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.git.commit_snapshot(&id, parent)?;
        Ok(id)
    }

    fn restore(&mut self, snapshot_id: &str) -> Result<()> {
        self.git.checkout_snapshot(snapshot_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::cancel::CancelToken;

    fn limits() -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(10),
            output_limit_bytes: 4096,
            cancel: CancelToken::new(),
        }
    }

    fn workspace(root: &Path) -> GitWorkspace {
        GitWorkspace::open(root, &root.join(".tof/snapshots.git")).expect("open")
    }

    #[test]
    fn shell_runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut env = workspace(temp.path());
        let out = env.run_shell("echo hi > out.txt && cat out.txt", &limits()).expect("run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hi");
        assert!(temp.path().join("out.txt").exists());
    }

    #[test]
    fn program_runs_without_shell() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut env = workspace(temp.path());
        let out = env
            .run_program("echo", &["$HOME".to_string()], &limits())
            .expect("run");
        assert_eq!(out.stdout.trim(), "$HOME");
    }

    #[test]
    fn writes_nested_files_and_rejects_escapes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut env = workspace(temp.path());
        env.write_files(&[FileContent::new("a/b/c.txt", "deep")])
            .expect("write");
        assert_eq!(
            fs::read_to_string(temp.path().join("a/b/c.txt")).expect("read"),
            "deep"
        );
        assert!(env
            .write_files(&[FileContent::new("../outside.txt", "x")])
            .is_err());
        assert!(!temp.path().parent().expect("parent").join("outside.txt").exists());
    }

    #[test]
    fn restore_is_repeatable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let mut env = workspace(root);
        fs::write(root.join("keep.txt"), "v1").expect("write");
        fs::write(root.join("gone.txt"), "bye").expect("write");
        let snapshot = env.checkpoint(None).expect("checkpoint");

        for _ in 0..2 {
            fs::write(root.join("keep.txt"), "v2").expect("write");
            fs::remove_file(root.join("gone.txt")).expect("remove");
            fs::create_dir_all(root.join("new/dir")).expect("mkdir");
            fs::write(root.join("new/dir/added.txt"), "x").expect("write");

            env.restore(&snapshot).expect("restore");
            assert_eq!(fs::read_to_string(root.join("keep.txt")).expect("read"), "v1");
            assert_eq!(fs::read_to_string(root.join("gone.txt")).expect("read"), "bye");
            assert!(!root.join("new").exists());
        }
    }

    #[test]
    fn restore_rolls_back_ignored_build_outputs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let mut env = workspace(root);
        fs::write(root.join(".gitignore"), "build/\nnode_modules/\n").expect("write");
        fs::create_dir_all(root.join("build")).expect("mkdir");
        fs::write(root.join("build/out.bin"), "GOOD").expect("write");
        let snapshot = env.checkpoint(None).expect("checkpoint");

        env.run_shell(
            "echo CORRUPTED > build/out.bin && touch build/extra && mkdir -p node_modules/x",
            &limits(),
        )
        .expect("run");
        env.restore(&snapshot).expect("restore");

        assert_eq!(fs::read_to_string(root.join("build/out.bin")).expect("read"), "GOOD");
        assert!(!root.join("build/extra").exists());
        assert!(!root.join("node_modules").exists());
        assert!(root.join(".tof/snapshots.git/HEAD").exists());
    }
}
