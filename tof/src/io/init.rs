//! Workspace layout and `.tof/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{EngineConfig, write_config};
use super::store::TaskStore;

const TOF_GITIGNORE: &str = "*\n";

/// All canonical paths within `.tof/` for a workspace root.
#[derive(Debug, Clone)]
pub struct TofPaths {
    pub root: PathBuf,
    pub tof_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub snapshots_git_dir: PathBuf,
}

impl TofPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tof_dir = root.join(".tof");
        Self {
            root: root.clone(),
            tof_dir: tof_dir.clone(),
            gitignore_path: tof_dir.join(".gitignore"),
            config_path: tof_dir.join("config.toml"),
            db_path: tof_dir.join("tof.db"),
            snapshots_git_dir: tof_dir.join("snapshots.git"),
        }
    }

    /// Fail unless `init` has been run for this root.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.tof_dir.is_dir() || !self.db_path.exists() {
            return Err(anyhow!(
                "no task store at {} (run `tof init` first)",
                self.db_path.display()
            ));
        }
        Ok(())
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite the existing config file. The task store is kept.
    pub force: bool,
}

/// Create `.tof/` scaffolding in `root`: default config and an empty task store.
///
/// Fails if `.tof/` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<TofPaths> {
    let paths = TofPaths::new(root);
    if paths.tof_dir.exists() && !paths.tof_dir.is_dir() {
        return Err(anyhow!("tof init: .tof exists but is not a directory"));
    }
    if paths.tof_dir.exists() && !options.force {
        return Err(anyhow!("tof init: .tof already exists (use --force to overwrite)"));
    }

    fs::create_dir_all(&paths.tof_dir)
        .with_context(|| format!("create directory {}", paths.tof_dir.display()))?;
    fs::write(&paths.gitignore_path, TOF_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &EngineConfig::default())?;

    let store = TaskStore::open(&paths.db_path)?;
    store.close()?;

    info!(root = %root.display(), "workspace initialized");
    Ok(paths)
}
