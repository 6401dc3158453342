use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tof::core::cancel::CancelToken;
use tof::core::types::TaskStatus;
use tof::engine::{RunOutcome, RunStop};
use tof::exit_codes;
use tof::io::init::InitOptions;
use tof::logging;
use tof::report;
use tof::workspace::Workspace;

#[derive(Parser, Debug)]
#[command(
    name = "tof",
    version,
    about = "Task execution engine that backtracks through a tree of attempts"
)]
struct Cli {
    /// Project directory containing `.tof/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Create `.tof/` with a default config and an empty task store.
    Init {
        /// Overwrite the existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Create a task and run it until it succeeds, fails, or is cancelled.
    Prompt {
        /// Task description.
        text: String,
        /// Completion criterion; defaults to the description.
        #[arg(long)]
        goal: Option<String>,
        /// Attach the task as a child of this task id.
        #[arg(long)]
        parent: Option<String>,
    },
    /// Continue a stored task from its last attempt.
    Resume { id: String },
    /// Restore the environment to a task's snapshot without running anything.
    Rollback {
        id: String,
        /// Snapshot id; defaults to the task's latest snapshot.
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// One line per stored task.
    List,
    /// Fields, snapshots, children and attempt history of one task.
    View { id: String },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli.root.as_path();
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Prompt { text, goal, parent } => {
            let workspace = Workspace::open(root)?;
            let outcome = workspace.prompt(
                &text,
                goal.as_deref(),
                parent.as_deref(),
                CancelToken::new(),
            )?;
            finish(workspace, &outcome)
        }
        Command::Resume { id } => {
            let workspace = Workspace::open(root)?;
            let outcome = workspace.resume(&id, CancelToken::new())?;
            finish(workspace, &outcome)
        }
        Command::Rollback { id, snapshot } => {
            let workspace = Workspace::open(root)?;
            let restored = workspace.rollback(&id, snapshot.as_deref())?;
            println!("{restored}");
            workspace.close()?;
            Ok(exit_codes::OK)
        }
        Command::List => {
            let workspace = Workspace::open(root)?;
            print!("{}", report::list(workspace.store())?);
            workspace.close()?;
            Ok(exit_codes::OK)
        }
        Command::View { id } => {
            let workspace = Workspace::open(root)?;
            print!("{}", report::view(workspace.store(), &id)?);
            workspace.close()?;
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = Workspace::init(root, &InitOptions { force })?;
    println!("initialized {}", paths.tof_dir.display());
    Ok(exit_codes::OK)
}

/// Print the outcome and map it to an exit code.
fn finish(workspace: Workspace, outcome: &RunOutcome) -> Result<i32> {
    let task = &outcome.task;
    let code = match &outcome.stop {
        RunStop::Succeeded => {
            println!("{} success", task.id);
            exit_codes::OK
        }
        RunStop::Failed(reason) => {
            println!("{} failed: {}", task.id, reason.describe());
            exit_codes::FAILED
        }
        RunStop::Cancelled => {
            println!("{} cancelled (resume with `tof resume {}`)", task.id, task.id);
            exit_codes::INTERRUPTED
        }
        RunStop::AlreadyTerminal => {
            println!("{} already {}", task.id, task.status);
            if task.status == TaskStatus::Success {
                exit_codes::OK
            } else {
                exit_codes::FAILED
            }
        }
        // drive() keeps running at the ancestor; reaching this means the
        // ancestor run itself stopped early.
        RunStop::Escalated { ancestor_id, .. } => {
            println!("{} escalated to {ancestor_id}", task.id);
            exit_codes::INTERRUPTED
        }
    };
    workspace.close()?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_parses_goal_and_parent() {
        let cli = Cli::try_parse_from([
            "tof",
            "--root",
            "/tmp/project",
            "prompt",
            "install package x",
            "--goal",
            "x --version works",
            "--parent",
            "abc",
        ])
        .expect("parse");
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        assert_eq!(
            cli.command,
            Command::Prompt {
                text: "install package x".to_string(),
                goal: Some("x --version works".to_string()),
                parent: Some("abc".to_string()),
            }
        );
    }

    #[test]
    fn root_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["tof", "list"]).expect("parse");
        assert_eq!(cli.root, PathBuf::from("."));
        assert_eq!(cli.command, Command::List);
    }

    #[test]
    fn rollback_takes_optional_snapshot() {
        let cli = Cli::try_parse_from(["tof", "rollback", "t1", "--snapshot", "s1"]).expect("parse");
        assert_eq!(
            cli.command,
            Command::Rollback {
                id: "t1".to_string(),
                snapshot: Some("s1".to_string()),
            }
        );
    }

    #[test]
    fn view_requires_an_id() {
        assert!(Cli::try_parse_from(["tof", "view"]).is_err());
    }
}
