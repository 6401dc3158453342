//! CLI tests: spawn the `tof` binary against a temporary workspace with a
//! shell-script oracle.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tof::exit_codes;
use tof::io::config::{load_config, write_config};
use tof::io::init::{InitOptions, TofPaths, init_workspace};

const INSTALLING_ORACLE: &str = r#"#!/bin/sh
input=$(cat)
case "$input" in
  *goal_complete*)
    printf '```json\n{"summary": "x installed", "goal_complete": true}\n```\n' ;;
  *)
    printf '```json\n{"type": "shell", "description": "install x", "params": {"command": "echo installed > x.installed"}}\n```\n' ;;
esac
"#;

const CONFUSED_ORACLE: &str = "#!/bin/sh\ncat > /dev/null\necho 'I am not sure what to do.'\n";

fn tof(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tof"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("run tof")
}

fn workspace_with_oracle(root: &Path, script: &str, max_attempts: u32) -> TofPaths {
    let paths = init_workspace(root, &InitOptions { force: false }).expect("init");
    let script_path = root.join(".tof/oracle.sh");
    fs::write(&script_path, script).expect("write oracle");
    let mut config = load_config(&paths.config_path).expect("config");
    config.max_attempts = max_attempts;
    config.oracle.command = vec!["sh".to_string(), script_path.display().to_string()];
    write_config(&paths.config_path, &config).expect("write config");
    paths
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_creates_workspace_and_refuses_to_repeat() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = tof(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(".tof/config.toml").exists());

    let second = tof(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));

    let forced = tof(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn commands_require_an_initialized_workspace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = tof(temp.path(), &["list"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("tof init"));
}

#[test]
fn prompt_runs_task_to_success_and_records_history() {
    let temp = tempfile::tempdir().expect("tempdir");
    workspace_with_oracle(temp.path(), INSTALLING_ORACLE, 4);

    let output = tof(temp.path(), &["prompt", "install package x"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(temp.path().join("x.installed").exists());
    let task_id = stdout(&output)
        .split_whitespace()
        .next()
        .expect("task id")
        .to_string();

    let list = tof(temp.path(), &["list"]);
    assert_eq!(list.status.code(), Some(exit_codes::OK));
    assert!(stdout(&list).contains(&task_id));
    assert!(stdout(&list).contains("success"));

    let view = tof(temp.path(), &["view", &task_id]);
    assert_eq!(view.status.code(), Some(exit_codes::OK));
    let text = stdout(&view);
    assert!(text.contains("summary:     x installed"));
    assert!(text.contains("[shell] install x"));
    assert!(text.contains("snapshots (newest first):"));

    let rollback = tof(temp.path(), &["rollback", &task_id]);
    assert_eq!(rollback.status.code(), Some(exit_codes::OK));
    assert!(!temp.path().join("x.installed").exists());
}

#[test]
fn unusable_oracle_fails_the_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    workspace_with_oracle(temp.path(), CONFUSED_ORACLE, 2);

    let output = tof(temp.path(), &["prompt", "install package x"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(stdout(&output).contains("failed"));

    let task_id = stdout(&output)
        .split_whitespace()
        .next()
        .expect("task id")
        .to_string();
    let resume = tof(temp.path(), &["resume", &task_id]);
    assert_eq!(resume.status.code(), Some(exit_codes::FAILED));
    assert!(stdout(&resume).contains("already failed"));
}

#[test]
fn view_of_unknown_task_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
    let output = tof(temp.path(), &["view", "missing"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
