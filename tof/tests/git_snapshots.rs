//! Snapshots live in a private git dir and never touch a project's own repo.

use std::fs;
use std::path::Path;
use std::process::Command;

use tof::io::environment::{Environment, GitWorkspace};

fn git(root: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .expect("git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn checkpoint_and_restore_leave_project_repo_alone() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    git(root, &["init", "--quiet"]);
    git(root, &["config", "user.email", "dev@example.com"]);
    git(root, &["config", "user.name", "Dev"]);
    fs::write(root.join("main.c"), "int main(void) { return 0; }\n").expect("write");
    git(root, &["add", "main.c"]);
    git(root, &["commit", "--quiet", "-m", "initial"]);
    let head = git(root, &["rev-parse", "HEAD"]);
    fs::write(root.join("notes.txt"), "uncommitted\n").expect("write");

    let mut env =
        GitWorkspace::open(root, &root.join(".tof/snapshots.git")).expect("git workspace");
    let snapshot = env.checkpoint(None).expect("checkpoint");

    fs::write(root.join("main.c"), "broken").expect("write");
    fs::write(root.join("build.log"), "error\n").expect("write");
    env.restore(&snapshot).expect("restore");

    assert_eq!(
        fs::read_to_string(root.join("main.c")).expect("main.c"),
        "int main(void) { return 0; }\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("notes.txt")).expect("notes"),
        "uncommitted\n"
    );
    assert!(!root.join("build.log").exists());

    assert_eq!(git(root, &["rev-parse", "HEAD"]), head);
    assert_eq!(git(root, &["log", "--oneline"]).lines().count(), 1);
    assert_eq!(git(root, &["status", "--porcelain", "--", "main.c"]), "");
}
