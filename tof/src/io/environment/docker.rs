//! A long-lived docker container as an environment.
//!
//! Commands run through `docker exec`. A checkpoint commits the container to
//! the image `tof-snapshot:<id>`; restoring replaces the container with a
//! fresh one started from that image, so the image itself never changes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use super::{Environment, ExecOutput, checked_file_paths};
use crate::core::cancel::CancelToken;
use crate::core::types::FileContent;
use crate::io::process::{RunLimits, run_checked, run_command};

const SNAPSHOT_REPOSITORY: &str = "tof-snapshot";

/// Bookkeeping calls (inspect, run, commit, rm) are bounded separately from actions.
const DOCKER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const WRITE_SCRIPT: &str = r#"mkdir -p "$(dirname "$1")" && cat > "$1""#;

#[derive(Debug)]
pub struct DockerContainer {
    name: String,
    image: String,
    workdir: String,
}

impl DockerContainer {
    /// Attach to container `name`, starting it from `image` when it does not exist.
    pub fn open(name: &str, image: &str, workdir: &str) -> Result<Self> {
        let container = Self {
            name: name.to_string(),
            image: image.to_string(),
            workdir: workdir.to_string(),
        };
        container.ensure_running()?;
        Ok(container)
    }

    fn ensure_running(&self) -> Result<()> {
        let inspect = run_command(
            docker(&["inspect", "--format", "{{.State.Running}}", &self.name]),
            None,
            &bookkeeping_limits(),
        )?;
        if !inspect.success() {
            info!(container = %self.name, image = %self.image, "starting container");
            return self.start_from(&self.image);
        }
        if inspect.stdout_text().trim() != "true" {
            debug!(container = %self.name, "restarting stopped container");
            run_checked(docker(&["start", &self.name]), None, &bookkeeping_limits())
                .with_context(|| format!("start container {}", self.name))?;
        }
        Ok(())
    }

    fn start_from(&self, image: &str) -> Result<()> {
        run_checked(
            docker(&self.run_args(image)),
            None,
            &bookkeeping_limits(),
        )
        .with_context(|| format!("run container {} from {image}", self.name))?;
        Ok(())
    }

    fn run_args<'a>(&'a self, image: &'a str) -> Vec<&'a str> {
        vec![
            "run",
            "--detach",
            "--name",
            &self.name,
            "--workdir",
            &self.workdir,
            "--entrypoint",
            "sleep",
            image,
            "infinity",
        ]
    }

    fn exec_args<'a>(&'a self, interactive: bool, argv: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["exec"];
        if interactive {
            args.push("--interactive");
        }
        args.extend(["--workdir", self.workdir.as_str(), self.name.as_str()]);
        args.extend_from_slice(argv);
        args
    }
}

impl Environment for DockerContainer {
    fn workdir_label(&self) -> String {
        format!("docker://{}{}", self.name, self.workdir)
    }

    #[instrument(skip_all, fields(container = %self.name))]
    fn run_shell(&mut self, command: &str, limits: &RunLimits) -> Result<ExecOutput> {
        let cmd = docker(&self.exec_args(false, &["sh", "-c", command]));
        Ok(run_command(cmd, None, limits)?.into())
    }

    #[instrument(skip_all, fields(container = %self.name, program = %program))]
    fn run_program(
        &mut self,
        program: &str,
        args: &[String],
        limits: &RunLimits,
    ) -> Result<ExecOutput> {
        let mut argv = vec![program];
        argv.extend(args.iter().map(String::as_str));
        let cmd = docker(&self.exec_args(false, &argv));
        Ok(run_command(cmd, None, limits)?.into())
    }

    fn write_files(&mut self, files: &[FileContent]) -> Result<()> {
        let paths = checked_file_paths(files)?;
        for (file, relative) in files.iter().zip(paths) {
            let target = relative.to_string_lossy().into_owned();
            let args = self.exec_args(true, &["sh", "-c", WRITE_SCRIPT, "tof-write", target.as_str()]);
            run_checked(docker(&args), Some(file.content.as_bytes()), &bookkeeping_limits())
                .with_context(|| format!("write {} in container {}", file.path, self.name))?;
            debug!(path = %file.path, bytes = file.content.len(), "file written");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(container = %self.name))]
    fn checkpoint(&mut self, _parent: Option<&str>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let image = snapshot_image(&id);
        run_checked(
            docker(&["commit", &self.name, &image]),
            None,
            &bookkeeping_limits(),
        )
        .with_context(|| format!("commit container {} to {image}", self.name))?;
        Ok(id)
    }

    #[instrument(skip_all, fields(container = %self.name, snapshot_id = %snapshot_id))]
    fn restore(&mut self, snapshot_id: &str) -> Result<()> {
        let image = snapshot_image(snapshot_id);
        let found = run_command(
            docker(&["image", "inspect", "--format", "{{.Id}}", &image]),
            None,
            &bookkeeping_limits(),
        )?;
        if !found.success() {
            return Err(anyhow!("unknown snapshot '{snapshot_id}' (no image {image})"));
        }
        run_checked(
            docker(&["rm", "--force", &self.name]),
            None,
            &bookkeeping_limits(),
        )
        .with_context(|| format!("remove container {}", self.name))?;
        self.start_from(&image)
    }
}

fn snapshot_image(id: &str) -> String {
    format!("{SNAPSHOT_REPOSITORY}:{id}")
}

fn docker(args: &[&str]) -> Command {
    let mut cmd = Command::new("docker");
    cmd.args(args);
    cmd
}

fn bookkeeping_limits() -> RunLimits {
    RunLimits {
        timeout: DOCKER_TIMEOUT,
        output_limit_bytes: 64 * 1024,
        cancel: CancelToken::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> DockerContainer {
        DockerContainer {
            name: "tof-test".to_string(),
            image: "ubuntu:24.04".to_string(),
            workdir: "/workspace".to_string(),
        }
    }

    #[test]
    fn snapshot_images_are_tagged_by_id() {
        assert_eq!(snapshot_image("abc"), "tof-snapshot:abc");
    }

    #[test]
    fn exec_args_target_workdir_and_container() {
        let env = container();
        assert_eq!(
            env.exec_args(true, &["sh", "-c", "true"]),
            vec![
                "exec",
                "--interactive",
                "--workdir",
                "/workspace",
                "tof-test",
                "sh",
                "-c",
                "true"
            ]
        );
    }

    #[test]
    fn run_args_keep_container_alive() {
        let env = container();
        let args = env.run_args("tof-snapshot:abc");
        assert_eq!(args.first(), Some(&"run"));
        assert!(args.ends_with(&["tof-snapshot:abc", "infinity"]));
        assert_eq!(env.workdir_label(), "docker://tof-test/workspace");
    }
}
