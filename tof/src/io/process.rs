//! Child process execution with timeouts, cancellation and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::cancel::CancelToken;

/// Granularity at which a running child is checked for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Why a child was killed before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut,
    Cancelled,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub interrupted: Option<Interrupted>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.interrupted.is_none() && self.status.success()
    }

    pub fn timed_out(&self) -> bool {
        self.interrupted == Some(Interrupted::TimedOut)
    }

    pub fn cancelled(&self) -> bool {
        self.interrupted == Some(Interrupted::Cancelled)
    }

    /// Lossy stdout with a truncation notice appended when bytes were dropped.
    pub fn stdout_text(&self) -> String {
        render_stream(&self.stdout, self.stdout_truncated, "stdout")
    }

    /// Lossy stderr with a truncation notice appended when bytes were dropped.
    pub fn stderr_text(&self) -> String {
        render_stream(&self.stderr, self.stderr_truncated, "stderr")
    }
}

fn render_stream(bytes: &[u8], truncated: usize, label: &str) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[{label} truncated {truncated} bytes]\n"));
    }
    text
}

/// Limits applied to a single child process.
#[derive(Debug, Clone)]
pub struct RunLimits {
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory; the rest is drained and dropped.
    pub output_limit_bytes: usize,
    pub cancel: CancelToken,
}

/// Run a command, feeding `stdin`, and capture stdout/stderr without risking
/// pipe deadlocks.
///
/// Output is read on helper threads while the child runs. The child is killed
/// when `limits.timeout` elapses or `limits.cancel` fires; the returned output
/// records which one happened.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs(), output_limit_bytes = limits.output_limit_bytes))]
pub fn run_command(mut cmd: Command, stdin: Option<&[u8]>, limits: &RunLimits) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = limits.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    // Written on its own thread so a child that never reads stdin cannot
    // stall the deadline and cancel checks below.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || {
                // A child that exits without reading stdin closes the pipe; that is not our error.
                if let Err(e) = child_stdin.write_all(&input) {
                    warn!(err = %e, "child closed stdin early");
                }
            }))
        }
        None => None,
    };

    let deadline = Instant::now() + limits.timeout;
    let mut interrupted = None;
    let status = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(timeout_secs = limits.timeout.as_secs(), "command timed out, killing");
            interrupted = Some(Interrupted::TimedOut);
        } else if limits.cancel.is_cancelled() {
            warn!("command cancelled, killing");
            interrupted = Some(Interrupted::Cancelled);
        }
        if interrupted.is_some() {
            child.kill().context("kill command")?;
            break child.wait().context("wait command after kill")?;
        }
        if let Some(status) = child
            .wait_timeout(remaining.min(CANCEL_POLL))
            .context("wait for command")?
        {
            break status;
        }
    };

    if let Some(handle) = stdin_handle {
        if handle.join().is_err() {
            warn!("stdin writer thread panicked");
        }
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), ?interrupted, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        interrupted,
    })
}

/// Run a short bookkeeping command and fail unless it exits zero.
pub fn run_checked(cmd: Command, stdin: Option<&[u8]>, limits: &RunLimits) -> Result<CommandOutput> {
    let label = format!("{:?}", cmd.get_program());
    let output = run_command(cmd, stdin, limits)?;
    if output.timed_out() {
        return Err(anyhow!("{label} timed out after {:?}", limits.timeout));
    }
    if output.cancelled() {
        return Err(anyhow!("{label} cancelled"));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "{label} failed with status {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(output)
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
