//! Dispatch of a single action against an environment.
//!
//! [`ActionExecutor::execute`] never fails: every fault is folded into a
//! failed [`AttemptResult`] so the engine only ever sees outcomes.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use reqwest::blocking::Client;
use tracing::{debug, info, instrument, warn};

use crate::core::action::{Action, ActionKind, HttpParams, ReasoningParams};
use crate::core::cancel::CancelToken;
use crate::core::task::AttemptResult;
use crate::core::types::{ActionOutputs, AttemptError, ErrorKind, FileContent};
use crate::error::EngineError;
use crate::io::environment::{Environment, ExecOutput};
use crate::io::oracle::{ActionGenerator, OracleCall, clip};
use crate::io::process::{Interrupted, RunLimits};

/// Bounds for one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub timeout: Duration,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    http: Client,
    output_limit_bytes: usize,
}

/// Internal outcome before it is stamped into an [`AttemptResult`].
type Outcome = std::result::Result<Option<ActionOutputs>, (AttemptError, Option<ActionOutputs>)>;

impl ActionExecutor {
    pub fn new(output_limit_bytes: usize) -> Result<Self> {
        let http = Client::builder().build().context("build http client")?;
        Ok(Self {
            http,
            output_limit_bytes,
        })
    }

    /// Write `files`, then run `action`.
    ///
    /// A failed file write aborts the attempt before the action runs.
    #[instrument(skip_all, fields(action_id = %action.id, action_type = %action.action_type(), files = files.len()))]
    pub fn execute<E: Environment, G: ActionGenerator>(
        &self,
        env: &mut E,
        generator: &mut G,
        action: &Action,
        files: &[FileContent],
        dispatch: &Dispatch,
    ) -> AttemptResult {
        let outcome = self.dispatch(env, generator, action, files, dispatch);
        match outcome {
            Ok(outputs) => {
                info!("action succeeded");
                AttemptResult::success(action.clone(), outputs)
            }
            Err((error, outputs)) => {
                warn!(code = %error.code, message = %error.message, "action failed");
                AttemptResult::failure(action.clone(), error, outputs)
            }
        }
    }

    fn dispatch<E: Environment, G: ActionGenerator>(
        &self,
        env: &mut E,
        generator: &mut G,
        action: &Action,
        files: &[FileContent],
        dispatch: &Dispatch,
    ) -> Outcome {
        if !files.is_empty() {
            env.write_files(files).map_err(|err| {
                (
                    AttemptError::new(ErrorKind::ExecutionError, format!("file write failed: {err:#}")),
                    None,
                )
            })?;
        }

        match &action.kind {
            ActionKind::Shell(params) => {
                let output = env.run_shell(&params.command, &self.limits(dispatch));
                self.process_outcome(output)
            }
            ActionKind::EnvironmentOp(params) => {
                let output = env.run_program(&params.program, &params.args, &self.limits(dispatch));
                self.process_outcome(output)
            }
            ActionKind::Files(params) => {
                env.write_files(&params.files).map_err(|err| {
                    (
                        AttemptError::new(ErrorKind::ExecutionError, format!("file write failed: {err:#}")),
                        None,
                    )
                })?;
                Ok(Some(ActionOutputs {
                    result: Some(format!("wrote {} file(s)", params.files.len())),
                    ..ActionOutputs::default()
                }))
            }
            ActionKind::Http(params) => self.http_outcome(params, dispatch),
            ActionKind::ReasoningCall(params) => reasoning_outcome(generator, params, dispatch),
            ActionKind::Custom(_) => Err((
                AttemptError::new(
                    ErrorKind::UnsupportedAction,
                    "custom actions have no execution strategy",
                ),
                None,
            )),
        }
    }

    fn limits(&self, dispatch: &Dispatch) -> RunLimits {
        RunLimits {
            timeout: dispatch.timeout,
            output_limit_bytes: self.output_limit_bytes,
            cancel: dispatch.cancel.clone(),
        }
    }

    fn process_outcome(&self, output: Result<ExecOutput>) -> Outcome {
        let output = output.map_err(|err| {
            (
                AttemptError::new(ErrorKind::ExecutionError, format!("{err:#}")),
                None,
            )
        })?;
        let outputs = ActionOutputs {
            stdout: non_empty(&output.stdout),
            stderr: non_empty(&output.stderr),
            exit_code: output.exit_code,
            ..ActionOutputs::default()
        };
        debug!(exit_code = ?output.exit_code, "process finished");
        if output.success() {
            return Ok(Some(outputs));
        }
        let error = match (output.interrupted, output.exit_code) {
            (Some(Interrupted::TimedOut), _) => AttemptError::new(ErrorKind::Timeout, "command timed out"),
            (Some(Interrupted::Cancelled), _) => {
                AttemptError::new(ErrorKind::ExecutionError, "command interrupted by cancellation")
            }
            (None, Some(code)) => {
                AttemptError::new(ErrorKind::ExecutionError, format!("exit status {code}"))
            }
            (None, None) => AttemptError::new(ErrorKind::ExecutionError, "terminated by signal"),
        };
        Err((error, Some(outputs)))
    }

    #[instrument(skip_all, fields(method = %params.method, url = %params.url))]
    fn http_outcome(&self, params: &HttpParams, dispatch: &Dispatch) -> Outcome {
        if dispatch.cancel.is_cancelled() {
            return Err((
                AttemptError::new(ErrorKind::ExecutionError, "request interrupted by cancellation"),
                None,
            ));
        }
        let method = Method::from_bytes(params.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            (
                AttemptError::new(
                    ErrorKind::ExecutionError,
                    format!("invalid http method '{}'", params.method),
                ),
                None,
            )
        })?;
        let mut request = self
            .http
            .request(method, &params.url)
            .timeout(dispatch.timeout);
        for (name, value) in &params.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &params.body {
            request = request.body(body.clone());
        }

        let response = request.send().map_err(|err| (http_error(&err), None))?;
        let status = response.status();
        let body = response.text().map_err(|err| (http_error(&err), None))?;
        let outputs = ActionOutputs {
            result: Some(self.clip_output(&body)),
            http_status: Some(status.as_u16()),
            ..ActionOutputs::default()
        };
        if status.is_success() {
            Ok(Some(outputs))
        } else {
            Err((
                AttemptError::new(ErrorKind::ExecutionError, format!("http status {status}")),
                Some(outputs),
            ))
        }
    }

    fn clip_output(&self, text: &str) -> String {
        let kept = clip(text, self.output_limit_bytes);
        if kept.len() == text.len() {
            return text.to_string();
        }
        format!("{kept}\n[result truncated {} bytes]\n", text.len() - kept.len())
    }
}

fn reasoning_outcome<G: ActionGenerator>(
    generator: &mut G,
    params: &ReasoningParams,
    dispatch: &Dispatch,
) -> Outcome {
    let call = OracleCall {
        timeout: dispatch.timeout,
        cancel: dispatch.cancel.clone(),
    };
    match generator.complete(&params.messages, &params.options, &call) {
        Ok(text) => Ok(Some(ActionOutputs {
            result: Some(text),
            ..ActionOutputs::default()
        })),
        Err(err) => Err((oracle_error(&err), None)),
    }
}

/// Attempt error for a failed oracle round-trip.
pub fn oracle_error(err: &anyhow::Error) -> AttemptError {
    let code = err
        .downcast_ref::<EngineError>()
        .and_then(EngineError::kind)
        .unwrap_or(ErrorKind::OracleError);
    AttemptError::new(code, format!("{err:#}"))
}

fn http_error(err: &reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::new(ErrorKind::Timeout, "http request timed out")
    } else {
        AttemptError::new(ErrorKind::ExecutionError, format!("http request failed: {err}"))
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}
