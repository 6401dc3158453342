//! Task execution and backtracking engine.
//!
//! A goal is broken into a tree of [`core::task::TaskNode`]s. For each node
//! the engine asks an oracle for the next action, runs it in an execution
//! environment, records the attempt, and on failure either retries locally
//! or backtracks to an ancestor, restoring the environment from snapshots
//! taken along the way.
//!
//! - **[`core`]**: Pure data and rules (tasks, actions, status transitions,
//!   budgets, backtrack selection). No I/O.
//! - **[`io`]**: Side effects (SQLite store, git and docker environments,
//!   subprocesses, oracle transports, configuration).
//!
//! [`engine`], [`snapshot`] and [`workspace`] combine the two to implement
//! the CLI commands; [`report`] renders stored history.

pub mod core;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
pub mod snapshot;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;
