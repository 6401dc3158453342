//! Side-effecting operations: files, processes, git, SQLite, environments
//! and oracle transports.

pub mod config;
pub mod environment;
pub mod executor;
pub mod git;
pub mod init;
pub mod oracle;
pub mod process;
pub mod store;
