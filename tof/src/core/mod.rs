//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod budget;
pub mod cancel;
pub mod immutability;
pub mod selector;
pub mod status;
pub mod task;
pub mod types;
