//! Agentbox: run CLI coding agents as supervised subprocesses.
//!
//! The engine launches an agent, streams its line-delimited JSON output
//! under an idle timeout and a wall-clock ceiling, detects the end of the
//! agent's turn from the stream itself, tears the process group down on
//! every exit path, retries with backoff, and reports a structured
//! [`Outcome`] with a typed error kind and diagnostics.

#![forbid(unsafe_code)]
// Public API types have docs; engine internals are documented where the
// invariants are not obvious from the types.
#![allow(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod protocol;
pub mod tools;

pub use crate::model::*;

pub use crate::engine::{invoke, ToolRun};
pub use crate::tools::{run_tool, ToolKind, ToolParams};
