//! Sandbox: bounded, process-isolated execution of candidate code.
//!
//! Each call runs in a fresh interpreter process placed in its own process
//! group and scratch directory. Whatever the candidate does, the caller gets
//! back a tagged [`ExecutionOutcome`]; sandbox faults never escape as errors.
//!
//! # Modules
//!
//! - [`execution`] — `SandboxConfig`, `Sandbox::execute()` / `execute_timed()`
//! - [`outcome`]   — `ExecutionOutcome`, `Execution`, `median()`
//! - [`error`]     — `SandboxError` / `SandboxResult` (internal launch faults)

pub mod error;
pub mod execution;
pub mod outcome;

pub use error::{SandboxError, SandboxResult};
pub use execution::{Sandbox, SandboxConfig};
pub use outcome::{median, Execution, ExecutionOutcome};
