//! coderunner: the sandboxed compile-and-execute unit of a code-execution
//! backend.
//!
//! One [`types::ExecutionRequest`] maps to one isolated
//! [`workspace::Workspace`]; the [`unit::SandboxUnit`] compiles the
//! submission under a clamped resource envelope, runs the artifact under a
//! fixed non-privileged [`identity::SandboxIdentity`], and returns a
//! structured [`types::ExecutionReport`].
//!
//! # Architecture
//!
//! - [`types`]: request/report types, closed status taxonomy, error enum
//! - [`policy`]: fail-closed flag allowlist and limit override clamping
//! - [`toolchain`]: polymorphic language descriptors (C, C++, Java,
//!   Python, JavaScript) behind one trait
//! - [`identity`]: privilege de-escalation (setresgid before setresuid,
//!   verified, no_new_privs) as an explicit precondition on the request path
//! - [`workspace`]: per-request uuid directories with Drop-backed teardown
//! - [`exec`]: rlimit installation, bounded output collection, /proc usage
//!   sampling, evidence-based classification, wall-clock watchdog
//! - [`unit`]: request orchestration (validate -> policy -> compile ->
//!   run -> teardown)
//! - [`audit`]: structured JSON lifecycle events through the `log` facade
//!
//! # Design principles
//!
//! 1. **Fail closed** - policy runs before any compiler process exists
//! 2. **Kernel as truth** - evidence from wait status, rlimits, /proc
//! 3. **Nothing persists** - workspace teardown is unconditional
//! 4. **Limits are policy** - request overrides are clamped, never trusted

pub mod audit;
pub mod cli;
pub mod exec;
pub mod identity;
pub mod policy;
pub mod toolchain;
pub mod types;
pub mod unit;
pub mod workspace;

pub use types::{
    BuildResult, ExecutionReport, ExecutionRequest, LimitOverrides, ResourceLimits, Result,
    RunResult, RunStatus, SandboxError, StreamIntegrity,
};
pub use unit::SandboxUnit;
