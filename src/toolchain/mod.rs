//! Language toolchain descriptors.
//!
//! The sandbox core stays language-agnostic. Each supported language is a
//! variant of one polymorphic descriptor: compile command, artifact-run
//! command, and per-stage resource envelopes.

pub mod c_family;
pub mod interpreted;
pub mod java;
pub mod registry;

use crate::policy::FlagPolicy;
use crate::types::{ResourceLimits, Result, SandboxError};
use std::path::{Path, PathBuf};

pub use registry::{supported_languages, toolchain_for};

/// Toolchain contract for language-specific compile/run stages.
pub trait Toolchain: Send + Sync + std::fmt::Debug {
    /// Canonical language tag
    fn language(&self) -> &'static str;
    /// File name the source is written under inside the workspace
    fn source_file_name(&self) -> &'static str;
    /// Flag vocabulary this toolchain accepts from the caller
    fn flag_policy(&self) -> FlagPolicy;
    /// Executables that must be present in the image
    fn required_executables(&self) -> &'static [&'static str];
    /// Compile command, or None for languages without a compile stage
    fn compile_command(&self, workdir: &Path, flags: &[String]) -> Result<Option<Vec<String>>>;
    /// Command that runs the compiled artifact (or the source directly)
    fn run_command(&self, workdir: &Path) -> Result<Vec<String>>;
    /// Compile-stage envelope (wider: compilers fan out helper processes)
    fn compile_limits(&self) -> ResourceLimits;
    /// Run-stage envelope
    fn run_limits(&self) -> ResourceLimits;
}

/// Directories searched when resolving toolchain executables. Matches the
/// PATH baked into the execution image; nothing outside these is ever run.
const SECURE_PATH_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/bin"];

/// Resolve an executable name inside the secure PATH. Absolute paths are
/// not accepted; the toolchain names its tools, the image provides them.
pub fn resolve_executable(name: &str) -> Result<PathBuf> {
    for dir in SECURE_PATH_DIRS {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(SandboxError::Toolchain(format!(
        "executable '{}' not found in {}",
        name,
        SECURE_PATH_DIRS.join(":")
    )))
}

/// Probe whether every executable a toolchain needs is installed.
pub fn check_executables(toolchain: &dyn Toolchain) -> Vec<(&'static str, Option<PathBuf>)> {
    toolchain
        .required_executables()
        .iter()
        .map(|name| (*name, resolve_executable(name).ok()))
        .collect()
}

/// Shared envelope constructor used by the per-language descriptors.
pub(crate) fn stage_limits(
    memory_mb: u64,
    process_limit: u32,
    cpu_ms: u64,
    wall_ms: u64,
) -> ResourceLimits {
    ResourceLimits {
        cpu_time_ms: cpu_ms,
        wall_time_ms: wall_ms,
        memory_bytes: memory_mb * 1024 * 1024,
        stack_bytes: 8 * 1024 * 1024,
        file_size_bytes: 16 * 1024 * 1024,
        process_limit,
        fd_limit: 64,
        output_limit_bytes: 1024 * 1024,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_missing_executables() {
        let result = resolve_executable("definitely-not-a-real-compiler");
        assert!(matches!(result, Err(SandboxError::Toolchain(_))));
    }

    #[test]
    fn resolve_finds_sh() {
        // /bin/sh exists on every supported image.
        let path = resolve_executable("sh").unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn stage_limits_scale_memory_to_bytes() {
        let limits = stage_limits(256, 1, 10_000, 15_000);
        assert_eq!(limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(limits.process_limit, 1);
    }
}
