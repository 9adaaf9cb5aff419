/// Interpreted language descriptors (python3, node).
///
/// No compile stage; the build step is reported as skipped and the run
/// step executes the source directly.
use crate::policy::FlagPolicy;
use crate::toolchain::{resolve_executable, stage_limits, Toolchain};
use crate::types::{ResourceLimits, Result};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct PythonToolchain;

impl Toolchain for PythonToolchain {
    fn language(&self) -> &'static str {
        "python"
    }

    fn source_file_name(&self) -> &'static str {
        "main.py"
    }

    fn flag_policy(&self) -> FlagPolicy {
        FlagPolicy::None
    }

    fn required_executables(&self) -> &'static [&'static str] {
        &["python3"]
    }

    fn compile_command(&self, _workdir: &Path, _flags: &[String]) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    fn run_command(&self, workdir: &Path) -> Result<Vec<String>> {
        let python = resolve_executable("python3")?;
        Ok(vec![
            python.to_string_lossy().to_string(),
            // -B: no bytecode cache files in the workspace; -u: unbuffered
            // streams so partial output survives a limit kill.
            "-B".to_string(),
            "-u".to_string(),
            workdir
                .join(self.source_file_name())
                .to_string_lossy()
                .to_string(),
        ])
    }

    fn compile_limits(&self) -> ResourceLimits {
        self.run_limits()
    }

    fn run_limits(&self) -> ResourceLimits {
        stage_limits(256, 1, 10_000, 15_000)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JavaScriptToolchain;

impl Toolchain for JavaScriptToolchain {
    fn language(&self) -> &'static str {
        "javascript"
    }

    fn source_file_name(&self) -> &'static str {
        "main.js"
    }

    fn flag_policy(&self) -> FlagPolicy {
        FlagPolicy::None
    }

    fn required_executables(&self) -> &'static [&'static str] {
        &["node"]
    }

    fn compile_command(&self, _workdir: &Path, _flags: &[String]) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    fn run_command(&self, workdir: &Path) -> Result<Vec<String>> {
        let node = resolve_executable("node")?;
        Ok(vec![
            node.to_string_lossy().to_string(),
            workdir
                .join(self.source_file_name())
                .to_string_lossy()
                .to_string(),
        ])
    }

    fn compile_limits(&self) -> ResourceLimits {
        self.run_limits()
    }

    fn run_limits(&self) -> ResourceLimits {
        // V8 spawns worker threads and reserves large address ranges.
        let mut limits = stage_limits(512, 32, 10_000, 15_000);
        limits.fd_limit = 128;
        limits
    }
}
