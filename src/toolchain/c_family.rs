/// C and C++ toolchain descriptors (gcc / g++).
use crate::policy::FlagPolicy;
use crate::toolchain::{resolve_executable, stage_limits, Toolchain};
use crate::types::{ResourceLimits, Result};
use std::path::Path;

/// Default flags applied before any caller-approved flags.
const C_BASE_FLAGS: &[&str] = &["-O2", "-pipe"];
const CPP_BASE_FLAGS: &[&str] = &["-std=c++17", "-O2", "-pipe"];

/// Artifact name inside the workspace.
pub const ARTIFACT_NAME: &str = "main";

fn c_family_compile_command(
    compiler: &str,
    base_flags: &[&str],
    source_name: &str,
    workdir: &Path,
    flags: &[String],
) -> Result<Vec<String>> {
    let compiler_path = resolve_executable(compiler)?;
    let mut command = vec![compiler_path.to_string_lossy().to_string()];
    command.extend(base_flags.iter().map(|f| f.to_string()));
    command.extend(flags.iter().cloned());
    command.push("-o".to_string());
    command.push(workdir.join(ARTIFACT_NAME).to_string_lossy().to_string());
    command.push(workdir.join(source_name).to_string_lossy().to_string());
    Ok(command)
}

fn c_family_run_command(workdir: &Path) -> Vec<String> {
    vec![workdir.join(ARTIFACT_NAME).to_string_lossy().to_string()]
}

#[derive(Debug, Clone, Default)]
pub struct CToolchain;

impl Toolchain for CToolchain {
    fn language(&self) -> &'static str {
        "c"
    }

    fn source_file_name(&self) -> &'static str {
        "main.c"
    }

    fn flag_policy(&self) -> FlagPolicy {
        FlagPolicy::CFamily
    }

    fn required_executables(&self) -> &'static [&'static str] {
        &["gcc"]
    }

    fn compile_command(&self, workdir: &Path, flags: &[String]) -> Result<Option<Vec<String>>> {
        c_family_compile_command("gcc", C_BASE_FLAGS, self.source_file_name(), workdir, flags)
            .map(Some)
    }

    fn run_command(&self, workdir: &Path) -> Result<Vec<String>> {
        Ok(c_family_run_command(workdir))
    }

    fn compile_limits(&self) -> ResourceLimits {
        // Compiler fans out cc1/as/ld; needs process and memory headroom.
        stage_limits(768, 120, 30_000, 45_000)
    }

    fn run_limits(&self) -> ResourceLimits {
        stage_limits(256, 1, 10_000, 15_000)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CppToolchain;

impl Toolchain for CppToolchain {
    fn language(&self) -> &'static str {
        "cpp"
    }

    fn source_file_name(&self) -> &'static str {
        "main.cpp"
    }

    fn flag_policy(&self) -> FlagPolicy {
        FlagPolicy::CFamily
    }

    fn required_executables(&self) -> &'static [&'static str] {
        &["g++"]
    }

    fn compile_command(&self, workdir: &Path, flags: &[String]) -> Result<Option<Vec<String>>> {
        c_family_compile_command(
            "g++",
            CPP_BASE_FLAGS,
            self.source_file_name(),
            workdir,
            flags,
        )
        .map(Some)
    }

    fn run_command(&self, workdir: &Path) -> Result<Vec<String>> {
        Ok(c_family_run_command(workdir))
    }

    fn compile_limits(&self) -> ResourceLimits {
        stage_limits(768, 160, 30_000, 45_000)
    }

    fn run_limits(&self) -> ResourceLimits {
        stage_limits(256, 1, 10_000, 15_000)
    }
}
