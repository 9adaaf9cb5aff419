/// Java toolchain descriptor (javac + java).
///
/// Submissions follow the `Main.java` / `Main` convention; the run step
/// executes `java -cp <workdir> Main`.
use crate::policy::FlagPolicy;
use crate::toolchain::{resolve_executable, stage_limits, Toolchain};
use crate::types::{ResourceLimits, Result};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct JavaToolchain;

impl Toolchain for JavaToolchain {
    fn language(&self) -> &'static str {
        "java"
    }

    fn source_file_name(&self) -> &'static str {
        "Main.java"
    }

    fn flag_policy(&self) -> FlagPolicy {
        // javac options are not exposed to callers.
        FlagPolicy::None
    }

    fn required_executables(&self) -> &'static [&'static str] {
        &["javac", "java"]
    }

    fn compile_command(&self, workdir: &Path, _flags: &[String]) -> Result<Option<Vec<String>>> {
        let javac = resolve_executable("javac")?;
        Ok(Some(vec![
            javac.to_string_lossy().to_string(),
            "-d".to_string(),
            workdir.to_string_lossy().to_string(),
            workdir
                .join(self.source_file_name())
                .to_string_lossy()
                .to_string(),
        ]))
    }

    fn run_command(&self, workdir: &Path) -> Result<Vec<String>> {
        let java = resolve_executable("java")?;
        Ok(vec![
            java.to_string_lossy().to_string(),
            "-XX:+UseSerialGC".to_string(),
            "-Xss8m".to_string(),
            "-cp".to_string(),
            workdir.to_string_lossy().to_string(),
            "Main".to_string(),
        ])
    }

    fn compile_limits(&self) -> ResourceLimits {
        stage_limits(768, 160, 30_000, 45_000)
    }

    fn run_limits(&self) -> ResourceLimits {
        // JVM needs threads and address space headroom even for trivial code.
        let mut limits = stage_limits(512, 48, 10_000, 15_000);
        limits.fd_limit = 128;
        limits
    }
}
