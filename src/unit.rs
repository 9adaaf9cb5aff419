//! The sandbox unit: one Execution Request in, one structured report out.
//!
//! Orchestration order is fixed and fail-closed: validate -> flag policy ->
//! clamp limits -> provision workspace -> compile -> run -> teardown. The
//! compiler runs under the same unprivileged identity as the payload;
//! compiler input handling is not trusted against adversarial source.

use crate::audit;
use crate::exec::{ExecutionProfile, ProcessRunner};
use crate::identity::SandboxIdentity;
use crate::policy::{flags, LimitPolicy};
use crate::toolchain::{toolchain_for, Toolchain};
use crate::types::{
    BuildResult, ExecutionReport, ExecutionRequest, LimitOverrides, Result, RunResult,
};
use crate::workspace::{default_base_dir, Workspace};
use std::path::PathBuf;

/// Immutable per-instance configuration: base directory, sandbox identity,
/// and limit policy. Established once, never mutated at request time.
pub struct SandboxUnit {
    base_dir: PathBuf,
    identity: Option<SandboxIdentity>,
    limit_policy: LimitPolicy,
}

impl SandboxUnit {
    /// Unit with the platform defaults: uid-scoped base directory, and a
    /// drop to nobody/nogroup when (and only when) running privileged.
    pub fn new() -> Self {
        let identity = if nix::unistd::geteuid().is_root() {
            Some(SandboxIdentity::default())
        } else {
            // Image already switched to the sandbox account at build time.
            None
        };
        Self {
            base_dir: default_base_dir(),
            identity,
            limit_policy: LimitPolicy::default(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: PathBuf) -> Self {
        self.base_dir = base_dir;
        self
    }

    pub fn with_identity(mut self, identity: SandboxIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_limit_policy(mut self, policy: LimitPolicy) -> Self {
        self.limit_policy = policy;
        self
    }

    /// Execute one request end to end. User-attributable outcomes (compile
    /// errors, crashes, limit violations) come back inside the report;
    /// `Err` means policy rejection or infrastructure failure and the
    /// instance must not be reused.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        request.validate()?;
        let toolchain = toolchain_for(&request.language)?;

        // Fail closed before anything touches the filesystem or a process.
        if let Err(e) = flags::validate(toolchain.flag_policy(), &request.compiler_flags) {
            audit::events::policy_rejection(toolchain.language(), &e.to_string());
            return Err(e);
        }

        let mut workspace = Workspace::provision(&self.base_dir, self.identity.as_ref())?;
        audit::events::request_received(workspace.request_id(), toolchain.language());

        let report = self.execute_in_workspace(&*toolchain, request, &mut workspace);
        match &report {
            Ok(report) => {
                let outcome = report
                    .run
                    .as_ref()
                    .map(|r| r.status.to_string())
                    .unwrap_or_else(|| "compile_error".to_string());
                audit::events::request_finished(&report.request_id, &outcome);
            }
            Err(e) => {
                audit::events::infrastructure_failure(workspace.request_id(), &e.to_string());
            }
        }

        // Unconditional teardown; Drop covers panic and early-return paths.
        workspace.teardown();
        report
    }

    fn execute_in_workspace(
        &self,
        toolchain: &dyn Toolchain,
        request: &ExecutionRequest,
        workspace: &mut Workspace,
    ) -> Result<ExecutionReport> {
        workspace.write_source(
            toolchain.source_file_name(),
            &request.source,
            self.identity.as_ref(),
        )?;

        let build = self.compile_stage(toolchain, request, workspace)?;
        if !build.success() {
            return Ok(ExecutionReport {
                request_id: workspace.request_id().to_string(),
                language: toolchain.language().to_string(),
                build,
                run: None,
            });
        }

        let run = self.run_stage(toolchain, request, workspace)?;
        Ok(ExecutionReport {
            request_id: workspace.request_id().to_string(),
            language: toolchain.language().to_string(),
            build,
            run: Some(run),
        })
    }

    fn compile_stage(
        &self,
        toolchain: &dyn Toolchain,
        request: &ExecutionRequest,
        workspace: &Workspace,
    ) -> Result<BuildResult> {
        let Some(command) =
            toolchain.compile_command(workspace.run_dir(), &request.compiler_flags)?
        else {
            return Ok(BuildResult::skipped());
        };

        // Compile envelope is fixed by the toolchain; request overrides
        // only shape the run stage. Policy ceilings still apply.
        let limits = self
            .limit_policy
            .apply(&toolchain.compile_limits(), &LimitOverrides::default());

        let result = ProcessRunner::new(ExecutionProfile {
            command,
            workdir: workspace.run_dir().to_path_buf(),
            stdin_data: None,
            identity: self.identity,
            limits,
        })
        .run()?;

        Ok(build_result_from(result))
    }

    fn run_stage(
        &self,
        toolchain: &dyn Toolchain,
        request: &ExecutionRequest,
        workspace: &Workspace,
    ) -> Result<RunResult> {
        let command = toolchain.run_command(workspace.run_dir())?;
        let limits = self
            .limit_policy
            .apply(&toolchain.run_limits(), &request.limit_overrides);

        ProcessRunner::new(ExecutionProfile {
            command,
            workdir: workspace.run_dir().to_path_buf(),
            stdin_data: request.stdin_data.clone(),
            identity: self.identity,
            limits,
        })
        .run()
    }

    /// Probe every registered toolchain for missing executables. Missing
    /// tools are infrastructure defects, reported before any request runs.
    pub fn check_toolchains(&self) -> Vec<(String, Vec<(&'static str, bool)>)> {
        crate::toolchain::supported_languages()
            .iter()
            .filter_map(|tag| toolchain_for(tag).ok())
            .map(|toolchain| {
                let probes = crate::toolchain::check_executables(&*toolchain)
                    .into_iter()
                    .map(|(name, path)| (name, path.is_some()))
                    .collect();
                (toolchain.language().to_string(), probes)
            })
            .collect()
    }
}

impl Default for SandboxUnit {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a compile-stage process result into the build report: diagnostics
/// are stderr, with stdout as fallback (some compilers report there).
fn build_result_from(result: RunResult) -> BuildResult {
    let diagnostics = if !result.stderr.trim().is_empty() {
        result.stderr
    } else {
        result.stdout
    };
    BuildResult {
        exit_code: result.exit_code,
        diagnostics,
        wall_time: result.wall_time,
        skipped: false,
        limit_exceeded: result.status.is_limit_violation(),
    }
}
