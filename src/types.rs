/// Core types for the coderunner sandbox unit
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One untrusted submission, as handed over by the orchestrator.
///
/// Invariants enforced by [`ExecutionRequest::validate`]:
/// - source must be non-empty
/// - language tag must be non-empty (resolution happens in the registry)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language tag (e.g. "c", "cpp", "java", "python", "javascript")
    pub language: String,
    /// Untrusted source text
    pub source: Vec<u8>,
    /// Caller-approved compiler flags (validated against the flag policy)
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    /// Standard input payload fed to the running program
    #[serde(default)]
    pub stdin_data: Option<String>,
    /// Requested limit overrides; clamped to policy maxima, never trusted
    #[serde(default)]
    pub limit_overrides: LimitOverrides,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            compiler_flags: Vec::new(),
            stdin_data: None,
            limit_overrides: LimitOverrides::default(),
        }
    }

    /// Request-shape validation. Runs before any policy or filesystem work.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(SandboxError::Request("source must be non-empty".to_string()));
        }
        if self.language.trim().is_empty() {
            return Err(SandboxError::Request("language tag missing".to_string()));
        }
        Ok(())
    }
}

/// Requested limit overrides. Every field is optional; absent fields fall
/// back to the toolchain's stage envelope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LimitOverrides {
    pub cpu_time_ms: Option<u64>,
    pub wall_time_ms: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub process_limit: Option<u32>,
    pub output_limit_bytes: Option<u64>,
}

impl LimitOverrides {
    pub fn is_empty(&self) -> bool {
        self.cpu_time_ms.is_none()
            && self.wall_time_ms.is_none()
            && self.memory_bytes.is_none()
            && self.process_limit.is_none()
            && self.output_limit_bytes.is_none()
    }
}

/// Effective resource envelope for one stage (compile or run).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_time_ms: u64,
    pub wall_time_ms: u64,
    pub memory_bytes: u64,
    pub stack_bytes: u64,
    pub file_size_bytes: u64,
    pub process_limit: u32,
    pub fd_limit: u64,
    pub output_limit_bytes: u64,
}

impl ResourceLimits {
    pub fn cpu_time(&self) -> Duration {
        Duration::from_millis(self.cpu_time_ms)
    }

    pub fn wall_time(&self) -> Duration {
        Duration::from_millis(self.wall_time_ms)
    }
}

/// Run status taxonomy - closed set, limit violations are never folded
/// into Ok or plain runtime errors.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    /// Exit code 0, no violations
    #[serde(rename = "OK")]
    #[default]
    Ok,
    /// Non-zero exit code
    #[serde(rename = "RE")]
    RuntimeError,
    /// Fatal signal not attributable to a limit (e.g. SIGSEGV)
    #[serde(rename = "SIG")]
    Signaled,
    /// CPU or wall clock limit exceeded
    #[serde(rename = "TLE")]
    TimeLimit,
    /// Memory ceiling exceeded
    #[serde(rename = "MLE")]
    MemoryLimit,
    /// Output byte ceiling exceeded
    #[serde(rename = "OLE")]
    OutputLimit,
}

impl RunStatus {
    pub fn is_limit_violation(&self) -> bool {
        matches!(
            self,
            RunStatus::TimeLimit | RunStatus::MemoryLimit | RunStatus::OutputLimit
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Ok => "OK",
            RunStatus::RuntimeError => "RE",
            RunStatus::Signaled => "SIG",
            RunStatus::TimeLimit => "TLE",
            RunStatus::MemoryLimit => "MLE",
            RunStatus::OutputLimit => "OLE",
        };
        write!(f, "{}", s)
    }
}

/// Stream integrity marker. Truncation is always explicit; the caller can
/// never mistake a clipped stream for complete output.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamIntegrity {
    #[serde(rename = "complete")]
    #[default]
    Complete,
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
    #[serde(rename = "read_error")]
    ReadError,
}

/// Compile-stage outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildResult {
    /// Compiler exit code (0 on success; None when killed by a signal)
    pub exit_code: Option<i32>,
    /// Compiler diagnostics (stderr, with stdout folded in when stderr is empty)
    pub diagnostics: String,
    /// Wall time spent compiling, seconds
    pub wall_time: f64,
    /// True when the language has no compile stage
    pub skipped: bool,
    /// True when the compile stage itself hit a limit
    pub limit_exceeded: bool,
}

impl BuildResult {
    /// Build stage placeholder for interpreted languages.
    pub fn skipped() -> Self {
        Self {
            exit_code: Some(0),
            diagnostics: String::new(),
            wall_time: 0.0,
            skipped: true,
            limit_exceeded: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.limit_exceeded
    }
}

/// Run-stage outcome.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// Exit code on normal termination
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_integrity: StreamIntegrity,
    pub stderr_integrity: StreamIntegrity,
    /// Wall clock time, seconds
    pub wall_time: f64,
    /// CPU time, seconds (best-effort, sampled from /proc)
    pub cpu_time: f64,
    /// Peak resident set size in bytes (best-effort, sampled from /proc)
    pub memory_peak: u64,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Ok
    }
}

/// Full per-request report returned to the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Unique request id (also names the workspace directory)
    pub request_id: String,
    pub language: String,
    pub build: BuildResult,
    /// Absent when the build failed
    pub run: Option<RunResult>,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.build.success() && self.run.as_ref().is_some_and(RunResult::success)
    }
}

/// Sandbox error taxonomy. User-attributable outcomes (compile errors,
/// runtime errors, limit violations) are reported inside results, never
/// through this enum; errors here terminate the request.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request (empty source, missing language tag)
    #[error("Invalid request: {0}")]
    Request(String),

    /// No toolchain registered for the requested language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Disallowed compiler flag or limit override - rejected fail-closed
    /// before any compiler process is spawned
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Toolchain executable missing from the image
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// Working directory could not be provisioned or torn down
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Privilege de-escalation failed or precondition not met
    #[error("Privilege error: {0}")]
    Privilege(String),

    /// Child process management failure
    #[error("Process error: {0}")]
    Process(String),
}

impl SandboxError {
    /// Policy violations are caller mistakes; everything else is an
    /// infrastructure failure and the instance must be discarded.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            SandboxError::Policy(_)
                | SandboxError::Request(_)
                | SandboxError::UnsupportedLanguage(_)
        )
    }
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

impl From<nix::errno::Errno> for SandboxError {
    fn from(err: nix::errno::Errno) -> Self {
        SandboxError::Process(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_rejected() {
        let request = ExecutionRequest::new("c", Vec::<u8>::new());
        assert!(matches!(request.validate(), Err(SandboxError::Request(_))));
    }

    #[test]
    fn blank_language_is_rejected() {
        let request = ExecutionRequest::new("  ", b"int main(){}".to_vec());
        assert!(request.validate().is_err());
    }

    #[test]
    fn valid_request_passes_validation() {
        let request = ExecutionRequest::new("c", b"int main(){return 0;}".to_vec());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn limit_violations_are_distinct_from_success() {
        assert!(RunStatus::TimeLimit.is_limit_violation());
        assert!(RunStatus::MemoryLimit.is_limit_violation());
        assert!(RunStatus::OutputLimit.is_limit_violation());
        assert!(!RunStatus::Ok.is_limit_violation());
        assert!(!RunStatus::RuntimeError.is_limit_violation());
        assert!(!RunStatus::Signaled.is_limit_violation());
    }

    #[test]
    fn status_serialization_uses_stable_tags() {
        let tag = serde_json::to_string(&RunStatus::TimeLimit).unwrap();
        assert_eq!(tag, "\"TLE\"");
        let tag = serde_json::to_string(&RunStatus::OutputLimit).unwrap();
        assert_eq!(tag, "\"OLE\"");
    }

    #[test]
    fn skipped_build_counts_as_success() {
        let build = BuildResult::skipped();
        assert!(build.success());
        assert!(build.skipped);
    }

    #[test]
    fn policy_errors_are_user_attributable() {
        assert!(SandboxError::Policy("flag".to_string()).is_policy_violation());
        assert!(SandboxError::Request("empty".to_string()).is_policy_violation());
        assert!(!SandboxError::Privilege("euid".to_string()).is_policy_violation());
        assert!(!SandboxError::Toolchain("gcc".to_string()).is_policy_violation());
    }
}
