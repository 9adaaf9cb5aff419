/// Sandboxed process execution and monitoring.
///
/// One runner executes one command (compile or run stage) under the full
/// containment contract: privilege precondition asserted in the parent,
/// rlimits and identity drop installed in the pre-exec hook, bounded output
/// collection, and a wall-clock watchdog with SIGTERM -> SIGKILL
/// escalation. A hung submission can never hold the instance past its wall
/// envelope plus the grace window.
use crate::audit;
use crate::exec::classify::{classify, WaitEvidence};
use crate::exec::output::{spawn_collector, CollectedStream};
use crate::exec::{rlimits, usage};
use crate::identity::{self, SandboxIdentity};
use crate::types::{ResourceLimits, Result, RunResult, SandboxError};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Everything needed to execute one stage.
#[derive(Clone, Debug)]
pub struct ExecutionProfile {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub stdin_data: Option<String>,
    pub identity: Option<SandboxIdentity>,
    pub limits: ResourceLimits,
}

/// Grace between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(100);
/// Poll interval for the wait loop.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct ProcessRunner {
    profile: ExecutionProfile,
}

impl ProcessRunner {
    pub fn new(profile: ExecutionProfile) -> Self {
        Self { profile }
    }

    /// Execute the profile's command to completion (or termination) and
    /// return the classified result. Errors are infrastructure failures;
    /// user outcomes - crashes and limit violations included - come back
    /// as an Ok(RunResult).
    pub fn run(&self) -> Result<RunResult> {
        let profile = &self.profile;
        if profile.command.is_empty() {
            return Err(SandboxError::Process("empty command".to_string()));
        }

        // Assert-then-proceed: no untrusted input ever reaches a child that
        // could hold a privileged identity.
        identity::assert_drop_precondition(profile.identity.as_ref())?;

        let mut cmd = Command::new(&profile.command[0]);
        cmd.args(&profile.command[1..]);
        cmd.current_dir(&profile.workdir);

        // Minimal, fixed environment; nothing leaks from the host process.
        cmd.env_clear();
        cmd.env("PATH", "/usr/local/bin:/usr/bin:/bin");
        cmd.env("HOME", &profile.workdir);
        cmd.env("TMPDIR", &profile.workdir);

        cmd.stdin(if profile.stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let limits = profile.limits.clone();
        let drop_identity = profile.identity;
        // RLIMIT_NPROC counts processes per real uid, so the ceiling is the
        // target uid's live count at spawn time plus this stage's allowance.
        let target_uid = match drop_identity {
            Some(identity) => identity.uid(),
            // SAFETY: getuid reads the credential, no side effects.
            None => unsafe { libc::getuid() },
        };
        let nproc_ceiling = usage::count_processes_for_uid(target_uid)
            .saturating_add(limits.process_limit as u64);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: the closure runs between fork and exec and only calls
            // async-signal-safe functions (setsid, setrlimit, set*id, prctl).
            unsafe {
                cmd.pre_exec(move || {
                    // Own session: the watchdog signals the whole group.
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    rlimits::apply(&limits)?;
                    if let Some(ref identity) = drop_identity {
                        identity::drop_in_child(identity)?;
                    }
                    // After the uid switch, so setresuid itself is never
                    // counted against the ceiling.
                    rlimits::apply_process_limit(nproc_ceiling)?;
                    Ok(())
                });
            }
        }

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::Process(format!("failed to spawn process: {}", e)))?;
        let pid = child.id();

        // Fed from its own thread, symmetric with the output collectors: a
        // payload larger than the pipe buffer against a child that never
        // reads stdin must not stall the watchdog loop.
        let stdin_writer = profile.stdin_data.clone().and_then(|data| {
            child.stdin.take().map(|mut stdin| {
                thread::spawn(move || {
                    // Child may exit without reading; a broken pipe is fine.
                    let _ = stdin.write_all(data.as_bytes());
                })
            })
        });

        let output_limit = profile.limits.output_limit_bytes as usize;
        let stdout_hit = Arc::new(AtomicBool::new(false));
        let stderr_hit = Arc::new(AtomicBool::new(false));
        let stdout_handle = child
            .stdout
            .take()
            .map(|s| spawn_collector(s, output_limit, stdout_hit.clone()));
        let stderr_handle = child
            .stderr
            .take()
            .map(|s| spawn_collector(s, output_limit, stderr_hit.clone()));

        let wall_limit = profile.limits.wall_time();
        let mut last_sample = usage::UsageSample::default();
        let mut watchdog_killed = false;
        let mut output_killed = false;

        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(sample) = usage::sample(pid) {
                        last_sample = sample;
                    }

                    let elapsed = start.elapsed();
                    if elapsed >= wall_limit {
                        audit::events::limit_violation(pid, "wall_time", elapsed.as_millis() as u64);
                        watchdog_killed = true;
                        terminate_group(pid);
                        break wait_after_kill(&mut child)?;
                    }

                    if stdout_hit.load(Ordering::Acquire) || stderr_hit.load(Ordering::Acquire) {
                        audit::events::limit_violation(pid, "output_bytes", output_limit as u64);
                        output_killed = true;
                        terminate_group(pid);
                        break wait_after_kill(&mut child)?;
                    }

                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    // The child is unreaped; kill and collect before bailing.
                    terminate_group(pid);
                    let _ = child.wait();
                    return Err(SandboxError::Process(format!(
                        "process monitoring error: {}",
                        e
                    )));
                }
            }
        };

        let wall_time = start.elapsed().as_secs_f64();
        let stdout = join_collector(stdout_handle);
        let stderr = join_collector(stderr_handle);
        // The child is gone, so the write end sees EPIPE and the thread ends.
        if let Some(writer) = stdin_writer {
            let _ = writer.join();
        }

        let evidence = WaitEvidence {
            exit_code: exit_status.code(),
            signal: exit_status.signal(),
            watchdog_killed,
            output_limit_hit: output_killed
                || stdout_hit.load(Ordering::Acquire)
                || stderr_hit.load(Ordering::Acquire),
            cpu_time: last_sample.cpu_time,
            peak_rss_bytes: last_sample.peak_rss_bytes,
        };
        let status = classify(&evidence, &profile.limits);

        let (stdout_text, stdout_integrity) = stdout.into_lossy_string();
        let (stderr_text, stderr_integrity) = stderr.into_lossy_string();

        Ok(RunResult {
            status,
            exit_code: exit_status.code(),
            signal: exit_status.signal(),
            stdout: stdout_text,
            stderr: stderr_text,
            stdout_integrity,
            stderr_integrity,
            wall_time,
            cpu_time: last_sample.cpu_time,
            memory_peak: last_sample.peak_rss_bytes,
        })
    }
}

/// Reap the child after the group was signalled. The SIGKILL path cannot
/// leave the loop hanging: the process is unschedulable once killed.
fn wait_after_kill(child: &mut std::process::Child) -> Result<std::process::ExitStatus> {
    child
        .wait()
        .map_err(|e| SandboxError::Process(format!("failed to reap killed child: {}", e)))
}

/// SIGTERM the child's process group, give it a short grace window, then
/// SIGKILL whatever is left.
fn terminate_group(pid: u32) {
    let pgid = -(pid as i32);
    // SAFETY: kill with a negative pid signals the process group; the group
    // exists because the child called setsid.
    unsafe {
        libc::kill(pgid, libc::SIGTERM);
    }
    thread::sleep(KILL_GRACE);
    unsafe {
        libc::kill(pgid, libc::SIGKILL);
    }
}

fn join_collector(handle: Option<thread::JoinHandle<CollectedStream>>) -> CollectedStream {
    match handle {
        Some(handle) => handle.join().unwrap_or_else(|_| CollectedStream::empty()),
        None => CollectedStream::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;

    fn sh_profile(script: &str, limits: ResourceLimits) -> ExecutionProfile {
        ExecutionProfile {
            command: vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                script.to_string(),
            ],
            workdir: std::env::temp_dir(),
            stdin_data: None,
            identity: None,
            limits,
        }
    }

    fn test_limits() -> ResourceLimits {
        ResourceLimits {
            cpu_time_ms: 5_000,
            wall_time_ms: 10_000,
            memory_bytes: 256 * 1024 * 1024,
            stack_bytes: 8 * 1024 * 1024,
            file_size_bytes: 16 * 1024 * 1024,
            process_limit: 16,
            fd_limit: 64,
            output_limit_bytes: 64 * 1024,
        }
    }

    // These tests exercise real child processes; they assume /bin/sh and a
    // non-root test runner (identity: None keeps the precondition happy).

    #[test]
    fn clean_exit_reports_ok_with_captured_stdout() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        let runner = ProcessRunner::new(sh_profile("echo hello", test_limits()));
        let result = runner.run().unwrap();
        assert_eq!(result.status, RunStatus::Ok);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
    }

    #[test]
    fn nonzero_exit_reports_runtime_error() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        let runner = ProcessRunner::new(sh_profile("exit 3", test_limits()));
        let result = runner.run().unwrap();
        assert_eq!(result.status, RunStatus::RuntimeError);
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    fn stdin_payload_reaches_the_child() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        let mut profile = sh_profile("cat", test_limits());
        profile.stdin_data = Some("ping\n".to_string());
        let result = ProcessRunner::new(profile).run().unwrap();
        assert_eq!(result.status, RunStatus::Ok);
        assert_eq!(result.stdout, "ping\n");
    }

    #[test]
    fn wall_watchdog_kills_and_tags_time_limit() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        let mut limits = test_limits();
        limits.wall_time_ms = 300;
        let start = Instant::now();
        let runner = ProcessRunner::new(sh_profile("sleep 30", limits));
        let result = runner.run().unwrap();
        assert_eq!(result.status, RunStatus::TimeLimit);
        assert!(result.exit_code.is_none());
        // Bounded grace: returned well before the payload's own 30s sleep.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn output_flood_is_killed_and_tagged() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        let mut limits = test_limits();
        limits.output_limit_bytes = 4 * 1024;
        limits.wall_time_ms = 10_000;
        let script = "while :; do echo xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; done";
        let result = ProcessRunner::new(sh_profile(script, limits)).run().unwrap();
        assert_eq!(result.status, RunStatus::OutputLimit);
        assert_eq!(result.stdout_integrity, crate::types::StreamIntegrity::TruncatedByLimit);
        assert!(result.stdout.len() <= 4 * 1024);
    }

    #[test]
    fn oversized_stdin_against_a_non_reading_child_does_not_stall_the_watchdog() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        // Payload far beyond the pipe buffer, child never reads: the
        // watchdog must still fire on schedule instead of the parent
        // blocking on the write.
        let mut limits = test_limits();
        limits.wall_time_ms = 1_000;
        let mut profile = sh_profile("sleep 60", limits);
        profile.stdin_data = Some("x".repeat(1024 * 1024));
        let start = Instant::now();
        let result = ProcessRunner::new(profile).run().unwrap();
        assert_eq!(result.status, RunStatus::TimeLimit);
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn process_allowance_is_relative_to_existing_uid_processes() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        // The test uid already owns plenty of processes; an absolute
        // NPROC of 2 would forbid the fork below.
        let mut limits = test_limits();
        limits.process_limit = 2;
        let result = ProcessRunner::new(sh_profile("/bin/echo hi; :", limits))
            .run()
            .unwrap();
        assert_eq!(result.status, RunStatus::Ok);
        assert_eq!(result.stdout, "hi\n");
    }

    #[test]
    fn tight_process_limit_does_not_break_the_uid_switch() {
        if !nix::unistd::geteuid().is_root() {
            eprintln!("skipping: needs root to drop identity");
            return;
        }
        // The sandbox account may already own processes (other instances,
        // host daemons); the uid switch must still succeed.
        let mut limits = test_limits();
        limits.process_limit = 1;
        let mut profile = sh_profile("echo ok", limits);
        profile.identity = Some(SandboxIdentity::new(65534, 65534).unwrap());
        let result = ProcessRunner::new(profile).run().unwrap();
        assert_eq!(result.status, RunStatus::Ok);
        assert_eq!(result.stdout, "ok\n");
    }

    #[test]
    fn fatal_signal_is_reported_as_signaled() {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root without a drop target");
            return;
        }
        let runner = ProcessRunner::new(sh_profile("kill -SEGV $$", test_limits()));
        let result = runner.run().unwrap();
        assert_eq!(result.status, RunStatus::Signaled);
        assert_eq!(result.signal, Some(libc::SIGSEGV));
        assert!(result.exit_code.is_none());
    }

    #[test]
    fn empty_command_is_a_process_error() {
        let profile = ExecutionProfile {
            command: Vec::new(),
            workdir: std::env::temp_dir(),
            stdin_data: None,
            identity: None,
            limits: test_limits(),
        };
        assert!(matches!(
            ProcessRunner::new(profile).run(),
            Err(SandboxError::Process(_))
        ));
    }
}
