/// Wait-status classification.
///
/// Never guess a verdict from symptoms alone: classification works from
/// explicit evidence (watchdog action, collector flags, signal numbers,
/// sampled usage) with a fixed precedence, so a limit violation is never
/// reported as plain success or a generic crash.
use crate::types::{ResourceLimits, RunStatus};

/// Evidence gathered by the runner for one finished child.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitEvidence {
    /// Exit code on normal termination
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    /// The wall-clock watchdog terminated the child
    pub watchdog_killed: bool,
    /// A collector hit its output byte ceiling
    pub output_limit_hit: bool,
    /// Last sampled CPU seconds
    pub cpu_time: f64,
    /// Last sampled peak RSS, bytes
    pub peak_rss_bytes: u64,
}

/// RSS within this fraction of the ceiling counts as a memory kill when
/// the child died abnormally.
const MEMORY_ATTRIBUTION_THRESHOLD: f64 = 0.95;

pub fn classify(evidence: &WaitEvidence, limits: &ResourceLimits) -> RunStatus {
    // Watchdog action is judge evidence, not a guess.
    if evidence.watchdog_killed {
        return RunStatus::TimeLimit;
    }

    // Kernel CPU enforcement (SIGXCPU soft, SIGKILL after the hard grace)
    // or sampled CPU at/over the envelope.
    if evidence.signal == Some(libc::SIGXCPU)
        || evidence.cpu_time >= limits.cpu_time_ms as f64 / 1000.0
    {
        return RunStatus::TimeLimit;
    }

    if evidence.output_limit_hit || evidence.signal == Some(libc::SIGXFSZ) {
        return RunStatus::OutputLimit;
    }

    // Memory attribution is best-effort: abnormal death with peak RSS at
    // the ceiling. RLIMIT_AS failures that surface as clean allocator
    // aborts below the ceiling stay RuntimeError.
    let died_abnormally = evidence.signal.is_some() || evidence.exit_code.is_some_and(|c| c != 0);
    if died_abnormally
        && evidence.peak_rss_bytes as f64
            >= limits.memory_bytes as f64 * MEMORY_ATTRIBUTION_THRESHOLD
    {
        return RunStatus::MemoryLimit;
    }

    if evidence.signal.is_some() {
        return RunStatus::Signaled;
    }

    match evidence.exit_code {
        Some(0) => RunStatus::Ok,
        _ => RunStatus::RuntimeError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            cpu_time_ms: 2_000,
            wall_time_ms: 4_000,
            memory_bytes: 128 * 1024 * 1024,
            stack_bytes: 8 * 1024 * 1024,
            file_size_bytes: 16 * 1024 * 1024,
            process_limit: 1,
            fd_limit: 64,
            output_limit_bytes: 4096,
        }
    }

    fn evidence() -> WaitEvidence {
        WaitEvidence {
            exit_code: Some(0),
            ..WaitEvidence::default()
        }
    }

    #[test]
    fn clean_exit_is_ok() {
        assert_eq!(classify(&evidence(), &limits()), RunStatus::Ok);
    }

    #[test]
    fn nonzero_exit_is_runtime_error() {
        let e = WaitEvidence {
            exit_code: Some(3),
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::RuntimeError);
    }

    #[test]
    fn segfault_is_signaled() {
        let e = WaitEvidence {
            exit_code: None,
            signal: Some(libc::SIGSEGV),
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::Signaled);
    }

    #[test]
    fn watchdog_kill_wins_over_everything() {
        let e = WaitEvidence {
            exit_code: None,
            signal: Some(libc::SIGKILL),
            watchdog_killed: true,
            output_limit_hit: true,
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::TimeLimit);
    }

    #[test]
    fn sigxcpu_is_a_time_limit() {
        let e = WaitEvidence {
            exit_code: None,
            signal: Some(libc::SIGXCPU),
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::TimeLimit);
    }

    #[test]
    fn cpu_over_envelope_is_a_time_limit_even_with_clean_exit() {
        let e = WaitEvidence {
            cpu_time: 2.5,
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::TimeLimit);
    }

    #[test]
    fn output_ceiling_breach_is_tagged_not_silently_truncated() {
        let e = WaitEvidence {
            output_limit_hit: true,
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::OutputLimit);
    }

    #[test]
    fn sigxfsz_is_an_output_limit() {
        let e = WaitEvidence {
            exit_code: None,
            signal: Some(libc::SIGXFSZ),
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::OutputLimit);
    }

    #[test]
    fn abnormal_death_at_memory_ceiling_is_a_memory_limit() {
        let e = WaitEvidence {
            exit_code: None,
            signal: Some(libc::SIGKILL),
            peak_rss_bytes: 128 * 1024 * 1024,
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::MemoryLimit);
    }

    #[test]
    fn high_memory_with_clean_exit_stays_ok() {
        let e = WaitEvidence {
            peak_rss_bytes: 128 * 1024 * 1024,
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), RunStatus::Ok);
    }

    #[test]
    fn classification_is_deterministic() {
        let e = WaitEvidence {
            exit_code: Some(1),
            ..evidence()
        };
        assert_eq!(classify(&e, &limits()), classify(&e, &limits()));
    }
}
