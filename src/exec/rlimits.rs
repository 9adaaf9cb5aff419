/// Kernel rlimit installation for the sandboxed child.
///
/// Runs in the pre-exec hook, after fork and before exec; only setrlimit
/// calls, no allocation or logging.
use crate::types::ResourceLimits;
use nix::sys::resource::{setrlimit, Resource};

fn io_err(which: &str, e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::other(format!("setrlimit {} failed: {}", which, e))
}

/// Install every per-process limit from the envelope. CPU gets one second
/// of hard-limit grace above the soft limit so SIGXCPU (catchable evidence)
/// arrives before the kernel's SIGKILL.
///
/// RLIMIT_NPROC is deliberately absent here: it counts processes per real
/// uid, so it must be installed by [`apply_process_limit`] after the
/// identity transition, with a ceiling computed against the target uid's
/// existing process count. Installing it before setresuid makes the uid
/// switch itself fail with EAGAIN whenever the target uid already owns
/// processes.
pub fn apply(limits: &ResourceLimits) -> std::io::Result<()> {
    let cpu_soft = limits.cpu_time_ms.div_ceil(1000).max(1);
    setrlimit(Resource::RLIMIT_CPU, cpu_soft, cpu_soft + 1).map_err(|e| io_err("CPU", e))?;

    setrlimit(
        Resource::RLIMIT_AS,
        limits.memory_bytes,
        limits.memory_bytes,
    )
    .map_err(|e| io_err("AS", e))?;

    setrlimit(
        Resource::RLIMIT_STACK,
        limits.stack_bytes,
        limits.stack_bytes,
    )
    .map_err(|e| io_err("STACK", e))?;

    setrlimit(
        Resource::RLIMIT_FSIZE,
        limits.file_size_bytes,
        limits.file_size_bytes,
    )
    .map_err(|e| io_err("FSIZE", e))?;

    // No core dumps: they leak artifact state into the workspace.
    setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(|e| io_err("CORE", e))?;

    setrlimit(Resource::RLIMIT_NOFILE, limits.fd_limit, limits.fd_limit)
        .map_err(|e| io_err("NOFILE", e))?;

    Ok(())
}

/// Install the process-count ceiling. `ceiling` is an absolute per-uid
/// count (the uid's processes at spawn time plus the stage's allowance),
/// so concurrent instances sharing the sandbox uid stay independent.
/// Must run after the identity drop.
pub fn apply_process_limit(ceiling: u64) -> std::io::Result<()> {
    setrlimit(Resource::RLIMIT_NPROC, ceiling, ceiling).map_err(|e| io_err("NPROC", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_soft_limit_rounds_up_and_is_at_least_one_second() {
        assert_eq!(1u64, 500u64.div_ceil(1000).max(1));
        assert_eq!(1u64, 1000u64.div_ceil(1000).max(1));
        assert_eq!(2u64, 1001u64.div_ceil(1000).max(1));
        assert_eq!(1u64, 0u64.div_ceil(1000).max(1));
    }
}
