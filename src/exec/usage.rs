/// Best-effort resource usage sampling from /proc.
///
/// The kernel is the source of truth: CPU time comes from utime+stime in
/// /proc/<pid>/stat, peak RSS from VmHWM in /proc/<pid>/status. Samples are
/// taken while polling; the last one before exit is reported. Failures
/// return None - accounting never breaks a run.
use std::fs;

/// Last-seen usage snapshot for a child process.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsageSample {
    /// CPU seconds (user + system)
    pub cpu_time: f64,
    /// Peak resident set size, bytes
    pub peak_rss_bytes: u64,
}

/// Sample the child's usage; None once the pid is gone.
pub fn sample(pid: u32) -> Option<UsageSample> {
    let cpu_time = read_cpu_time(pid)?;
    let peak_rss_bytes = read_peak_rss(pid).unwrap_or(0);
    Some(UsageSample {
        cpu_time,
        peak_rss_bytes,
    })
}

fn read_cpu_time(pid: u32) -> Option<f64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // Fields after the parenthesized comm (which may contain spaces).
    let rest = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // utime and stime are fields 14 and 15 overall; 12 and 13 after comm.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let ticks_per_sec = clock_ticks_per_second();
    Some((utime + stime) as f64 / ticks_per_sec)
}

fn read_peak_rss(pid: u32) -> Option<u64> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmHWM:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Count processes whose real uid is `uid`. RLIMIT_NPROC is enforced per
/// real uid, so the child's process ceiling has to be computed on top of
/// whatever the uid already owns (other instances included). Best-effort;
/// unreadable /proc entries are skipped.
pub fn count_processes_for_uid(uid: u32) -> u64 {
    let entries = match fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut count = 0u64;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if read_real_uid(name) == Some(uid) {
            count += 1;
        }
    }
    count
}

fn read_real_uid(pid: &str) -> Option<u32> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            return rest.split_whitespace().next()?.parse().ok();
        }
    }
    None
}

fn clock_ticks_per_second() -> f64 {
    // SAFETY: sysconf(_SC_CLK_TCK) reads a constant, no side effects.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        100.0
    }
}
