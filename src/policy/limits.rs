/// Limit override clamping.
///
/// Request-supplied limits are suggestions; the effective envelope is the
/// toolchain's stage default, raised or lowered by the override, and always
/// capped at the policy maximum. The sandbox never trusts a request limit
/// that exceeds policy.
use crate::types::{LimitOverrides, ResourceLimits};
use serde::{Deserialize, Serialize};

/// Orchestrator-defined ceilings. Fixed at unit construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitPolicy {
    pub max_cpu_time_ms: u64,
    pub max_wall_time_ms: u64,
    pub max_memory_bytes: u64,
    pub max_process_limit: u32,
    pub max_output_limit_bytes: u64,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            max_cpu_time_ms: 15_000,
            max_wall_time_ms: 60_000,
            max_memory_bytes: 512 * 1024 * 1024,
            max_process_limit: 64,
            max_output_limit_bytes: 8 * 1024 * 1024,
        }
    }
}

impl LimitPolicy {
    /// Apply overrides to a stage envelope, clamping every field to the
    /// policy maximum. Zero-valued overrides are treated as absent rather
    /// than as "unlimited".
    pub fn apply(&self, base: &ResourceLimits, overrides: &LimitOverrides) -> ResourceLimits {
        let mut effective = base.clone();

        if let Some(cpu) = non_zero(overrides.cpu_time_ms) {
            effective.cpu_time_ms = cpu.min(self.max_cpu_time_ms);
        }
        if let Some(wall) = non_zero(overrides.wall_time_ms) {
            effective.wall_time_ms = wall.min(self.max_wall_time_ms);
        }
        if let Some(memory) = non_zero(overrides.memory_bytes) {
            effective.memory_bytes = memory.min(self.max_memory_bytes);
        }
        if let Some(processes) = overrides.process_limit.filter(|p| *p > 0) {
            effective.process_limit = processes.min(self.max_process_limit);
        }
        if let Some(output) = non_zero(overrides.output_limit_bytes) {
            effective.output_limit_bytes = output.min(self.max_output_limit_bytes);
        }

        // Stage defaults themselves must respect policy too.
        effective.cpu_time_ms = effective.cpu_time_ms.min(self.max_cpu_time_ms);
        effective.wall_time_ms = effective.wall_time_ms.min(self.max_wall_time_ms);
        effective.memory_bytes = effective.memory_bytes.min(self.max_memory_bytes);
        effective.process_limit = effective.process_limit.min(self.max_process_limit);
        effective.output_limit_bytes = effective
            .output_limit_bytes
            .min(self.max_output_limit_bytes);

        effective
    }
}

fn non_zero(value: Option<u64>) -> Option<u64> {
    value.filter(|v| *v > 0)
}
