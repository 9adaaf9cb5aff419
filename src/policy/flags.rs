/// Compiler flag validation with allowlist-based security.
///
/// Untrusted callers may only steer optimization and diagnostics. Anything
/// that injects paths, redirects output, loads plugins, or reaches the
/// linker/preprocessor driver is rejected before a compiler is spawned.
use crate::types::{Result, SandboxError};

/// Flag vocabulary a toolchain accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagPolicy {
    /// gcc/g++ style flags, validated against the C-family allowlist
    CFamily,
    /// Interpreted runtimes and javac: no caller-supplied flags at all
    None,
}

/// Exact-match allowlist for C-family flags that carry no argument payload.
static ALLOWED_EXACT: &[&str] = &[
    "-O0",
    "-O1",
    "-O2",
    "-O3",
    "-Os",
    "-g",
    "-pipe",
    "-static",
    "-lm",
    "-fno-exceptions",
    "-fno-rtti",
    "-w",
];

/// Prefix allowlist for flags with an inline value. The value part is still
/// subject to the path-reference check below.
static ALLOWED_PREFIXES: &[&str] = &["-std=", "-W", "-D", "-U"];

/// Prefixes that are always rejected, even though some match an allowed
/// prefix above (checked first). `-Wl,`/`-Wp,`/`-Wa,` reach the linker,
/// preprocessor, and assembler drivers; `-o` redirects output.
static DENIED_PREFIXES: &[&str] = &["-Wl,", "-Wp,", "-Wa,", "-o"];

/// Validate one request's compiler flags against a toolchain's policy.
/// Returns the first violation; no partial acceptance.
pub fn validate(policy: FlagPolicy, flags: &[String]) -> Result<()> {
    match policy {
        FlagPolicy::None => {
            if let Some(flag) = flags.first() {
                return Err(SandboxError::Policy(format!(
                    "language accepts no compiler flags, got '{}'",
                    flag
                )));
            }
            Ok(())
        }
        FlagPolicy::CFamily => {
            for flag in flags {
                validate_c_family_flag(flag)?;
            }
            Ok(())
        }
    }
}

fn validate_c_family_flag(flag: &str) -> Result<()> {
    if flag.is_empty() || !flag.starts_with('-') {
        return Err(SandboxError::Policy(format!(
            "flag '{}' is not an option token",
            flag
        )));
    }

    // Path references can reach outside the working directory.
    if flag.contains('/') || flag.contains("..") || flag.contains('~') {
        return Err(SandboxError::Policy(format!(
            "flag '{}' references a filesystem path",
            flag
        )));
    }

    for denied in DENIED_PREFIXES {
        if flag.starts_with(denied) {
            return Err(SandboxError::Policy(format!(
                "flag '{}' is not permitted (driver/output control)",
                flag
            )));
        }
    }

    if ALLOWED_EXACT.contains(&flag) {
        return Ok(());
    }

    for allowed in ALLOWED_PREFIXES {
        if flag.starts_with(allowed) {
            return Ok(());
        }
    }

    Err(SandboxError::Policy(format!(
        "flag '{}' is not on the allowlist",
        flag
    )))
}
