//! CLI entrypoint wiring for the coderunner binary.
//!
//! The orchestrator starts the container and issues exactly one command.
//! Absent a command the unit idles: it must never auto-execute anything.

use crate::identity::SandboxIdentity;
use crate::policy::LimitPolicy;
use crate::types::{ExecutionRequest, LimitOverrides, SandboxError};
use crate::unit::SandboxUnit;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Sandboxed compile-and-execute unit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one submission and print the JSON report
    Execute {
        /// Language tag (c, cpp, java, python, javascript; aliases accepted)
        #[arg(long)]
        language: String,
        /// Source code as a string
        #[arg(long, conflicts_with = "source_file")]
        code: Option<String>,
        /// Read source code from a file instead
        #[arg(long)]
        source_file: Option<PathBuf>,
        /// Data passed to the program on stdin
        #[arg(long)]
        stdin: Option<String>,
        /// Caller-approved compiler flags (repeatable; validated fail-closed)
        #[arg(long = "flag", value_name = "FLAG")]
        compiler_flags: Vec<String>,
        /// Memory limit override in MB (clamped to policy)
        #[arg(long)]
        mem: Option<u64>,
        /// CPU time limit override in seconds (clamped to policy)
        #[arg(long)]
        cpu: Option<u64>,
        /// Wall clock limit override in seconds (clamped to policy)
        #[arg(long)]
        wall_time: Option<u64>,
        /// Process count limit override (clamped to policy)
        #[arg(long)]
        processes: Option<u32>,
        /// Output ceiling override in KB (clamped to policy)
        #[arg(long)]
        output_limit: Option<u64>,
        /// Workspace base directory (defaults to a uid-scoped tmp dir)
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Sandbox uid to drop to (requires starting privileged)
        #[arg(long, requires = "gid")]
        uid: Option<u32>,
        /// Sandbox gid to drop to (requires starting privileged)
        #[arg(long, requires = "uid")]
        gid: Option<u32>,
    },
    /// Check that every registered toolchain is installed
    CheckDeps {
        /// Show resolved paths for present executables too
        #[arg(long)]
        verbose: bool,
    },
    /// List registered language tags
    Languages,
}

/// Exit codes: 0 = report produced (user outcome inside), 1 = infrastructure
/// failure, 2 = policy/request rejection.
pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        // Default entry behavior: idle. No request, no execution.
        log::info!("no command issued; idling");
        return Ok(());
    };

    match command {
        Commands::Execute {
            language,
            code,
            source_file,
            stdin,
            compiler_flags,
            mem,
            cpu,
            wall_time,
            processes,
            output_limit,
            workdir,
            uid,
            gid,
        } => {
            let source = match (code, source_file) {
                (Some(code), None) => code.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)?,
                (None, None) => {
                    eprintln!("Error: one of --code or --source-file is required");
                    std::process::exit(2);
                }
                (Some(_), Some(_)) => unreachable!("clap conflicts_with"),
            };

            let mut request = ExecutionRequest::new(language, source);
            request.stdin_data = stdin;
            request.compiler_flags = compiler_flags;
            request.limit_overrides = LimitOverrides {
                cpu_time_ms: cpu.map(|s| s * 1000),
                wall_time_ms: wall_time.map(|s| s * 1000),
                memory_bytes: mem.map(|mb| mb * 1024 * 1024),
                process_limit: processes,
                output_limit_bytes: output_limit.map(|kb| kb * 1024),
            };

            let mut sandbox = SandboxUnit::new().with_limit_policy(LimitPolicy::default());
            if let Some(dir) = workdir {
                sandbox = sandbox.with_base_dir(dir);
            }
            if let (Some(uid), Some(gid)) = (uid, gid) {
                sandbox = sandbox.with_identity(SandboxIdentity::new(uid, gid)?);
            }

            match sandbox.execute(&request) {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => {
                    // Keep the wire contract: errors are JSON too, but
                    // clearly distinct from user-attributable reports.
                    let kind = if e.is_policy_violation() {
                        "policy_violation"
                    } else {
                        "internal_error"
                    };
                    println!(
                        "{}",
                        serde_json::json!({ "error": kind, "message": e.to_string() })
                    );
                    std::process::exit(exit_code_for(&e));
                }
            }
        }
        Commands::CheckDeps { verbose } => {
            let sandbox = SandboxUnit::new();
            let mut all_present = true;
            for (language, probes) in sandbox.check_toolchains() {
                let missing: Vec<&str> = probes
                    .iter()
                    .filter(|(_, present)| !present)
                    .map(|(name, _)| *name)
                    .collect();
                if missing.is_empty() {
                    println!("{}: ok", language);
                    if verbose {
                        for (name, _) in &probes {
                            if let Ok(path) = crate::toolchain::resolve_executable(name) {
                                println!("  {} -> {}", name, path.display());
                            }
                        }
                    }
                } else {
                    all_present = false;
                    println!("{}: missing {}", language, missing.join(", "));
                }
            }
            if !all_present {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Languages => {
            for tag in crate::toolchain::supported_languages() {
                println!("{}", tag);
            }
            Ok(())
        }
    }
}

fn exit_code_for(error: &SandboxError) -> i32 {
    if error.is_policy_violation() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_lone_uid_or_gid_flag_is_a_usage_error() {
        let base = ["coderunner", "execute", "--language", "c", "--code", "x"];
        let mut lone_uid = base.to_vec();
        lone_uid.extend(["--uid", "65534"]);
        assert!(Cli::try_parse_from(lone_uid).is_err());

        let mut lone_gid = base.to_vec();
        lone_gid.extend(["--gid", "65534"]);
        assert!(Cli::try_parse_from(lone_gid).is_err());

        let mut pair = base.to_vec();
        pair.extend(["--uid", "65534", "--gid", "65534"]);
        assert!(Cli::try_parse_from(pair).is_ok());
    }

    #[test]
    fn policy_errors_map_to_exit_code_two() {
        assert_eq!(exit_code_for(&SandboxError::Policy("flag".to_string())), 2);
        assert_eq!(
            exit_code_for(&SandboxError::UnsupportedLanguage("x".to_string())),
            2
        );
    }

    #[test]
    fn infrastructure_errors_map_to_exit_code_one() {
        assert_eq!(exit_code_for(&SandboxError::Toolchain("gcc".to_string())), 1);
        assert_eq!(
            exit_code_for(&SandboxError::Privilege("euid".to_string())),
            1
        );
    }
}
