//! Process execution: rlimit installation, bounded output collection,
//! /proc usage sampling, wait-status classification, and the runner that
//! ties them together under a wall-clock watchdog.

pub mod classify;
pub mod output;
pub mod rlimits;
pub mod runner;
pub mod usage;

pub use runner::{ExecutionProfile, ProcessRunner};
