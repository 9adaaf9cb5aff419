//! Request policy enforcement.
//!
//! Fail-closed checks that run before any compiler process is spawned:
//! compiler flag validation and limit override clamping.

pub mod flags;
pub mod limits;

pub use flags::FlagPolicy;
pub use limits::LimitPolicy;
