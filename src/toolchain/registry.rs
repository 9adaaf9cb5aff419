/// Language tag resolution.
use crate::toolchain::c_family::{CToolchain, CppToolchain};
use crate::toolchain::interpreted::{JavaScriptToolchain, PythonToolchain};
use crate::toolchain::java::JavaToolchain;
use crate::toolchain::Toolchain;
use crate::types::{Result, SandboxError};

/// Resolve a language tag (with aliases) to its toolchain descriptor.
pub fn toolchain_for(language: &str) -> Result<Box<dyn Toolchain>> {
    match language.to_lowercase().as_str() {
        "c" => Ok(Box::new(CToolchain)),
        "cpp" | "c++" | "cxx" | "cc" => Ok(Box::new(CppToolchain)),
        "java" => Ok(Box::new(JavaToolchain)),
        "python" | "py" => Ok(Box::new(PythonToolchain)),
        "javascript" | "js" | "node" => Ok(Box::new(JavaScriptToolchain)),
        other => Err(SandboxError::UnsupportedLanguage(other.to_string())),
    }
}

/// Canonical tags of every registered toolchain.
pub fn supported_languages() -> &'static [&'static str] {
    &["c", "cpp", "java", "python", "javascript"]
}
