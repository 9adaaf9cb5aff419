//! Per-request workspace management.
//!
//! Each request gets a uuid-named directory under the base dir; source and
//! artifact live there and nowhere else. Teardown is unconditional and
//! Drop-backed: the directory is removed even when the request fails
//! mid-way, so no artifact, credential, or state survives a request.

use crate::identity::SandboxIdentity;
use crate::types::{Result, SandboxError};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default base directory, scoped by effective uid so root and non-root
/// runs never collide on a shared /tmp path.
pub fn default_base_dir() -> PathBuf {
    let euid = nix::unistd::geteuid().as_raw();
    std::env::temp_dir().join(format!("coderunner-uid-{}", euid))
}

/// One request's working directory.
pub struct Workspace {
    request_id: String,
    run_dir: PathBuf,
    source_file: Option<PathBuf>,
}

impl Workspace {
    /// Provision a fresh workspace. Failure here is an infrastructure
    /// error: the request cannot proceed and must not be retried against
    /// this instance.
    pub fn provision(base_dir: &Path, identity: Option<&SandboxIdentity>) -> Result<Self> {
        let request_id = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&request_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            SandboxError::Workspace(format!(
                "failed to create workspace {}: {}",
                run_dir.display(),
                e
            ))
        })?;

        // The sandbox identity must own its working directory; nothing else
        // on the filesystem is writable to it.
        fs::set_permissions(&run_dir, fs::Permissions::from_mode(0o700)).map_err(|e| {
            SandboxError::Workspace(format!(
                "failed to set workspace mode on {}: {}",
                run_dir.display(),
                e
            ))
        })?;

        if let Some(identity) = identity {
            chown_to_identity(&run_dir, identity)?;
        }

        log::debug!("provisioned workspace {}", run_dir.display());
        Ok(Self {
            request_id,
            run_dir,
            source_file: None,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write the untrusted source under the toolchain's file name.
    pub fn write_source(
        &mut self,
        file_name: &str,
        content: &[u8],
        identity: Option<&SandboxIdentity>,
    ) -> Result<PathBuf> {
        let source_path = self.run_dir.join(file_name);
        fs::write(&source_path, content).map_err(|e| {
            SandboxError::Workspace(format!(
                "failed to write source {}: {}",
                source_path.display(),
                e
            ))
        })?;
        if let Some(identity) = identity {
            chown_to_identity(&source_path, identity)?;
        }
        self.source_file = Some(source_path.clone());
        Ok(source_path)
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Remove the run directory and everything in it. Idempotent; failures
    /// are logged, not raised - cleanup is hygiene, not the safety barrier.
    pub fn teardown(&self) {
        if !self.run_dir.exists() {
            return;
        }
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => log::debug!("tore down workspace {}", self.run_dir.display()),
            Err(e) => log::warn!(
                "failed to remove workspace {}: {}",
                self.run_dir.display(),
                e
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn chown_to_identity(path: &Path, identity: &SandboxIdentity) -> Result<()> {
    use nix::unistd::{chown, Gid, Uid};
    match chown(
        path,
        Some(Uid::from_raw(identity.uid())),
        Some(Gid::from_raw(identity.gid())),
    ) {
        Ok(()) => Ok(()),
        // Without CAP_CHOWN the process is already unprivileged and the
        // files it creates are owned by the sandbox account anyway.
        Err(nix::errno::Errno::EPERM) if !nix::unistd::geteuid().is_root() => Ok(()),
        Err(e) => Err(SandboxError::Workspace(format!(
            "failed to chown {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_creates_unique_run_dirs() {
        let base = tempfile::tempdir().unwrap();
        let first = Workspace::provision(base.path(), None).unwrap();
        let second = Workspace::provision(base.path(), None).unwrap();
        assert!(first.run_dir().exists());
        assert!(second.run_dir().exists());
        assert_ne!(first.run_dir(), second.run_dir());
    }

    #[test]
    fn source_is_written_inside_the_run_dir() {
        let base = tempfile::tempdir().unwrap();
        let mut workspace = Workspace::provision(base.path(), None).unwrap();
        let path = workspace
            .write_source("main.c", b"int main(){return 0;}", None)
            .unwrap();
        assert!(path.starts_with(workspace.run_dir()));
        assert_eq!(fs::read(&path).unwrap(), b"int main(){return 0;}");
    }

    #[test]
    fn teardown_removes_everything() {
        let base = tempfile::tempdir().unwrap();
        let mut workspace = Workspace::provision(base.path(), None).unwrap();
        workspace.write_source("main.py", b"print(1)", None).unwrap();
        let run_dir = workspace.run_dir().to_path_buf();
        workspace.teardown();
        assert!(!run_dir.exists());
        // Idempotent.
        workspace.teardown();
    }

    #[test]
    fn drop_tears_down_even_when_results_are_discarded() {
        let base = tempfile::tempdir().unwrap();
        let run_dir;
        {
            let mut workspace = Workspace::provision(base.path(), None).unwrap();
            workspace.write_source("main.c", b"x", None).unwrap();
            run_dir = workspace.run_dir().to_path_buf();
        }
        assert!(!run_dir.exists());
    }

    #[test]
    fn workspace_mode_is_owner_only() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::provision(base.path(), None).unwrap();
        let mode = fs::metadata(workspace.run_dir()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
