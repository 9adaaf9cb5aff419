//! Sandbox identity and privilege de-escalation.
//!
//! The identity is fixed, pre-provisioned infrastructure: a non-root
//! uid/gid pair owning nothing but the working directory. De-escalation is
//! an explicit, auditable step on the request path and happens in the
//! child before exec - for the compiler invocation as well as the payload,
//! since compiler input handling is not trusted against adversarial source.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid.

use crate::types::{Result, SandboxError};
use serde::{Deserialize, Serialize};

/// Fixed non-privileged uid/gid pair. Construction rejects root ids, so a
/// value of this type is proof of a non-root target.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxIdentity {
    uid: u32,
    gid: u32,
}

/// Default sandbox account (nobody/nogroup).
pub const DEFAULT_UID: u32 = 65534;
pub const DEFAULT_GID: u32 = 65534;

impl SandboxIdentity {
    pub fn new(uid: u32, gid: u32) -> Result<Self> {
        if uid == 0 || gid == 0 {
            return Err(SandboxError::Privilege(format!(
                "refusing root sandbox identity (uid={}, gid={})",
                uid, gid
            )));
        }
        Ok(Self { uid, gid })
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }
}

impl Default for SandboxIdentity {
    fn default() -> Self {
        // 65534 != 0 by construction.
        Self {
            uid: DEFAULT_UID,
            gid: DEFAULT_GID,
        }
    }
}

/// Assert-then-proceed precondition, checked in the parent before any
/// untrusted input is handed to a child process.
///
/// - Running as root without a drop target is a hard error: the child
///   would exec untrusted code with uid 0.
/// - Running unprivileged already (the image switched user at build time)
///   satisfies the contract with or without a drop target.
pub fn assert_drop_precondition(identity: Option<&SandboxIdentity>) -> Result<()> {
    let euid = nix::unistd::geteuid().as_raw();
    if euid == 0 && identity.is_none() {
        return Err(SandboxError::Privilege(
            "running as root with no sandbox identity configured; refusing to execute untrusted code"
                .to_string(),
        ));
    }
    log::debug!(
        "privilege precondition ok (euid={}, drop_target={:?})",
        euid,
        identity.map(|i| (i.uid(), i.gid()))
    );
    Ok(())
}

/// De-escalate inside the forked child, immediately before exec.
///
/// ASYNC-SIGNAL SAFETY: runs between fork and exec, so only raw libc calls
/// are used here - no logging, no allocation beyond error construction.
/// Sequence: clear supplementary groups -> setresgid -> setresuid -> verify.
pub fn drop_in_child(identity: &SandboxIdentity) -> std::io::Result<()> {
    let uid = identity.uid() as libc::uid_t;
    let gid = identity.gid() as libc::gid_t;

    // Already the target identity and not root: nothing to do, and the
    // setgroups below would fail without CAP_SETGID.
    // SAFETY: geteuid/getegid are async-signal-safe and cannot fail.
    let euid = unsafe { libc::geteuid() };
    let egid = unsafe { libc::getegid() };
    if euid == uid && egid == gid {
        return Ok(());
    }

    // SAFETY: setgroups with an empty set drops supplementary groups.
    if unsafe { libc::setgroups(0, std::ptr::null()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: setresgid sets real/effective/saved GID atomically.
    // CRITICAL: GID before UID - after setresuid the process no longer has
    // the privilege to change its groups.
    if unsafe { libc::setresgid(gid, gid, gid) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: setresuid sets real/effective/saved UID atomically; with the
    // saved set-user-ID cleared there is no path back to root.
    if unsafe { libc::setresuid(uid, uid, uid) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // Verify: the tree must never hold a privileged identity past this point.
    // SAFETY: get*id are async-signal-safe.
    let ok = unsafe {
        libc::getuid() == uid
            && libc::geteuid() == uid
            && libc::getgid() == gid
            && libc::getegid() == gid
    };
    if !ok {
        return Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "uid/gid verification failed after transition",
        ));
    }

    // no_new_privs: setuid/setgid binaries and file capabilities can no
    // longer re-elevate this tree.
    // SAFETY: prctl(PR_SET_NO_NEW_PRIVS, 1) takes no pointers.
    if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rejects_root_uid() {
        assert!(SandboxIdentity::new(0, 1000).is_err());
    }

    #[test]
    fn identity_rejects_root_gid() {
        assert!(SandboxIdentity::new(1000, 0).is_err());
    }

    #[test]
    fn identity_accepts_unprivileged_pair() {
        let identity = SandboxIdentity::new(1000, 1000).unwrap();
        assert_eq!(identity.uid(), 1000);
        assert_eq!(identity.gid(), 1000);
    }

    #[test]
    fn default_identity_is_nobody() {
        let identity = SandboxIdentity::default();
        assert_eq!(identity.uid(), DEFAULT_UID);
        assert_eq!(identity.gid(), DEFAULT_GID);
    }

    #[test]
    fn precondition_holds_with_a_drop_target() {
        let identity = SandboxIdentity::default();
        assert!(assert_drop_precondition(Some(&identity)).is_ok());
    }

    #[test]
    fn precondition_without_target_depends_on_current_euid() {
        let result = assert_drop_precondition(None);
        if nix::unistd::geteuid().is_root() {
            assert!(result.is_err(), "root without a drop target must fail closed");
        } else {
            assert!(result.is_ok());
        }
    }
}
