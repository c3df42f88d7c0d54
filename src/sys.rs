//! System utilities for user identity and privilege checks

use crate::{Error, Result};

/// Context information when running under sudo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SudoContext {
    /// The user who invoked sudo
    pub user: String,
    /// The UID of the user who invoked sudo
    pub uid: u32,
}

/// Detects if the current process is running as root via sudo.
///
/// Returns `Some(SudoContext)` when the effective UID is 0 and both
/// `SUDO_USER` and a parseable `SUDO_UID` are set. A direct root login has
/// no sudo context.
///
/// Under sudo, `crontab -l` without `-u` reads root's table, which is rarely
/// what the invoking user meant.
#[cfg(unix)]
pub fn detect_sudo_context() -> Option<SudoContext> {
    if !is_root() {
        return None;
    }
    let user = std::env::var("SUDO_USER").ok()?;
    let uid: u32 = std::env::var("SUDO_UID").ok()?.parse().ok()?;
    Some(SudoContext { user, uid })
}

#[cfg(not(unix))]
pub fn detect_sudo_context() -> Option<SudoContext> {
    None
}

#[cfg(unix)]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Name of the effective user.
#[cfg(unix)]
pub fn current_user() -> String {
    use nix::unistd::{User, geteuid};

    match User::from_uid(geteuid()) {
        Ok(Some(user)) => user.name,
        _ => env_user(),
    }
}

#[cfg(not(unix))]
pub fn current_user() -> String {
    env_user()
}

fn env_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Whether a local account with this name exists.
#[cfg(unix)]
pub fn user_exists(name: &str) -> bool {
    matches!(nix::unistd::User::from_name(name), Ok(Some(_)))
}

#[cfg(not(unix))]
pub fn user_exists(_name: &str) -> bool {
    false
}

/// Check that the current process may manage `target`'s crontab.
///
/// Managing your own table is always allowed; anyone else's needs root and
/// an existing account.
pub fn check_crontab_access(target: Option<&str>) -> Result<()> {
    let Some(target) = target else {
        return Ok(());
    };
    if target == current_user() {
        return Ok(());
    }
    if !is_root() {
        return Err(Error::InvalidInput(format!(
            "Managing the crontab of '{}' requires root",
            target
        )));
    }
    if !user_exists(target) {
        return Err(Error::InvalidInput(format!("No such user: {}", target)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_detect_sudo_context_not_root() {
        if !is_root() {
            assert_eq!(detect_sudo_context(), None);
        }
    }

    #[test]
    fn test_own_crontab_always_allowed() {
        assert!(check_crontab_access(None).is_ok());
        assert!(check_crontab_access(Some(&current_user())).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_other_user_requires_root() {
        let result = check_crontab_access(Some("vexo-no-such-user"));
        // Non-root fails on privilege, root fails on the missing account.
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_current_user_exists() {
        let name = current_user();
        assert!(!name.is_empty());
        if name != "unknown" {
            assert!(user_exists(&name));
        }
    }
}
