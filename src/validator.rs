//! Startup validation
//!
//! Turns a raw configuration into a [`GuardConfig`]. This is the only place
//! a `GuardConfig` is built, so every instance has a non-empty set of real,
//! unprivileged identities and, if confinement is on, an accessible root.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::accounts::AccountDirectory;
use crate::config::{ConfigError, GuardConfig, RawGuardConfig, DEFAULT_GUARD_PROGRAM};
use crate::confinement::Confinement;
use crate::identity::IdentitySet;
use crate::version::VersionInfo;

/// Validate the raw configuration. Relative confinement prefixes resolve
/// against `base_dir`. Fails on the first problem found.
pub fn validate(
    raw: &RawGuardConfig,
    base_dir: &Path,
    accounts: &dyn AccountDirectory,
) -> Result<GuardConfig, ConfigError> {
    match build(raw, base_dir, accounts) {
        Ok(config) => {
            info!(
                "Configuration accepted: users={}, confinement={}, {}",
                config.identities().names(),
                match config.confinement().root() {
                    Some(root) => root.display().to_string(),
                    None => "disabled".to_string(),
                },
                config.version()
            );
            Ok(config)
        }
        Err(e) => {
            error!("Configuration rejected: {}", e);
            Err(e)
        }
    }
}

fn build(
    raw: &RawGuardConfig,
    base_dir: &Path,
    accounts: &dyn AccountDirectory,
) -> Result<GuardConfig, ConfigError> {
    let users = raw.user_list()?;
    let identities = IdentitySet::resolve(&users, accounts)?;

    let confinement = Confinement::resolve(
        raw.confinement.enabled,
        raw.confinement.chroot_prefix.as_deref(),
        base_dir,
    )?;

    let version = VersionInfo::new(
        raw.guard.domjudge_version.clone(),
        raw.guard.revision.clone(),
    );

    let guard_program = raw
        .guard
        .program
        .as_deref()
        .map(str::trim)
        .filter(|program| !program.is_empty())
        .unwrap_or(DEFAULT_GUARD_PROGRAM);

    Ok(GuardConfig::new(
        version,
        identities,
        confinement,
        PathBuf::from(guard_program),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::StaticAccounts;
    use crate::config::raw::RawUserList;
    use tempfile::tempdir;

    fn accounts() -> StaticAccounts {
        StaticAccounts::new()
            .with_account("coderunner", 1001, 1001)
            .with_account("root", 0, 0)
    }

    fn raw_with(users: &str, enabled: bool, prefix: Option<&str>) -> RawGuardConfig {
        let mut raw = RawGuardConfig::embedded().unwrap();
        raw.identity.valid_users = RawUserList::Delimited(users.to_string());
        raw.confinement.enabled = enabled;
        raw.confinement.chroot_prefix = prefix.map(str::to_string);
        raw
    }

    #[test]
    fn test_existing_user_starts() {
        let raw = raw_with("coderunner", false, None);
        let config = validate(&raw, Path::new("/"), &accounts()).unwrap();

        let identity = config.identities().authorize("coderunner").unwrap();
        assert_eq!(identity.uid, 1001);
        assert_eq!(config.confinement(), &Confinement::Disabled { prefix: None });
        assert_eq!(config.version().to_string(), "DOMjudge version 3 (revision 3.3)");
        assert_eq!(config.guard_program(), Path::new("runguard"));
    }

    #[test]
    fn test_empty_user_list_fails() {
        let raw = raw_with("", false, None);
        let err = validate(&raw, Path::new("/"), &accounts()).unwrap_err();

        assert!(matches!(err, ConfigError::EmptyIdentitySet));
        assert_eq!(err.to_string(), "empty identity set");
    }

    #[test]
    fn test_enabled_confinement_with_missing_root_fails() {
        let raw = raw_with("coderunner", true, Some("/nonexistent/path"));
        let err = validate(&raw, Path::new("/"), &accounts()).unwrap_err();

        assert!(matches!(err, ConfigError::ConfinementRootNotFound(_)));
    }

    #[test]
    fn test_disabled_confinement_ignores_missing_root() {
        let raw = raw_with("coderunner", false, Some("/nonexistent/path"));
        let config = validate(&raw, Path::new("/"), &accounts()).unwrap();

        assert_eq!(
            config.confinement(),
            &Confinement::Disabled {
                prefix: Some("/nonexistent/path".to_string())
            }
        );
    }

    #[test]
    fn test_enabled_confinement_without_prefix_fails() {
        let raw = raw_with("coderunner", true, None);
        assert!(matches!(
            validate(&raw, Path::new("/"), &accounts()),
            Err(ConfigError::MissingConfinementRoot)
        ));
    }

    #[test]
    fn test_enabled_confinement_with_relative_root() {
        let base = tempdir().unwrap();
        std::fs::create_dir_all(base.path().join("test_root")).unwrap();
        let raw = raw_with("coderunner", true, Some("test_root"));

        let config = validate(&raw, base.path(), &accounts()).unwrap();
        assert!(config.confinement().root().unwrap().ends_with("test_root"));
    }

    #[test]
    fn test_privileged_user_fails_closed() {
        let raw = raw_with("coderunner,root", false, None);
        assert!(matches!(
            validate(&raw, Path::new("/"), &accounts()),
            Err(ConfigError::PrivilegedIdentity { .. })
        ));
    }

    #[test]
    fn test_unknown_user_fails() {
        let raw = raw_with("coderunner nobody-here", false, None);
        assert!(matches!(
            validate(&raw, Path::new("/"), &accounts()),
            Err(ConfigError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_identity_errors_take_precedence_over_confinement() {
        let raw = raw_with("", true, Some("/nonexistent/path"));
        assert!(matches!(
            validate(&raw, Path::new("/"), &accounts()),
            Err(ConfigError::EmptyIdentitySet)
        ));
    }

    #[test]
    fn test_blank_program_uses_default() {
        let mut raw = raw_with("coderunner", false, None);
        raw.guard.program = Some("  ".to_string());

        let config = validate(&raw, Path::new("/"), &accounts()).unwrap();
        assert_eq!(config.guard_program(), Path::new(DEFAULT_GUARD_PROGRAM));
    }
}
