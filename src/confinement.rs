//! Confinement root
//!
//! The chroot prefix only means something when confinement is enabled.
//! When it is disabled the prefix is kept verbatim for reporting but never
//! touched on disk, so a stale or nonexistent path cannot fail startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use serde::Serialize;
use tracing::debug;

use crate::config::ConfigError;
use crate::error::GuardError;

/// Confinement state of a validated configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Confinement {
    /// `prefix` is the configured value as written, never checked
    Disabled { prefix: Option<String> },
    /// `root` is canonical and was an accessible directory at startup
    Enabled { root: PathBuf },
}

impl Confinement {
    /// Resolve the confinement settings. Relative prefixes are taken
    /// relative to `base_dir`.
    pub fn resolve(
        enabled: bool,
        chroot_prefix: Option<&str>,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        if !enabled {
            debug!("Confinement disabled, chroot prefix {:?} not checked", chroot_prefix);
            return Ok(Self::Disabled {
                prefix: chroot_prefix.map(str::to_string),
            });
        }

        let prefix = chroot_prefix
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .ok_or(ConfigError::MissingConfinementRoot)?;

        let root = resolve_root(Path::new(prefix), base_dir)?;
        debug!("Confinement root resolved to {}", root.display());

        Ok(Self::Enabled { root })
    }

    pub fn root(&self) -> Option<&Path> {
        match self {
            Self::Disabled { .. } => None,
            Self::Enabled { root } => Some(root),
        }
    }

    /// One-line summary for `check` and `show`
    pub fn describe(&self) -> String {
        match self {
            Self::Enabled { root } => format!("enabled (root {})", root.display()),
            Self::Disabled { prefix: Some(prefix) } => {
                format!("disabled (prefix {} unchecked)", prefix)
            }
            Self::Disabled { prefix: None } => "disabled".to_string(),
        }
    }

    /// Decide the jail root for one guard invocation.
    ///
    /// With confinement enabled the configured root is used unless a
    /// directory inside it is requested. Requesting a root while
    /// confinement is disabled is an error.
    pub fn authorize_root(&self, requested: Option<&Path>) -> Result<Option<PathBuf>, GuardError> {
        let (root, requested) = match (self, requested) {
            (Self::Disabled { .. }, None) => return Ok(None),
            (Self::Disabled { .. }, Some(path)) => {
                return Err(GuardError::ConfinementDisabled(path.to_path_buf()))
            }
            (Self::Enabled { root }, None) => return Ok(Some(root.clone())),
            (Self::Enabled { root }, Some(requested)) => (root, requested),
        };

        let not_permitted = || GuardError::RootNotPermitted {
            requested: requested.to_path_buf(),
            root: root.clone(),
        };

        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };

        // Canonicalize so ".." and symlinks cannot step outside the root
        let canonical = fs::canonicalize(&candidate).map_err(|_| not_permitted())?;
        if !canonical.starts_with(root) || !canonical.is_dir() {
            return Err(not_permitted());
        }

        Ok(Some(canonical))
    }
}

fn resolve_root(prefix: &Path, base_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = if prefix.is_absolute() {
        prefix.to_path_buf()
    } else {
        base_dir.join(prefix)
    };

    let unreadable = |path: &Path, message: String| ConfigError::ConfinementRootUnreadable {
        path: path.to_path_buf(),
        message,
    };

    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::ConfinementRootNotFound(path))
        }
        Err(e) => return Err(unreadable(&path, e.to_string())),
    };

    if !metadata.is_dir() {
        return Err(ConfigError::ConfinementRootNotDirectory(path));
    }

    // access(2) checks the real uid/gid, i.e. the invoking account. If this
    // binary is ever installed setuid, the check still reflects the caller
    // rather than the file owner.
    access(&path, AccessFlags::R_OK | AccessFlags::X_OK)
        .map_err(|e| unreadable(&path, e.to_string()))?;

    fs::canonicalize(&path).map_err(|e| unreadable(&path, e.to_string()))
}
