//! Guard configuration
//!
//! `GuardConfig` is built once at startup by [`crate::validator::validate`]
//! and then passed by reference. It cannot be changed afterwards.

pub mod error;
pub mod raw;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::confinement::Confinement;
use crate::identity::IdentitySet;
use crate::version::VersionInfo;

pub use error::ConfigError;
pub use raw::RawGuardConfig;

/// Environment variable naming an external config file
pub const ENV_CONFIG: &str = "RUNGUARD_CONFIG";

/// Guard executable used when the config does not name one
pub const DEFAULT_GUARD_PROGRAM: &str = "runguard";

/// Validated guard configuration
#[derive(Debug, Clone, Serialize)]
pub struct GuardConfig {
    version: VersionInfo,
    identities: IdentitySet,
    confinement: Confinement,
    guard_program: PathBuf,
}

impl GuardConfig {
    pub(crate) fn new(
        version: VersionInfo,
        identities: IdentitySet,
        confinement: Confinement,
        guard_program: PathBuf,
    ) -> Self {
        Self {
            version,
            identities,
            confinement,
            guard_program,
        }
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn identities(&self) -> &IdentitySet {
        &self.identities
    }

    pub fn confinement(&self) -> &Confinement {
        &self.confinement
    }

    pub fn guard_program(&self) -> &Path {
        &self.guard_program
    }
}

/// Where the raw configuration comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// `files/runguard.toml` compiled into the binary
    Embedded,
    /// An external TOML file, replacing the embedded one entirely
    File(PathBuf),
}

impl ConfigSource {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::File(path),
            None => Self::Embedded,
        }
    }

    /// Read the raw config and the directory relative paths resolve against
    pub fn load(&self) -> Result<(RawGuardConfig, PathBuf), ConfigError> {
        match self {
            Self::Embedded => {
                let base_dir = std::env::current_dir().map_err(|source| ConfigError::Io {
                    path: PathBuf::from("."),
                    source,
                })?;
                Ok((RawGuardConfig::embedded()?, base_dir))
            }
            Self::File(path) => {
                let raw = RawGuardConfig::from_file(path)?;
                let base_dir = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                Ok((raw, base_dir))
            }
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded => f.write_str("built-in defaults"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}
