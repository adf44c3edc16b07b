//! Raw configuration as read from TOML, before validation

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::ConfigError;
use crate::identity::UserList;

pub const ENV_VALID_USERS: &str = "RUNGUARD_VALID_USERS";
pub const ENV_CHROOT_PREFIX: &str = "RUNGUARD_CHROOT_PREFIX";
pub const ENV_CONFINEMENT: &str = "RUNGUARD_CONFINEMENT";
pub const ENV_PROGRAM: &str = "RUNGUARD_PROGRAM";

/// Whole configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGuardConfig {
    #[serde(default)]
    pub guard: RawGuardSection,
    #[serde(default)]
    pub identity: RawIdentitySection,
    #[serde(default)]
    pub confinement: RawConfinementSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGuardSection {
    #[serde(default)]
    pub domjudge_version: String,
    #[serde(default)]
    pub revision: String,
    /// Guard executable; defaults to `runguard` on PATH
    pub program: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawIdentitySection {
    #[serde(default)]
    pub valid_users: RawUserList,
}

/// `valid_users = "a,b"` or `valid_users = ["a", "b"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawUserList {
    Delimited(String),
    List(Vec<String>),
}

impl Default for RawUserList {
    fn default() -> Self {
        Self::Delimited(String::new())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfinementSection {
    #[serde(default)]
    pub enabled: bool,
    pub chroot_prefix: Option<String>,
}

impl RawGuardConfig {
    /// Built-in configuration shipped with the binary
    pub fn embedded() -> Result<Self, ConfigError> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/runguard.toml"));
        Self::from_toml_str(content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Overlay `RUNGUARD_*` variables. `lookup` is normally `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(users) = lookup(ENV_VALID_USERS) {
            debug!("{} overrides valid_users", ENV_VALID_USERS);
            self.identity.valid_users = RawUserList::Delimited(users);
        }
        if let Some(prefix) = lookup(ENV_CHROOT_PREFIX) {
            debug!("{} overrides chroot_prefix", ENV_CHROOT_PREFIX);
            self.confinement.chroot_prefix = Some(prefix);
        }
        if let Some(value) = lookup(ENV_CONFINEMENT) {
            self.confinement.enabled = parse_bool(ENV_CONFINEMENT, &value)?;
        }
        if let Some(program) = lookup(ENV_PROGRAM) {
            self.guard.program = Some(program);
        }
        Ok(())
    }

    /// Parse `valid_users` into a checked list
    pub fn user_list(&self) -> Result<UserList, ConfigError> {
        match &self.identity.valid_users {
            RawUserList::Delimited(users) => UserList::parse(users),
            RawUserList::List(users) => UserList::from_entries(users.iter().map(String::as_str)),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
