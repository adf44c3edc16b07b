//! Identity set
//!
//! The whitelist of OS accounts the guard may drop privilege to.
//! `UserList` is the parsed form of the configured names; `IdentitySet` is
//! the same list after every name has been resolved to a real,
//! non-privileged account.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::accounts::AccountDirectory;
use crate::config::ConfigError;
use crate::error::GuardError;

/// Longest account name accepted (matches the common useradd limit)
const MAX_NAME_LEN: usize = 32;

/// Names that are rejected even if the host maps them to a non-zero uid
const PRIVILEGED_NAMES: &[&str] = &["root"];

/// A syntactically valid account name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserName(String);

impl UserName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UserName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidIdentity {
            name: s.to_string(),
            reason,
        };

        if s.is_empty() {
            return Err(invalid("empty name"));
        }
        if s.len() > MAX_NAME_LEN {
            return Err(invalid("longer than 32 characters"));
        }
        if s.starts_with('-') {
            return Err(invalid("starts with '-'"));
        }
        // A numeric name would be indistinguishable from a uid on the guard command line
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("purely numeric"));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        {
            return Err(invalid("contains characters outside [A-Za-z0-9._-]"));
        }

        Ok(Self(s.to_string()))
    }
}

impl Borrow<str> for UserName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed identity list, sorted by name with duplicates collapsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserList(BTreeSet<UserName>);

impl UserList {
    /// Parse a delimited list. Entries are separated by commas and/or
    /// whitespace; empty entries are skipped.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        Self::from_entries(source.split(|c: char| c == ',' || c.is_ascii_whitespace()))
    }

    /// Build from individual entries (e.g. a TOML array)
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        let names = entries
            .into_iter()
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<UserName>, _>>()?;

        if names.is_empty() {
            return Err(ConfigError::EmptyIdentitySet);
        }

        Ok(Self(names))
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserName> {
        self.0.iter()
    }
}

impl fmt::Display for UserList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(name.as_str())?;
            first = false;
        }
        Ok(())
    }
}

/// An account the guard may run untrusted code as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: UserName,
    pub uid: u32,
    pub gid: u32,
}

/// Identity list resolved against the host's accounts
#[derive(Debug, Clone)]
pub struct IdentitySet {
    identities: BTreeMap<UserName, Identity>,
}

impl IdentitySet {
    /// Resolve every listed name to a real, non-privileged account.
    pub fn resolve(users: &UserList, accounts: &dyn AccountDirectory) -> Result<Self, ConfigError> {
        let mut identities = BTreeMap::new();

        for name in users.iter() {
            let account = accounts
                .lookup(name.as_str())?
                .ok_or_else(|| ConfigError::UnknownIdentity(name.to_string()))?;

            if account.uid == 0 || account.gid == 0 || PRIVILEGED_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::PrivilegedIdentity {
                    name: name.to_string(),
                    uid: account.uid,
                    gid: account.gid,
                });
            }

            debug!(
                "Resolved identity {} (account {}, uid={}, gid={})",
                name, account.name, account.uid, account.gid
            );

            identities.insert(
                name.clone(),
                Identity {
                    name: name.clone(),
                    uid: account.uid,
                    gid: account.gid,
                },
            );
        }

        Ok(Self { identities })
    }

    /// Look up a requested user, given as a name or a numeric uid
    pub fn authorize(&self, requested: &str) -> Result<&Identity, GuardError> {
        if let Some(identity) = self.identities.get(requested) {
            return Ok(identity);
        }

        if let Ok(uid) = requested.parse::<u32>() {
            if let Some(identity) = self.identities.values().find(|i| i.uid == uid) {
                return Ok(identity);
            }
        }

        Err(GuardError::UserNotPermitted(requested.to_string()))
    }

    /// The resolved names as a list again
    pub fn names(&self) -> UserList {
        UserList(self.identities.keys().cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Always false for a resolved set, since an empty list fails validation
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl Serialize for IdentitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.identities.values())
    }
}
