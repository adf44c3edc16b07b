//! Version tags
//!
//! `domjudge_version` and `revision` are reported verbatim and never
//! influence validation.

use std::fmt;

use serde::Serialize;

/// Upstream and local version tags of the guard build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Upstream DOMjudge compatibility version (`DOMJUDGE_VERSION`)
    pub domjudge_version: String,
    /// Local build revision (`REVISION`)
    pub revision: String,
}

impl VersionInfo {
    pub fn new(domjudge_version: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            domjudge_version: domjudge_version.into(),
            revision: revision.into(),
        }
    }

    /// Full line printed by the `version` command
    pub fn report(&self) -> String {
        format!(
            "{} {} -- {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            self
        )
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DOMjudge version {} (revision {})",
            self.domjudge_version, self.revision
        )
    }
}
