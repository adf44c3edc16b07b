use std::path::PathBuf;

/// Startup configuration failure. Any of these must stop the guard before
/// an untrusted program is launched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("empty identity set")]
    EmptyIdentitySet,
    #[error("invalid identity {name:?}: {reason}")]
    InvalidIdentity { name: String, reason: &'static str },
    #[error("identity {0:?} does not exist on this host")]
    UnknownIdentity(String),
    #[error("identity {name:?} is privileged (uid={uid}, gid={gid})")]
    PrivilegedIdentity { name: String, uid: u32, gid: u32 },
    #[error("account lookup failed for {name:?}: {message}")]
    AccountLookup { name: String, message: String },
    #[error("confinement is enabled but no chroot prefix is set")]
    MissingConfinementRoot,
    #[error("confinement root does not exist: {}", .0.display())]
    ConfinementRootNotFound(PathBuf),
    #[error("confinement root is not a directory: {}", .0.display())]
    ConfinementRootNotDirectory(PathBuf),
    #[error("confinement root is not accessible: {}: {message}", .path.display())]
    ConfinementRootUnreadable { path: PathBuf, message: String },
}
