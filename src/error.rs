//! Errors raised after startup, when a guard request is checked against the
//! validated configuration or handed to the guard executable.

use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("illegal user specified: {0}")]
    UserNotPermitted(String),
    #[error("invalid root directory specified: {} is not within {}", .requested.display(), .root.display())]
    RootNotPermitted { requested: PathBuf, root: PathBuf },
    #[error("root directory {} requested but confinement is disabled", .0.display())]
    ConfinementDisabled(PathBuf),
    #[error("no command given")]
    EmptyCommand,
    #[error("failed to launch guard {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("guard did not finish within {0} seconds")]
    Timeout(u64),
}
