//! Guard hand-off
//!
//! Builds the guard command line from a validated configuration and runs
//! the guard executable. Only the user and root are passed here; limits and
//! supervision belong to the guard.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::identity::Identity;

/// Untrusted program to run under the guard
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        let args: Vec<String> = iter.cloned().collect();
        Self { program, args }
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// A guard request that has passed the identity and root checks
#[derive(Debug, Clone)]
pub struct GuardInvocation {
    identity: Identity,
    root: Option<PathBuf>,
    command: CommandSpec,
}

impl GuardInvocation {
    pub fn new(
        config: &GuardConfig,
        user: &str,
        root: Option<&Path>,
        command: CommandSpec,
    ) -> Result<Self, GuardError> {
        if command.program.is_empty() {
            return Err(GuardError::EmptyCommand);
        }

        let identity = config.identities().authorize(user)?.clone();
        let root = config.confinement().authorize_root(root)?;

        Ok(Self {
            identity,
            root,
            command,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Guard arguments: `--user NAME [--root DIR] -- PROGRAM ARGS...`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["--user".to_string(), self.identity.name.to_string()];
        if let Some(root) = &self.root {
            args.push("--root".to_string());
            args.push(root.display().to_string());
        }
        args.push("--".to_string());
        args.extend(self.command.to_vec());
        args
    }
}

/// What the guard reported back
#[derive(Debug)]
pub struct GuardOutcome {
    /// Exit code, or 128 + signal number if the guard was killed
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GuardOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a guard invocation
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, invocation: &GuardInvocation) -> Result<GuardOutcome, GuardError>;
}

/// Launcher that spawns the guard executable as a child process
pub struct ProcessLauncher {
    program: PathBuf,
    timeout_secs: Option<u64>,
}

impl ProcessLauncher {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            timeout_secs: None,
        }
    }

    pub fn for_config(config: &GuardConfig) -> Self {
        Self::new(config.guard_program())
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, invocation: &GuardInvocation) -> Result<GuardOutcome, GuardError> {
        let args = invocation.args();
        debug!("Running guard {:?} with args: {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GuardError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let wait = child.wait_with_output();
        let output = match self.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
                .await
                .map_err(|_| GuardError::Timeout(secs))?,
            None => wait.await,
        }
        .map_err(|source| GuardError::Launch {
            program: self.program.clone(),
            source,
        })?;

        let exit_code = output
            .status
            .code()
            .unwrap_or_else(|| 128 + output.status.signal().unwrap_or(0));

        info!(
            "Guard finished: user={}, exit_code={}",
            invocation.identity.name, exit_code
        );

        Ok(GuardOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::StaticAccounts;
    use crate::config::raw::RawUserList;
    use crate::config::RawGuardConfig;
    use crate::validator::validate;
    use tempfile::tempdir;

    fn config(confinement_root: Option<&Path>, program: &str) -> GuardConfig {
        let accounts = StaticAccounts::new().with_account("coderunner", 1001, 1001);
        let mut raw = RawGuardConfig::embedded().unwrap();
        raw.identity.valid_users = RawUserList::Delimited("coderunner".to_string());
        raw.guard.program = Some(program.to_string());
        if let Some(root) = confinement_root {
            raw.confinement.enabled = true;
            raw.confinement.chroot_prefix = Some(root.display().to_string());
        }
        validate(&raw, Path::new("/"), &accounts).unwrap()
    }

    fn command(parts: &[&str]) -> CommandSpec {
        let parts: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        CommandSpec::from_vec(&parts)
    }

    #[test]
    fn test_command_spec_from_vec() {
        let cmd = command(&["python3", "main.py"]);
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args, vec!["main.py"]);
        assert_eq!(cmd.to_vec(), vec!["python3", "main.py"]);
    }

    #[test]
    fn test_args_without_confinement() {
        let config = config(None, "runguard");
        let invocation =
            GuardInvocation::new(&config, "coderunner", None, command(&["./prog", "-v"])).unwrap();

        assert_eq!(
            invocation.args(),
            vec!["--user", "coderunner", "--", "./prog", "-v"]
        );
        assert!(invocation.root().is_none());
    }

    #[test]
    fn test_args_with_confinement() {
        let dir = tempdir().unwrap();
        let config = config(Some(dir.path()), "runguard");
        let invocation =
            GuardInvocation::new(&config, "1001", None, command(&["./prog"])).unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();

        assert_eq!(invocation.identity().name.as_str(), "coderunner");
        assert_eq!(
            invocation.args(),
            vec![
                "--user".to_string(),
                "coderunner".to_string(),
                "--root".to_string(),
                root.display().to_string(),
                "--".to_string(),
                "./prog".to_string(),
            ]
        );
    }

    #[test]
    fn test_rejects_unlisted_user() {
        let config = config(None, "runguard");
        let result = GuardInvocation::new(&config, "root", None, command(&["./prog"]));
        assert!(matches!(result, Err(GuardError::UserNotPermitted(_))));
    }

    #[test]
    fn test_rejects_root_when_confinement_disabled() {
        let config = config(None, "runguard");
        let result = GuardInvocation::new(
            &config,
            "coderunner",
            Some(Path::new("/srv/jail")),
            command(&["./prog"]),
        );
        assert!(matches!(result, Err(GuardError::ConfinementDisabled(_))));
    }

    #[test]
    fn test_rejects_empty_command() {
        let config = config(None, "runguard");
        let result = GuardInvocation::new(&config, "coderunner", None, command(&[]));
        assert!(matches!(result, Err(GuardError::EmptyCommand)));
    }

    #[test]
    fn test_launch_passes_arguments_to_guard() {
        let config = config(None, "echo");
        let invocation =
            GuardInvocation::new(&config, "coderunner", None, command(&["/bin/true"])).unwrap();
        let launcher = ProcessLauncher::for_config(&config).with_timeout(10);

        let outcome = tokio_test::block_on(launcher.launch(&invocation)).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "--user coderunner -- /bin/true\n");
    }

    #[test]
    fn test_launch_reports_guard_exit_code() {
        let config = config(None, "false");
        let invocation =
            GuardInvocation::new(&config, "coderunner", None, command(&["./prog"])).unwrap();
        let launcher = ProcessLauncher::for_config(&config);

        let outcome = tokio_test::block_on(launcher.launch(&invocation)).unwrap();
        assert_eq!(outcome.exit_code, 1);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_launch_missing_guard() {
        let config = config(None, "/nonexistent/runguard");
        let invocation =
            GuardInvocation::new(&config, "coderunner", None, command(&["./prog"])).unwrap();
        let launcher = ProcessLauncher::for_config(&config);

        let result = tokio_test::block_on(launcher.launch(&invocation));
        assert!(matches!(result, Err(GuardError::Launch { .. })));
    }

    #[test]
    fn test_launch_times_out_slow_guard() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let guard = dir.path().join("slow-guard");
        std::fs::write(&guard, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&guard, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = config(None, guard.to_str().unwrap());
        let invocation =
            GuardInvocation::new(&config, "coderunner", None, command(&["./prog"])).unwrap();
        let launcher = ProcessLauncher::for_config(&config).with_timeout(1);

        let started = std::time::Instant::now();
        let result = tokio_test::block_on(launcher.launch(&invocation));

        assert!(matches!(result, Err(GuardError::Timeout(1))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
