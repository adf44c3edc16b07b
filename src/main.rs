mod accounts;
mod config;
mod confinement;
mod error;
mod identity;
mod launcher;
mod validator;
mod version;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::accounts::SystemAccounts;
use crate::config::raw::RawUserList;
use crate::config::{ConfigSource, GuardConfig, RawGuardConfig, ENV_CONFIG};
use crate::launcher::{CommandSpec, GuardInvocation, Launcher, ProcessLauncher};

/// Startup configuration front-end for the runguard sandbox
#[derive(Debug, Parser)]
#[command(name = "runguard-config", version)]
struct Cli {
    /// TOML config file (default: built-in configuration, or $RUNGUARD_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Load environment variables from this file before reading RUNGUARD_*
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Override the identity whitelist (comma or space separated)
    #[arg(long, global = true)]
    valid_users: Option<String>,

    /// Override the confinement root prefix
    #[arg(long, global = true)]
    chroot_prefix: Option<String>,

    /// Enable confinement
    #[arg(long, global = true, conflicts_with = "no_confinement")]
    confinement: bool,

    /// Disable confinement
    #[arg(long, global = true)]
    no_confinement: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration
    Check,
    /// Validate and print the resolved configuration
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Print version information
    Version,
    /// Check a user (and root) request against the configuration
    Authorize {
        #[arg(long)]
        user: String,
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Run a program under the guard
    Exec {
        #[arg(long)]
        user: String,
        #[arg(long)]
        root: Option<PathBuf>,
        /// Seconds to wait for the guard before killing it
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

impl Cli {
    fn apply_overrides(&self, raw: &mut RawGuardConfig) {
        if let Some(users) = &self.valid_users {
            raw.identity.valid_users = RawUserList::Delimited(users.clone());
        }
        if let Some(prefix) = &self.chroot_prefix {
            raw.confinement.chroot_prefix = Some(prefix.clone());
        }
        if self.confinement {
            raw.confinement.enabled = true;
        }
        if self.no_confinement {
            raw.confinement.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Only an explicitly named file is trusted; the working directory is not
    let env_loaded = match &cli.env_file {
        Some(path) => dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display())),
        None => Ok(()),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("runguard_config=info")),
        )
        .init();

    let result = match env_loaded {
        Ok(()) => run(cli).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
    let source = ConfigSource::from_path(config_path);
    info!("Loading configuration from {}", source);

    let (mut raw, base_dir) = source.load()?;
    raw.apply_env(|key| std::env::var(key).ok())?;
    cli.apply_overrides(&mut raw);

    let validate = || {
        validator::validate(&raw, &base_dir, &SystemAccounts).context("configuration rejected")
    };

    match &cli.command {
        Command::Version => {
            let version = version::VersionInfo::new(
                raw.guard.domjudge_version.clone(),
                raw.guard.revision.clone(),
            );
            println!("{}", version.report());
        }
        Command::Check => {
            let config = validate()?;
            println!(
                "ok: {} identities ({}), confinement {}",
                config.identities().len(),
                config.identities().names(),
                config.confinement().describe()
            );
        }
        Command::Show { json } => {
            let config = validate()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", render_config(&config));
            }
        }
        Command::Authorize { user, root } => {
            let config = validate()?;
            let identity = config.identities().authorize(user)?;
            match config.confinement().authorize_root(root.as_deref())? {
                Some(root) => println!(
                    "ok: user {} (uid {}) root {}",
                    identity.name,
                    identity.uid,
                    root.display()
                ),
                None => println!("ok: user {} (uid {})", identity.name, identity.uid),
            }
        }
        Command::Exec {
            user,
            root,
            timeout,
            command,
        } => {
            let config = validate()?;
            let invocation = GuardInvocation::new(
                &config,
                user,
                root.as_deref(),
                CommandSpec::from_vec(command),
            )?;

            let mut launcher = ProcessLauncher::for_config(&config);
            if let Some(secs) = timeout {
                launcher = launcher.with_timeout(*secs);
            }

            info!(
                "Launching {} as {} (root: {})",
                config.guard_program().display(),
                invocation.identity().name,
                invocation
                    .root()
                    .map(|root| root.display().to_string())
                    .unwrap_or_else(|| "none".to_string())
            );

            let outcome = launcher.launch(&invocation).await?;
            std::io::stdout().write_all(outcome.stdout.as_bytes())?;
            std::io::stderr().write_all(outcome.stderr.as_bytes())?;

            if !outcome.is_success() {
                warn!("Guard exited with status {}", outcome.exit_code);
            }

            return Ok(ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(1)));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn render_config(config: &GuardConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", config.version()));
    out.push_str(&format!(
        "guard program: {}\n",
        config.guard_program().display()
    ));
    out.push_str(&format!("confinement: {}\n", config.confinement().describe()));
    out.push_str("identities:\n");
    for identity in config.identities().iter() {
        out.push_str(&format!(
            "  {} uid={} gid={}\n",
            identity.name, identity.uid, identity.gid
        ));
    }
    out
}
