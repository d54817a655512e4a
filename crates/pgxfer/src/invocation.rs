//! Command lines for the wrapped PostgreSQL client tools.

use std::fmt;
use std::path::PathBuf;

use process_utils::EnvMode;

use crate::config::{RestoreOptions, TransferConfig};
use crate::profile::{ConnectionProfile, Side};

/// A program, its arguments and the environment it runs with.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub env_mode: EnvMode,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            env_mode: EnvMode::Isolated,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run with the libpq environment of `profile`.
    pub fn connect_to(mut self, profile: &ConnectionProfile) -> Self {
        self.env = profile
            .libpq_env()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        self
    }

    pub fn env_mode(mut self, mode: EnvMode) -> Self {
        self.env_mode = mode;
        self
    }

    /// Build a command with program, arguments and environment applied.
    /// Stdio wiring is left to the caller.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = process_utils::tokio_command_with_env(
            &self.program,
            self.env.iter().map(|(k, v)| (k, v)),
            self.env_mode,
        );
        cmd.args(&self.args);
        cmd
    }

    pub fn command_line(&self) -> String {
        process_utils::render_command_line(&self.program, &self.args)
    }
}

// Environment values include passwords; only the command line is shown.
impl fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInvocation")
            .field("command", &self.command_line())
            .field("env_mode", &self.env_mode)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// `pg_dump` against the source database.
pub fn pg_dump(config: &TransferConfig) -> ToolInvocation {
    ToolInvocation::new(&config.tools.pg_dump)
        .args(["--format=custom", "--verbose"])
        .connect_to(config.profile(Side::Source))
        .env_mode(config.env_mode())
}

/// `pg_restore` into the destination database.
pub fn pg_restore(config: &TransferConfig) -> ToolInvocation {
    ToolInvocation::new(&config.tools.pg_restore)
        .args(pg_restore_args(&config.dest.name, &config.restore))
        .connect_to(config.profile(Side::Dest))
        .env_mode(config.env_mode())
}

fn pg_restore_args(dbname: &str, options: &RestoreOptions) -> Vec<String> {
    let mut args = vec![
        "--format=custom".to_string(),
        "--verbose".to_string(),
        "--verbose".to_string(),
        format!("--dbname={dbname}"),
    ];
    if options.clean_dest {
        args.push("--clean".to_string());
    }
    if !options.owner {
        args.push("--no-owner".to_string());
    }
    if !options.acl {
        args.push("--no-acl".to_string());
    }
    args
}

/// `dropdb --if-exists <name>` scoped to `profile`.
pub fn dropdb(config: &TransferConfig, profile: &ConnectionProfile, name: &str) -> ToolInvocation {
    ToolInvocation::new(&config.tools.dropdb)
        .arg("--if-exists")
        .args(maintenance_db_arg(config))
        .arg(name)
        .connect_to(profile)
        .env_mode(config.env_mode())
}

/// `createdb -T template0 <name>` scoped to `profile`.
pub fn createdb(config: &TransferConfig, profile: &ConnectionProfile, name: &str) -> ToolInvocation {
    ToolInvocation::new(&config.tools.createdb)
        .args(["-T", "template0"])
        .args(maintenance_db_arg(config))
        .arg(name)
        .connect_to(profile)
        .env_mode(config.env_mode())
}

fn maintenance_db_arg(config: &TransferConfig) -> Option<String> {
    config
        .maintenance_db
        .as_deref()
        .map(|db| format!("--maintenance-db={db}"))
}
