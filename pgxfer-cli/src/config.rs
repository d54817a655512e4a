//! Layered settings: defaults, then the TOML file, then environment and flags.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use pgxfer_engine::TransferConfig;
use serde::Deserialize;

use crate::cli::{Args, LogLevel};
use crate::error::{CliError, Result};

/// Contents of a `--config` file. Keys mirror the command-line flags.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub clean_dest: Option<bool>,
    pub init_dest: Option<bool>,
    pub owner: Option<bool>,
    pub acl: Option<bool>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,

    pub source_host: Option<String>,
    pub source_port: Option<u16>,
    pub source_username: Option<String>,
    pub source_password: Option<String>,
    pub source_name: Option<String>,

    pub dest_host: Option<String>,
    pub dest_port: Option<u16>,
    pub dest_username: Option<String>,
    pub dest_password: Option<String>,
    pub dest_name: Option<String>,

    pub pg_dump: Option<PathBuf>,
    pub pg_restore: Option<PathBuf>,
    pub dropdb: Option<PathBuf>,
    pub createdb: Option<PathBuf>,
    pub maintenance_db: Option<String>,
    pub inherit_env: Option<bool>,
    pub excerpt_lines: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Logging settings resolved alongside the transfer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub dir: Option<PathBuf>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub transfer: TransferConfig,
    pub log: LogSettings,
}

impl Settings {
    /// Load the file named by `args` (if any) and resolve everything.
    pub fn load(args: Args) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Merge `args` over `file` over the built-in defaults.
    pub fn resolve(args: Args, file: FileConfig) -> Result<Self> {
        let mut transfer = TransferConfig::default();

        macro_rules! layer {
            ($target:expr, $field:ident) => {
                if let Some(value) = args.$field.or(file.$field) {
                    $target = value;
                }
            };
        }

        layer!(transfer.restore.clean_dest, clean_dest);
        layer!(transfer.init_dest, init_dest);
        layer!(transfer.restore.owner, owner);
        layer!(transfer.restore.acl, acl);

        layer!(transfer.source.host, source_host);
        layer!(transfer.source.port, source_port);
        layer!(transfer.source.username, source_username);
        layer!(transfer.source.password, source_password);
        layer!(transfer.source.name, source_name);

        layer!(transfer.dest.host, dest_host);
        layer!(transfer.dest.port, dest_port);
        layer!(transfer.dest.username, dest_username);
        layer!(transfer.dest.password, dest_password);
        layer!(transfer.dest.name, dest_name);

        layer!(transfer.tools.pg_dump, pg_dump);
        layer!(transfer.tools.pg_restore, pg_restore);
        layer!(transfer.tools.dropdb, dropdb);
        layer!(transfer.tools.createdb, createdb);
        layer!(transfer.inherit_env, inherit_env);
        layer!(transfer.excerpt_lines, excerpt_lines);
        transfer.maintenance_db = args.maintenance_db.or(file.maintenance_db);

        let level = match (args.log_level, file.log_level) {
            (Some(level), _) => level,
            (None, Some(name)) => LogLevel::from_str(&name, true)
                .map_err(|_| CliError::InvalidLogLevel(name))?,
            (None, None) => LogLevel::default(),
        };

        Ok(Self {
            transfer,
            log: LogSettings {
                level,
                dir: args.log_dir.or(file.log_dir),
            },
        })
    }
}
