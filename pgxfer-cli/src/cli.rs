use std::path::PathBuf;

use clap::{Parser, ValueEnum, builder::BoolishValueParser};
use tracing::level_filters::LevelFilter;

/// Copy a PostgreSQL database between servers by piping pg_dump into pg_restore.
///
/// Every option can also be set through the environment variable shown, from a
/// `.env` file, or from a TOML file given with `--config`. Command-line flags
/// win over the environment, which wins over the file.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "PGXFER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Issue DROP commands for every restored object before recreating it
    #[arg(long, env = "CLEAN_DEST", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub clean_dest: Option<bool>,

    /// Drop and recreate the destination database before restoring into it
    #[arg(long, env = "INIT_DEST", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub init_dest: Option<bool>,

    /// Restore object ownership (false passes --no-owner to pg_restore)
    #[arg(long, env = "OWNER", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub owner: Option<bool>,

    /// Restore access privileges (false passes --no-acl to pg_restore)
    #[arg(long, env = "ACL", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub acl: Option<bool>,

    /// Console log level
    #[arg(long, env = "LOG_LEVEL", ignore_case = true)]
    pub log_level: Option<LogLevel>,

    /// Directory in which to write daily log files
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Network address of the source database server
    #[arg(long, env = "SOURCE_HOST")]
    pub source_host: Option<String>,

    /// Network port of the source database server
    #[arg(long, env = "SOURCE_PORT")]
    pub source_port: Option<u16>,

    /// Username for the source database server
    #[arg(long, env = "SOURCE_USERNAME")]
    pub source_username: Option<String>,

    /// Password for the source database server
    #[arg(long, env = "SOURCE_PASSWORD", hide_env_values = true)]
    pub source_password: Option<String>,

    /// Name of the database to dump on the source server
    #[arg(long, env = "SOURCE_NAME")]
    pub source_name: Option<String>,

    /// Network address of the destination database server
    #[arg(long, env = "DEST_HOST")]
    pub dest_host: Option<String>,

    /// Network port of the destination database server
    #[arg(long, env = "DEST_PORT")]
    pub dest_port: Option<u16>,

    /// Username for the destination database server
    #[arg(long, env = "DEST_USERNAME")]
    pub dest_username: Option<String>,

    /// Password for the destination database server
    #[arg(long, env = "DEST_PASSWORD", hide_env_values = true)]
    pub dest_password: Option<String>,

    /// Name of the database to restore into on the destination server
    #[arg(long, env = "DEST_NAME")]
    pub dest_name: Option<String>,

    /// Path to pg_dump
    #[arg(long, env = "PG_DUMP")]
    pub pg_dump: Option<PathBuf>,

    /// Path to pg_restore
    #[arg(long, env = "PG_RESTORE")]
    pub pg_restore: Option<PathBuf>,

    /// Path to dropdb
    #[arg(long, env = "DROPDB")]
    pub dropdb: Option<PathBuf>,

    /// Path to createdb
    #[arg(long, env = "CREATEDB")]
    pub createdb: Option<PathBuf>,

    /// Database dropdb/createdb connect to while reinitialising the destination
    #[arg(long, env = "MAINTENANCE_DB")]
    pub maintenance_db: Option<String>,

    /// Pass the parent environment through to the PostgreSQL tools
    #[arg(long, env = "INHERIT_ENV", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub inherit_env: Option<bool>,

    /// Number of trailing diagnostic lines reported when a stage fails
    #[arg(long, env = "EXCERPT_LINES")]
    pub excerpt_lines: Option<usize>,
}

/// Log levels accepted by `--log-level`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Notset,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Critical | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Notset => LevelFilter::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let args = Args::try_parse_from(["pgxfer", "--log-level", "WARNING"]).unwrap();
        assert_eq!(args.log_level, Some(LogLevel::Warning));
        assert_eq!(LogLevel::Warning.as_filter(), LevelFilter::WARN);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let args =
            Args::try_parse_from(["pgxfer", "--init-dest", "no", "--clean-dest", "true"]).unwrap();
        assert_eq!(args.init_dest, Some(false));
        assert_eq!(args.clean_dest, Some(true));
    }
}
