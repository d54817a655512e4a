//! Transfer configuration.

use std::path::PathBuf;

use process_utils::EnvMode;
use serde::{Deserialize, Serialize};

use crate::profile::{ConnectionProfile, Side};

/// Number of trailing diagnostic lines kept for a failure excerpt.
pub const DEFAULT_EXCERPT_LINES: usize = 20;

/// Paths to the PostgreSQL client binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub pg_dump: PathBuf,
    pub pg_restore: PathBuf,
    pub dropdb: PathBuf,
    pub createdb: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            pg_dump: PathBuf::from("/usr/bin/pg_dump"),
            pg_restore: PathBuf::from("/usr/bin/pg_restore"),
            dropdb: PathBuf::from("/usr/bin/dropdb"),
            createdb: PathBuf::from("/usr/bin/createdb"),
        }
    }
}

/// Options forwarded to `pg_restore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOptions {
    /// Drop database objects before recreating them (`--clean`).
    pub clean_dest: bool,
    /// Restore object ownership; `false` passes `--no-owner`.
    pub owner: bool,
    /// Restore access privileges; `false` passes `--no-acl`.
    pub acl: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            clean_dest: false,
            owner: true,
            acl: true,
        }
    }
}

/// Everything a single transfer needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub source: ConnectionProfile,
    pub dest: ConnectionProfile,
    pub restore: RestoreOptions,
    /// Drop and recreate the destination database before restoring into it.
    pub init_dest: bool,
    pub tools: ToolPaths,
    /// Database `dropdb`/`createdb` connect to, when the default is unsuitable.
    pub maintenance_db: Option<String>,
    /// Layer the connection variables over the parent environment instead of
    /// giving each tool a clean one.
    pub inherit_env: bool,
    pub excerpt_lines: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            source: ConnectionProfile::source_default(),
            dest: ConnectionProfile::dest_default(),
            restore: RestoreOptions::default(),
            init_dest: true,
            tools: ToolPaths::default(),
            maintenance_db: None,
            inherit_env: false,
            excerpt_lines: DEFAULT_EXCERPT_LINES,
        }
    }
}

impl TransferConfig {
    pub fn profile(&self, side: Side) -> &ConnectionProfile {
        match side {
            Side::Source => &self.source,
            Side::Dest => &self.dest,
        }
    }

    /// libpq environment for the given side of the transfer.
    pub fn libpq_env(&self, side: Side) -> [(&'static str, String); 5] {
        self.profile(side).libpq_env()
    }

    pub fn env_mode(&self) -> EnvMode {
        if self.inherit_env {
            EnvMode::Inherit
        } else {
            EnvMode::Isolated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_libpq_conventions() {
        let config = TransferConfig::default();
        assert!(config.init_dest);
        assert!(!config.restore.clean_dest);
        assert!(config.restore.owner);
        assert!(config.restore.acl);
        assert_eq!(config.env_mode(), EnvMode::Isolated);
        assert_eq!(config.tools.pg_dump, PathBuf::from("/usr/bin/pg_dump"));
    }

    #[test]
    fn env_is_scoped_per_side() {
        let mut config = TransferConfig::default();
        config.source.name = "app".to_string();
        config.dest.name = "app_copy".to_string();

        let source = config.libpq_env(Side::Source);
        let dest = config.libpq_env(Side::Dest);
        assert_eq!(source[0], ("PGHOST", "localhost".to_string()));
        assert_eq!(dest[0], ("PGHOST", "dest".to_string()));
        assert_eq!(source[4], ("PGDATABASE", "app".to_string()));
        assert_eq!(dest[4], ("PGDATABASE", "app_copy".to_string()));
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: TransferConfig = toml::from_str(
            r#"
            init_dest = false

            [restore]
            owner = false

            [tools]
            pg_dump = "/opt/pg/bin/pg_dump"
            "#,
        )
        .unwrap();

        assert!(!config.init_dest);
        assert!(!config.restore.owner);
        assert!(config.restore.acl);
        assert_eq!(config.tools.pg_dump, PathBuf::from("/opt/pg/bin/pg_dump"));
        assert_eq!(config.tools.pg_restore, PathBuf::from("/usr/bin/pg_restore"));
        assert_eq!(config.dest.host, "dest");
    }
}
