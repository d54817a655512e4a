//! Connection profiles and the libpq environment derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const PGHOST: &str = "PGHOST";
pub const PGPORT: &str = "PGPORT";
pub const PGUSER: &str = "PGUSER";
pub const PGPASSWORD: &str = "PGPASSWORD";
pub const PGDATABASE: &str = "PGDATABASE";

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Which end of the transfer a profile or environment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Dest,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Dest => f.write_str("dest"),
        }
    }
}

/// Parameters identifying one database endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database name.
    pub name: String,
}

impl ConnectionProfile {
    /// Default profile for the source server.
    pub fn source_default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            name: "postgres".to_string(),
        }
    }

    /// Default profile for the destination server.
    pub fn dest_default() -> Self {
        Self {
            host: "dest".to_string(),
            ..Self::source_default()
        }
    }

    /// The libpq environment variables that point a client at this endpoint.
    pub fn libpq_env(&self) -> [(&'static str, String); 5] {
        [
            (PGHOST, self.host.clone()),
            (PGPORT, self.port.to_string()),
            (PGUSER, self.username.clone()),
            (PGPASSWORD, self.password.clone()),
            (PGDATABASE, self.name.clone()),
        ]
    }
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self::source_default()
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}
