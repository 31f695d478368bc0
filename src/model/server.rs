use serde::{Deserialize, Serialize};

use crate::model::Oid;

/// A registered server: connection metadata plus the optional schema
/// restriction filter applied to the schema collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: u32,
    #[serde(default = "default_group")]
    pub gid: u32,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_maintenance_db")]
    pub maintenance_db: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub restricted_schemas: Option<Vec<String>>,
}

fn default_group() -> u32 {
    1
}

fn default_port() -> u16 {
    5432
}

fn default_maintenance_db() -> String {
    "postgres".to_string()
}

impl Server {
    /// True when the schema may be shown under this server's databases.
    pub fn schema_visible(&self, schema: &str) -> bool {
        match &self.restricted_schemas {
            Some(allowed) if !allowed.is_empty() => allowed.iter().any(|s| s == schema),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Community PostgreSQL.
    Pg,
    /// EDB Postgres Advanced Server.
    Ppas,
    /// Greenplum.
    Gpdb,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Pg => "pg",
            ServerType::Ppas => "ppas",
            ServerType::Gpdb => "gpdb",
        }
    }

    /// Classify a server from its `version()` banner.
    pub fn from_version_string(version: &str) -> Self {
        if version.contains("EnterpriseDB") {
            ServerType::Ppas
        } else if version.contains("Greenplum") {
            ServerType::Gpdb
        } else {
            ServerType::Pg
        }
    }
}

/// What the connection manager learned about a server on first connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub sid: u32,
    /// `server_version_num`, e.g. 150004.
    pub version: u32,
    pub server_type: ServerType,
}

impl ServerInfo {
    pub fn major_version(&self) -> u32 {
        self.version / 10000
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub did: Oid,
    pub name: String,
    pub datlastsysoid: Oid,
}
