use serde::{Deserialize, Serialize};

use crate::model::Server;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub templates: TemplateConfig,
    pub browser: BrowserConfig,
    pub schema_diff: SchemaDiffConfig,
    pub utilities: UtilityConfig,
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub show_system_objects: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDiffConfig {
    pub ignore_whitespaces: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityConfig {
    pub psql_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            templates: TemplateConfig::default(),
            browser: BrowserConfig::default(),
            schema_diff: SchemaDiffConfig::default(),
            utilities: UtilityConfig::default(),
            servers: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5050,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: Some(5),
            acquire_timeout_secs: Some(10),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            directory: "templates".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            show_system_objects: false,
        }
    }
}

impl Default for SchemaDiffConfig {
    fn default() -> Self {
        Self {
            ignore_whitespaces: false,
        }
    }
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            psql_path: "psql".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "PGNODE_", nested keys split on "__"
        config = config.add_source(
            config::Environment::with_prefix("PGNODE")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn find_server(&self, sid: u32) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == sid)
    }
}
