use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row as _};
use tokio::sync::RwLock;

use crate::config::DatabaseConfig;
use crate::error::{NodeError, NodeResult};
use crate::model::{DatabaseInfo, Oid, Server, ServerInfo, ServerType, DATABASE_LAST_SYSTEM_OID};
use crate::store::postgres::PgSession;
use crate::store::traits::{Connection, ConnectionProvider};

/// Connection state for one registered server: the version detected on
/// first contact plus one pool per database.
pub struct ServerManager {
    server: Server,
    pool_config: DatabaseConfig,
    info: RwLock<Option<ServerInfo>>,
    maintenance: RwLock<Option<PgPool>>,
    databases: RwLock<HashMap<Oid, (DatabaseInfo, PgPool)>>,
}

impl ServerManager {
    pub fn new(server: Server, pool_config: DatabaseConfig) -> Self {
        Self {
            server,
            pool_config,
            info: RwLock::new(None),
            maintenance: RwLock::new(None),
            databases: RwLock::new(HashMap::new()),
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    fn connect_options(&self, database: &str) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.server.host)
            .port(self.server.port)
            .username(&self.server.username)
            .database(database)
            .application_name("pgnode-browser");
        if let Some(password) = &self.server.password {
            options = options.password(password);
        }
        options
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.pool_config.max_connections.unwrap_or(5))
            .acquire_timeout(Duration::from_secs(
                self.pool_config.acquire_timeout_secs.unwrap_or(10),
            ))
    }

    async fn maintenance_pool(&self) -> NodeResult<PgPool> {
        if let Some(pool) = self.maintenance.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut slot = self.maintenance.write().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        log::info!(
            "Connecting to server #{} ({}:{}/{})",
            self.server.id,
            self.server.host,
            self.server.port,
            self.server.maintenance_db
        );
        let pool = self
            .pool_options()
            .connect_with(self.connect_options(&self.server.maintenance_db))
            .await?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    pub fn cached_info(&self) -> Option<ServerInfo> {
        self.info.try_read().ok().and_then(|info| info.clone())
    }

    pub async fn server_info(&self) -> NodeResult<ServerInfo> {
        if let Some(info) = self.info.read().await.as_ref() {
            return Ok(info.clone());
        }

        let pool = self.maintenance_pool().await?;
        let row = sqlx::query(
            "SELECT version() AS version, current_setting('server_version_num') AS version_num",
        )
        .fetch_one(&pool)
        .await?;
        let banner: String = row.try_get("version")?;
        let version_num: String = row.try_get("version_num")?;
        let version = version_num
            .parse::<u32>()
            .map_err(|_| NodeError::Internal(format!("Invalid server version: {}", version_num)))?;

        let info = ServerInfo {
            sid: self.server.id,
            version,
            server_type: ServerType::from_version_string(&banner),
        };
        log::info!(
            "Server #{} is {} version {}",
            self.server.id,
            info.server_type.as_str(),
            info.version
        );
        *self.info.write().await = Some(info.clone());
        Ok(info)
    }

    async fn lookup_database(&self, did: Oid) -> NodeResult<DatabaseInfo> {
        let info = self.server_info().await?;
        let pool = self.maintenance_pool().await?;

        let sql = if info.version >= 150000 {
            "SELECT datname::text AS datname, NULL::text AS datlastsysoid FROM pg_catalog.pg_database WHERE oid = $1"
        } else {
            "SELECT datname::text AS datname, datlastsysoid::text AS datlastsysoid FROM pg_catalog.pg_database WHERE oid = $1"
        };
        let row = sqlx::query(sql)
            .bind(sqlx::postgres::types::Oid(did))
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| NodeError::gone("Could not find the specified database."))?;

        let datlastsysoid: Option<String> = row.try_get("datlastsysoid")?;
        Ok(DatabaseInfo {
            did,
            name: row.try_get("datname")?,
            datlastsysoid: datlastsysoid
                .and_then(|v| v.parse().ok())
                .unwrap_or(DATABASE_LAST_SYSTEM_OID),
        })
    }

    async fn database_pool(&self, did: Oid) -> NodeResult<(DatabaseInfo, PgPool)> {
        if let Some(entry) = self.databases.read().await.get(&did) {
            return Ok(entry.clone());
        }

        let info = self.lookup_database(did).await?;
        let pool = self
            .pool_options()
            .connect_with(self.connect_options(&info.name))
            .await?;

        let mut databases = self.databases.write().await;
        let entry = databases.entry(did).or_insert((info, pool));
        Ok(entry.clone())
    }

    pub async fn database_info(&self, did: Oid) -> NodeResult<DatabaseInfo> {
        Ok(self.database_pool(did).await?.0)
    }

    pub async fn connection(&self, did: Oid) -> NodeResult<PgSession> {
        let (info, pool) = self.database_pool(did).await?;
        let conn = pool.acquire().await?;
        Ok(PgSession::new(self.server.id, info.name, conn))
    }
}

/// The registered servers, each behind its own [`ServerManager`].
pub struct ConnectionRegistry {
    managers: HashMap<u32, Arc<ServerManager>>,
}

impl ConnectionRegistry {
    pub fn new(servers: &[Server], pool_config: &DatabaseConfig) -> Self {
        let managers = servers
            .iter()
            .map(|server| {
                (
                    server.id,
                    Arc::new(ServerManager::new(server.clone(), pool_config.clone())),
                )
            })
            .collect();
        Self { managers }
    }

    fn manager(&self, sid: u32) -> NodeResult<&Arc<ServerManager>> {
        self.managers
            .get(&sid)
            .ok_or_else(|| NodeError::gone("Could not find the specified server."))
    }
}

#[async_trait::async_trait]
impl ConnectionProvider for ConnectionRegistry {
    fn server(&self, sid: u32) -> Option<Server> {
        self.managers.get(&sid).map(|m| m.server().clone())
    }

    fn servers(&self) -> Vec<Server> {
        let mut servers: Vec<Server> = self.managers.values().map(|m| m.server().clone()).collect();
        servers.sort_by_key(|s| s.id);
        servers
    }

    fn connected_info(&self, sid: u32) -> Option<ServerInfo> {
        self.managers.get(&sid).and_then(|m| m.cached_info())
    }

    async fn server_info(&self, sid: u32) -> NodeResult<ServerInfo> {
        self.manager(sid)?.server_info().await
    }

    async fn database_info(&self, sid: u32, did: Oid) -> NodeResult<DatabaseInfo> {
        self.manager(sid)?.database_info(did).await
    }

    async fn connection(&self, sid: u32, did: Oid) -> NodeResult<Arc<dyn Connection>> {
        let session = self.manager(sid)?.connection(did).await?;
        Ok(Arc::new(session))
    }
}
