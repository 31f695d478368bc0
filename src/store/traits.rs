use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::NodeResult;
use crate::model::{DatabaseInfo, Oid, Row, Server, ServerInfo};

/// Rows returned by one statement, keyed by column name in select-list
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A database connection as node views see it.
///
/// Statements are sent as plain text so one call may carry several
/// statements separated by semicolons.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    async fn execute_dict(&self, sql: &str) -> NodeResult<ResultSet>;

    async fn execute_2darray(&self, sql: &str) -> NodeResult<ResultSet> {
        self.execute_dict(sql).await
    }

    /// First column of the first row, `Null` when the statement returns
    /// nothing.
    async fn execute_scalar(&self, sql: &str) -> NodeResult<Value> {
        let result = self.execute_dict(sql).await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().map(|(_, value)| value))
            .unwrap_or(Value::Null))
    }

    async fn execute_void(&self, sql: &str) -> NodeResult<()>;
}

/// Hands out connections for registered servers.
#[async_trait::async_trait]
pub trait ConnectionProvider: Send + Sync {
    fn server(&self, sid: u32) -> Option<Server>;

    fn servers(&self) -> Vec<Server>;

    /// Server details if a connection has already been made, without
    /// connecting.
    fn connected_info(&self, sid: u32) -> Option<ServerInfo>;

    /// Version and flavour of the server, connecting on first use.
    async fn server_info(&self, sid: u32) -> NodeResult<ServerInfo>;

    async fn database_info(&self, sid: u32, did: Oid) -> NodeResult<DatabaseInfo>;

    /// A connection to database `did`, held for the rest of the request.
    async fn connection(&self, sid: u32, did: Oid) -> NodeResult<Arc<dyn Connection>>;
}
