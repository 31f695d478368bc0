use serde::{Deserialize, Serialize};
use serde_json::Value;

/// PostgreSQL object identifier.
pub type Oid = u32;

/// One catalog row, keyed by column name in select-list order.
pub type Row = serde_json::Map<String, Value>;

/// Last system oid reported for databases on servers without `datlastsysoid`.
pub const DATABASE_LAST_SYSTEM_OID: Oid = 16383;

/// Parent id every DBMS job-scheduler collection hangs off.
pub const DBMS_JOB_SCHEDULER_ID: Oid = 999999;

/// Ids parsed from a `/browser/<node>/<action>/...` url.
///
/// `parent` is the schema (or job scheduler) id for nodes that live below
/// the database level; `oid` is the object itself when the url addresses a
/// single object rather than the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIds {
    pub gid: u32,
    pub sid: u32,
    pub did: Oid,
    pub parent: Option<Oid>,
    pub oid: Option<Oid>,
}

impl NodeIds {
    pub fn database(gid: u32, sid: u32, did: Oid) -> Self {
        Self {
            gid,
            sid,
            did,
            parent: None,
            oid: None,
        }
    }

    pub fn with_parent(mut self, parent: Oid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_oid(mut self, oid: Oid) -> Self {
        self.oid = Some(oid);
        self
    }

    /// Schema id, or the database id for database-level nodes.
    pub fn parent_or_did(&self) -> Oid {
        self.parent.unwrap_or(self.did)
    }
}

/// Options of the reverse-engineered `sql` verb used by schema diff.
#[derive(Debug, Clone, Default)]
pub struct SqlOptions {
    /// Rewrite the schema name of the DDL into this schema.
    pub diff_schema: Option<String>,
    /// Only emit the DROP statement.
    pub drop_sql: bool,
}

/// Read a column as an oid regardless of whether the driver produced a
/// number or its text form.
pub fn row_oid(row: &Row, column: &str) -> Option<Oid> {
    match row.get(column)? {
        Value::Number(n) => n.as_u64().map(|v| v as Oid),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

pub fn row_bool(row: &Row, column: &str) -> bool {
    matches!(row.get(column), Some(Value::Bool(true)))
}

/// Interpret a request value as an oid (numbers and numeric strings).
pub fn value_oid(value: &Value) -> Option<Oid> {
    match value {
        Value::Number(n) => n.as_u64().map(|v| v as Oid),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
