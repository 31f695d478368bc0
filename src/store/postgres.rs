use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{Column, Executor, Postgres, Row as _, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use crate::error::NodeResult;
use crate::model::Row;
use crate::store::traits::{Connection, ResultSet};

static QUERY_ID: AtomicU64 = AtomicU64::new(1);

fn next_query_id() -> u64 {
    QUERY_ID.fetch_add(1, Ordering::Relaxed)
}

/// One pooled PostgreSQL connection, borrowed for the lifetime of a request.
///
/// Statements go through the simple query protocol, so every value arrives
/// in its text form and is converted by column type.
pub struct PgSession {
    sid: u32,
    database: String,
    conn: Mutex<PoolConnection<Postgres>>,
}

impl PgSession {
    pub fn new(sid: u32, database: impl Into<String>, conn: PoolConnection<Postgres>) -> Self {
        Self {
            sid,
            database: database.into(),
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait::async_trait]
impl Connection for PgSession {
    async fn execute_dict(&self, sql: &str) -> NodeResult<ResultSet> {
        let query_id = next_query_id();
        log::info!(
            "Execute (dict) for server #{} - {} (Query-id: {}):\n{}",
            self.sid,
            self.database,
            query_id,
            sql
        );

        let mut conn = self.conn.lock().await;
        let rows = match (&mut **conn).fetch_all(sql).await {
            Ok(rows) => rows,
            Err(e) => {
                log::error!(
                    "Failed to execute query (execute_dict) for the server #{} - {} (Query-id: {}):\nError Message:{}",
                    self.sid,
                    self.database,
                    query_id,
                    e
                );
                return Err(e.into());
            }
        };

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect::<NodeResult<Vec<_>>>()?;

        Ok(ResultSet { columns, rows })
    }

    async fn execute_void(&self, sql: &str) -> NodeResult<()> {
        let query_id = next_query_id();
        log::info!(
            "Execute (void) for server #{} - {} (Query-id: {}):\n{}",
            self.sid,
            self.database,
            query_id,
            sql
        );

        let mut conn = self.conn.lock().await;
        if let Err(e) = (&mut **conn).execute(sql).await {
            log::error!(
                "Failed to execute query (execute_void) for the server #{} - {} (Query-id: {}):\nError Message:{}",
                self.sid,
                self.database,
                query_id,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> NodeResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let text: String = row.try_get_unchecked(i)?;
            decode_text(column.type_info().name(), &text)
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Convert the text form of a value into JSON according to its type name.
pub fn decode_text(type_name: &str, text: &str) -> Value {
    if type_name.ends_with("[]") {
        return Value::Array(
            parse_array_literal(text)
                .into_iter()
                .map(|item| item.map(Value::String).unwrap_or(Value::Null))
                .collect(),
        );
    }

    match type_name {
        "BOOL" => Value::Bool(text == "t" || text == "true"),
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "JSON" | "JSONB" => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => Value::String(text.to_string()),
    }
}

/// Split a one-dimensional array literal such as `{a,"b c",NULL}`.
pub fn parse_array_literal(text: &str) -> Vec<Option<String>> {
    let inner = match text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        Some(inner) => inner,
        None => return vec![Some(text.to_string())],
    };
    if inner.is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut depth = 0usize;
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                was_quoted = true;
            }
            '{' if !quoted => {
                depth += 1;
                current.push(c);
            }
            '}' if !quoted => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !quoted && depth == 0 => {
                items.push(finish_element(&current, was_quoted));
                current.clear();
                was_quoted = false;
            }
            _ => current.push(c),
        }
    }
    items.push(finish_element(&current, was_quoted));
    items
}

fn finish_element(text: &str, was_quoted: bool) -> Option<String> {
    if !was_quoted && text == "NULL" {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_scalar_types() {
        assert_eq!(decode_text("BOOL", "t"), json!(true));
        assert_eq!(decode_text("BOOL", "f"), json!(false));
        assert_eq!(decode_text("OID", "16384"), json!(16384));
        assert_eq!(decode_text("INT8", "-9"), json!(-9));
        assert_eq!(decode_text("NAME", "public"), json!("public"));
        assert_eq!(decode_text("JSONB", r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_text("NUMERIC", "1.50"), json!("1.50"));
    }

    #[test]
    fn test_decode_arrays() {
        assert_eq!(
            decode_text("TEXT[]", r#"{search_path=public,"a b",NULL}"#),
            json!(["search_path=public", "a b", null])
        );
        assert_eq!(decode_text("NAME[]", "{}"), json!([]));
    }

    #[test]
    fn test_array_literal_escapes() {
        assert_eq!(
            parse_array_literal(r#"{"x\"y","NULL",NULL}"#),
            vec![Some("x\"y".to_string()), Some("NULL".to_string()), None]
        );
    }
}
