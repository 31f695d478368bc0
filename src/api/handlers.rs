use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    response::Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::{NodeError, NodeResult};
use crate::logic::context::precondition;
use crate::logic::node::{resolve_verb, HttpMethod, ParentLevel};
use crate::logic::registry::dispatch;
use crate::logic::view::parse_request_args;
use crate::model::{BrowserNode, NodeIds, NodeResponse, Row, ServerType, DBMS_JOB_SCHEDULER_ID};
use crate::state::AppState;
use crate::store::ConnectionProvider;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

const JOB_SCHEDULER_MIN_VERSION: u32 = 90600;

/// Form data of a request: query-string arguments, overlaid by the JSON
/// body when there is one.
fn request_data(query: &[(String, String)], raw_keys: &[&str], body: &[u8]) -> NodeResult<Row> {
    let mut data = parse_request_args(query, raw_keys);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(data);
    }
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(fields) => {
            data.extend(fields);
            Ok(data)
        }
        Value::Null => Ok(data),
        _ => Err(NodeError::BadRequest("Request body must be a JSON object.".into())),
    }
}

fn split_ids(ids: &str) -> Vec<&str> {
    ids.split('/').filter(|s| !s.is_empty()).collect()
}

fn unrouted(node_type: &str, action: &str) -> NodeError {
    NodeError::NotFound(format!("No route for {} {}", node_type, action))
}

/// `/browser/<node_type>/<action>/<gid>/<sid>/<did>[/<scid>][/<oid>]`
pub async fn node_request<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    method: Method,
    Path((node_type, action, ids)): Path<(String, String, String)>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> ApiResult {
    let segments = split_ids(&ids);
    match (node_type.as_str(), action.as_str()) {
        ("database", "children") => return database_children(&*state, &segments).await,
        ("dbms_job_scheduler", "children") => return scheduler_children(&*state, &segments).await,
        _ => {}
    }

    let view = state
        .registry
        .get(&node_type)
        .ok_or_else(|| unrouted(&node_type, &action))?;
    let def = view.def();
    let ids = def
        .parse_ids(&segments)
        .ok_or_else(|| NodeError::BadRequest(format!("Invalid object path: {}", ids)))?;
    let http_method = HttpMethod::parse(method.as_str()).ok_or_else(|| unrouted(&node_type, &action))?;
    let verb = resolve_verb(&action, http_method, ids.oid.is_some(), view.custom_operations())
        .ok_or_else(|| unrouted(&node_type, &action))?;

    let data = request_data(&query, view.raw_string_keys(), &body)?;
    log::debug!("{} {} {:?} on {:?}", method, node_type, verb, ids);

    let ctx = precondition(&*state, def, ids).await?;
    let response = dispatch(&state.registry, view.as_ref(), &ctx, verb, data).await?;
    Ok(ApiResponse(response))
}

fn database_ids(segments: &[&str]) -> NodeResult<NodeIds> {
    let numbers = segments
        .iter()
        .map(|s| s.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| NodeError::BadRequest("Invalid object path.".into()))?;
    match numbers.as_slice() {
        [gid, sid, did] | [gid, sid, did, _] => Ok(NodeIds::database(*gid, *sid, *did)),
        _ => Err(NodeError::BadRequest("Invalid object path.".into())),
    }
}

/// Collections directly below a database, plus the job scheduler on
/// Advanced Server.
async fn database_children<P: ConnectionProvider + ?Sized>(state: &AppState<P>, segments: &[&str]) -> ApiResult {
    let ids = database_ids(segments)?;
    if state.provider.server(ids.sid).is_none() {
        return Err(NodeError::gone("Could not find the specified server.").into());
    }
    let info = state.provider.server_info(ids.sid).await?;

    let mut nodes = state.registry.collection_nodes(ParentLevel::Database, &info, ids.did);
    if info.server_type == ServerType::Ppas && info.version >= JOB_SCHEDULER_MIN_VERSION {
        nodes.push(BrowserNode::new(
            "dbms_job_scheduler",
            DBMS_JOB_SCHEDULER_ID,
            ids.did,
            "DBMS Job Scheduler",
            "icon-dbms_job_scheduler",
            true,
        ));
    }
    Ok(ApiResponse(NodeResponse::data(serde_json::to_value(nodes).map_err(NodeError::from)?)))
}

async fn scheduler_children<P: ConnectionProvider + ?Sized>(state: &AppState<P>, segments: &[&str]) -> ApiResult {
    let ids = database_ids(segments)?;
    if state.provider.server(ids.sid).is_none() {
        return Err(NodeError::gone("Could not find the specified server.").into());
    }
    let info = state.provider.server_info(ids.sid).await?;
    let nodes = state
        .registry
        .collection_nodes(ParentLevel::JobScheduler, &info, DBMS_JOB_SCHEDULER_ID);
    Ok(ApiResponse(NodeResponse::data(serde_json::to_value(nodes).map_err(NodeError::from)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_data_merges_query_and_body() {
        let query = vec![
            ("name".to_string(), "orders".to_string()),
            ("description".to_string(), "123".to_string()),
            ("seqcycle".to_string(), "true".to_string()),
        ];
        let data = request_data(&query, &["description"], br#"{"schema": "public"}"#).unwrap();
        assert_eq!(data.get("name"), Some(&json!("orders")));
        assert_eq!(data.get("description"), Some(&json!("123")));
        assert_eq!(data.get("seqcycle"), Some(&json!(true)));
        assert_eq!(data.get("schema"), Some(&json!("public")));
    }

    #[test]
    fn test_request_data_rejects_non_object_body() {
        assert!(request_data(&[], &[], b"  ").unwrap().is_empty());
        assert!(matches!(
            request_data(&[], &[], b"[1, 2]"),
            Err(NodeError::BadRequest(_))
        ));
    }

    #[test]
    fn test_database_ids() {
        let ids = database_ids(&["1", "2", "13799"]).unwrap();
        assert_eq!(ids, NodeIds::database(1, 2, 13799));
        assert!(database_ids(&["1", "2"]).is_err());
        assert!(database_ids(&["1", "x", "3"]).is_err());
    }
}
