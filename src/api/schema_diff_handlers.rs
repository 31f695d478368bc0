use axum::extract::{Path, State};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::NodeError;
use crate::logic::schema_diff::{self, DdlRequest, SchemaRef};
use crate::model::{ComparisonStatus, NodeResponse, Oid};
use crate::state::AppState;
use crate::store::ConnectionProvider;

pub async fn initialize<P: ConnectionProvider + ?Sized>(State(state): State<Arc<AppState<P>>>) -> ApiResult {
    let trans_id = state.diff_sessions.initialize();
    Ok(NodeResponse::data(json!({ "schemaDiffTransId": trans_id })).into())
}

pub async fn close<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path(trans_id): Path<u64>,
) -> ApiResult {
    state.diff_sessions.close(trans_id);
    Ok(NodeResponse::data(Value::Null).into())
}

pub async fn poll<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path(trans_id): Path<u64>,
) -> ApiResult {
    let progress = state.diff_sessions.poll(trans_id)?;
    Ok(NodeResponse::data(serde_json::to_value(progress).map_err(NodeError::from)?).into())
}

pub async fn servers<P: ConnectionProvider + ?Sized>(State(state): State<Arc<AppState<P>>>) -> ApiResult {
    Ok(NodeResponse::data(schema_diff::list_servers(&*state)).into())
}

pub async fn schemas<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path((sid, did)): Path<(u32, Oid)>,
) -> ApiResult {
    let schemas = schema_diff::list_schemas(&*state, sid, did).await?;
    Ok(NodeResponse::data(schemas).into())
}

pub async fn compare<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path((trans_id, source_sid, source_did, source_scid, target_sid, target_did, target_scid)): Path<(
        u64,
        u32,
        Oid,
        Oid,
        u32,
        Oid,
        Oid,
    )>,
) -> ApiResult {
    let source = SchemaRef {
        sid: source_sid,
        did: source_did,
        scid: source_scid,
    };
    let target = SchemaRef {
        sid: target_sid,
        did: target_did,
        scid: target_scid,
    };
    log::info!(
        "Schema diff {}: comparing {:?} against {:?}",
        trans_id,
        source,
        target
    );
    let items = schema_diff::compare_schemas(&*state, trans_id, source, target).await?;
    Ok(ApiResponse(NodeResponse::data(
        serde_json::to_value(items).map_err(NodeError::from)?,
    )))
}

/// Url parameters of `ddl_compare`.
type DdlComparePath = (u64, u32, Oid, Oid, u32, Oid, Oid, Oid, Oid, String, String);

pub async fn ddl_compare<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path(path): Path<DdlComparePath>,
) -> ApiResult {
    let (
        trans_id,
        source_sid,
        source_did,
        source_scid,
        target_sid,
        target_did,
        target_scid,
        source_oid,
        target_oid,
        node_type,
        comp_status,
    ) = path;
    let status = ComparisonStatus::parse(&comp_status)
        .ok_or_else(|| NodeError::BadRequest(format!("Invalid comparison status: {}", comp_status)))?;

    let request = DdlRequest {
        source: SchemaRef {
            sid: source_sid,
            did: source_did,
            scid: source_scid,
        },
        target: SchemaRef {
            sid: target_sid,
            did: target_did,
            scid: target_scid,
        },
        source_oid,
        target_oid,
        node_type,
        status,
    };
    let ddl = schema_diff::ddl_compare(&*state, trans_id, &request).await?;
    Ok(NodeResponse::data(serde_json::to_value(ddl).map_err(NodeError::from)?).into())
}
