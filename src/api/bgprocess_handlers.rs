use axum::extract::{Path, State};
use std::sync::Arc;

use crate::api::response::ApiResult;
use crate::error::NodeError;
use crate::model::NodeResponse;
use crate::state::AppState;
use crate::store::ConnectionProvider;

pub async fn list_jobs<P: ConnectionProvider + ?Sized>(State(state): State<Arc<AppState<P>>>) -> ApiResult {
    let jobs = state.jobs.list();
    Ok(NodeResponse::Raw(serde_json::to_value(jobs).map_err(NodeError::from)?).into())
}

pub async fn get_job<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path(job_id): Path<String>,
) -> ApiResult {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| NodeError::gone(format!("Could not find the process with id {}.", job_id)))?;
    Ok(NodeResponse::Raw(serde_json::to_value(job).map_err(NodeError::from)?).into())
}

pub async fn release_job<P: ConnectionProvider + ?Sized>(
    State(state): State<Arc<AppState<P>>>,
    Path(job_id): Path<String>,
) -> ApiResult {
    let job = state.jobs.remove(&job_id)?;
    Ok(NodeResponse::data(serde_json::to_value(job).map_err(NodeError::from)?).into())
}
