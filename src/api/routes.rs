use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;

use crate::api::{bgprocess_handlers, handlers, schema_diff_handlers};
use crate::state::AppState;
use crate::store::ConnectionProvider;

pub fn create_router<P: ConnectionProvider + ?Sized + 'static>() -> Router<Arc<AppState<P>>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Object browser: every node type, verb resolved from action and method
        .route(
            "/browser/:node_type/:action/*ids",
            any(handlers::node_request::<P>),
        )
        // Schema diff
        .route(
            "/schema_diff/initialize",
            get(schema_diff_handlers::initialize::<P>),
        )
        .route(
            "/schema_diff/close/:trans_id",
            any(schema_diff_handlers::close::<P>),
        )
        .route(
            "/schema_diff/poll/:trans_id",
            get(schema_diff_handlers::poll::<P>),
        )
        .route(
            "/schema_diff/servers",
            get(schema_diff_handlers::servers::<P>),
        )
        .route(
            "/schema_diff/schemas/:sid/:did",
            get(schema_diff_handlers::schemas::<P>),
        )
        .route(
            "/schema_diff/compare/:trans_id/:source_sid/:source_did/:source_scid/:target_sid/:target_did/:target_scid",
            get(schema_diff_handlers::compare::<P>),
        )
        .route(
            "/schema_diff/ddl_compare/:trans_id/:source_sid/:source_did/:source_scid/:target_sid/:target_did/:target_scid/:source_oid/:target_oid/:node_type/:comp_status",
            get(schema_diff_handlers::ddl_compare::<P>),
        )
        // Background processes
        .route("/misc/bgprocess", get(bgprocess_handlers::list_jobs::<P>))
        .route(
            "/misc/bgprocess/:job_id",
            get(bgprocess_handlers::get_job::<P>).delete(bgprocess_handlers::release_job::<P>),
        )
}
