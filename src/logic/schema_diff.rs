//! Schema diff driver: comparison sessions, progress tracking and the
//! per-object DDL triple.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::{precondition, NodeContext};
use crate::logic::directory_compare::{compare_dictionaries, directory_diff, CompareOptions, ItemCounter};
use crate::logic::view::NodeView;
use crate::model::{
    row_str, ComparisonItem, ComparisonStatus, DdlComparison, DiffProgress, NodeIds, Oid, ServerInfo, SqlOptions,
};
use crate::state::AppState;
use crate::store::ConnectionProvider;

pub const COMPARING_OBJECTS: &str = "Comparing objects...";
pub const COMPARE_FINISHED: &str = "Successfully compare the specified schemas.";
pub const TRANSACTION_NOT_FOUND: &str = "Transaction ID not found in the session.";
pub const DDL_NOT_SUPPORTED: &str = "Selected object is not supported for DDL comparison.";

/// Open comparison sessions keyed by transaction id.
pub struct DiffSessions {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, DiffProgress>>,
}

impl Default for DiffSessions {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl DiffSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().insert(id, DiffProgress::default());
        log::info!("Schema diff transaction {} initialized", id);
        id
    }

    /// Drop a session. Unknown ids are ignored.
    pub fn close(&self, id: u64) {
        if self.sessions.lock().remove(&id).is_some() {
            log::info!("Schema diff transaction {} closed", id);
        }
    }

    pub fn exists(&self, id: u64) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    pub fn ensure(&self, id: u64) -> NodeResult<()> {
        if self.exists(id) {
            Ok(())
        } else {
            Err(NodeError::NotFound(TRANSACTION_NOT_FOUND.to_string()))
        }
    }

    pub fn set_progress(&self, id: u64, message: impl Into<String>, percentage: u32) {
        if let Some(progress) = self.sessions.lock().get_mut(&id) {
            progress.message = message.into();
            progress.percentage = percentage;
        }
    }

    /// Current progress. A finished comparison is reported once, then the
    /// session starts over from zero.
    pub fn poll(&self, id: u64) -> NodeResult<DiffProgress> {
        let mut sessions = self.sessions.lock();
        let progress = sessions
            .get_mut(&id)
            .ok_or_else(|| NodeError::NotFound(TRANSACTION_NOT_FOUND.to_string()))?;
        let current = progress.clone();
        if current.percentage >= 100 {
            progress.message = COMPARING_OBJECTS.to_string();
            progress.percentage = 0;
        }
        Ok(current)
    }
}

/// One side of a comparison: a schema of a database on a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaRef {
    pub sid: u32,
    pub did: Oid,
    pub scid: Oid,
}

impl SchemaRef {
    fn ids<P: ConnectionProvider + ?Sized>(&self, state: &AppState<P>) -> NodeIds {
        let gid = state.provider.server(self.sid).map(|s| s.gid).unwrap_or(1);
        NodeIds::database(gid, self.sid, self.did).with_parent(self.scid)
    }
}

/// Round a server version up to its major release.
pub fn round_version(version: u32) -> u32 {
    if version < 10000 {
        if version % 100 == 0 {
            version
        } else {
            version + 100 - version % 100
        }
    } else {
        version + 10000 - version % 10000
    }
}

pub fn check_version_compatibility(source: &ServerInfo, target: &ServerInfo) -> NodeResult<()> {
    if source.server_type != target.server_type {
        return Err(NodeError::PreconditionRequired(
            "Schema diff does not support the comparison between Postgres Server and EDB Postgres Advanced Server."
                .to_string(),
        ));
    }
    if round_version(source.version) != round_version(target.version) {
        return Err(NodeError::PreconditionRequired(
            "Source and Target database server must be of the same major version.".to_string(),
        ));
    }
    Ok(())
}

/// Percentage each compared node type adds to the progress bar.
fn node_percentage(node_count: usize) -> u32 {
    if node_count == 0 {
        return 100;
    }
    (100.0 / node_count as f64).round_ties_even() as u32
}

/// Compare every diff-capable object type of two schemas.
pub async fn compare_schemas<P>(
    state: &AppState<P>,
    trans_id: u64,
    source: SchemaRef,
    target: SchemaRef,
) -> NodeResult<Vec<ComparisonItem>>
where
    P: ConnectionProvider + ?Sized,
{
    let sessions = &state.diff_sessions;
    sessions.ensure(trans_id)?;

    let source_info = state.provider.server_info(source.sid).await?;
    let target_info = state.provider.server_info(target.sid).await?;
    check_version_compatibility(&source_info, &target_info)?;

    sessions.set_progress(trans_id, COMPARING_OBJECTS, 0);

    let options = CompareOptions {
        ignore_whitespaces: state.settings.ignore_whitespaces,
    };
    let views = state.registry.diff_views(&source_info);
    let node_percent = node_percentage(views.len());
    let mut total_percent = 0;
    let mut counter = ItemCounter::new();
    let mut items = Vec::new();

    for view in views {
        let def = view.def();
        sessions.set_progress(trans_id, format!("Comparing {}", def.label), total_percent);

        let result = compare_node(state, view.as_ref(), source, target, options, &mut counter).await;
        match result {
            Ok(found) => items.extend(found),
            Err(e) => {
                log::error!("Schema diff of {} failed: {}", def.node_type, e);
                sessions.set_progress(trans_id, e.to_string(), total_percent);
                return Err(e);
            }
        }
        total_percent += node_percent;
    }

    sessions.set_progress(trans_id, COMPARE_FINISHED, 100);
    log::info!(
        "Schema diff transaction {} compared {} objects",
        trans_id,
        items.len()
    );
    Ok(items)
}

async fn compare_node<P>(
    state: &AppState<P>,
    view: &dyn NodeView,
    source: SchemaRef,
    target: SchemaRef,
    options: CompareOptions,
    counter: &mut ItemCounter,
) -> NodeResult<Vec<ComparisonItem>>
where
    P: ConnectionProvider + ?Sized,
{
    let def = view.def();
    let source_ctx = precondition(state, def, source.ids(state)).await?;
    let target_ctx = precondition(state, def, target.ids(state)).await?;

    let source_objects = view.objects_to_compare(&source_ctx).await?;
    let target_objects = view.objects_to_compare(&target_ctx).await?;

    Ok(compare_dictionaries(
        &source_objects,
        &target_objects,
        def.node_type,
        def.label,
        view.diff_ignore_keys(),
        options,
        counter,
    ))
}

/// Objects selected in the result grid for `ddl_compare`.
#[derive(Debug, Clone, PartialEq)]
pub struct DdlRequest {
    pub source: SchemaRef,
    pub target: SchemaRef,
    pub source_oid: Oid,
    pub target_oid: Oid,
    pub node_type: String,
    pub status: ComparisonStatus,
}

/// Source DDL, target DDL and the DDL turning the target into the source.
pub async fn ddl_compare<P>(state: &AppState<P>, trans_id: u64, request: &DdlRequest) -> NodeResult<DdlComparison>
where
    P: ConnectionProvider + ?Sized,
{
    state.diff_sessions.ensure(trans_id)?;

    let Some(view) = state
        .registry
        .get(&request.node_type)
        .filter(|view| view.supports_diff())
    else {
        return Ok(DdlComparison {
            source_ddl: DDL_NOT_SUPPORTED.to_string(),
            target_ddl: DDL_NOT_SUPPORTED.to_string(),
            diff_ddl: DDL_NOT_SUPPORTED.to_string(),
        });
    };
    let def = view.def();
    let plain = SqlOptions::default();

    let comparison = match request.status {
        ComparisonStatus::SourceOnly => {
            let source_ctx = precondition(state, def, request.source.ids(state)).await?;
            let target_schema = schema_name(state, request.target).await?;
            let source_ddl = view
                .get_sql_from_diff(&source_ctx, request.source_oid, None, &plain)
                .await?;
            let diff_ddl = view
                .get_sql_from_diff(
                    &source_ctx,
                    request.source_oid,
                    None,
                    &SqlOptions {
                        diff_schema: Some(target_schema),
                        drop_sql: false,
                    },
                )
                .await?;
            DdlComparison {
                source_ddl,
                target_ddl: String::new(),
                diff_ddl,
            }
        }
        ComparisonStatus::TargetOnly => {
            let target_ctx = precondition(state, def, request.target.ids(state)).await?;
            let target_ddl = view
                .get_sql_from_diff(&target_ctx, request.target_oid, None, &plain)
                .await?;
            let diff_ddl = view
                .get_sql_from_diff(
                    &target_ctx,
                    request.target_oid,
                    None,
                    &SqlOptions {
                        diff_schema: None,
                        drop_sql: true,
                    },
                )
                .await?;
            DdlComparison {
                source_ddl: String::new(),
                target_ddl,
                diff_ddl,
            }
        }
        ComparisonStatus::Different => {
            let source_ctx = precondition(state, def, request.source.ids(state)).await?;
            let target_ctx = precondition(state, def, request.target.ids(state)).await?;
            let source_ddl = view
                .get_sql_from_diff(&source_ctx, request.source_oid, None, &plain)
                .await?;
            let target_ddl = view
                .get_sql_from_diff(&target_ctx, request.target_oid, None, &plain)
                .await?;

            let source_props = view
                .fetch_properties(&source_ctx, request.source_oid)
                .await?
                .ok_or_else(|| view.gone())?;
            let target_props = view
                .fetch_properties(&target_ctx, request.target_oid)
                .await?
                .ok_or_else(|| view.gone())?;
            let changes = directory_diff(&source_props, &target_props, view.diff_ignore_keys());
            let diff_ddl = if changes.is_empty() {
                String::new()
            } else {
                view.get_sql_from_diff(&target_ctx, request.target_oid, Some(changes), &plain)
                    .await?
            };
            DdlComparison {
                source_ddl,
                target_ddl,
                diff_ddl,
            }
        }
        ComparisonStatus::Identical => {
            let source_ctx = precondition(state, def, request.source.ids(state)).await?;
            let target_ctx = precondition(state, def, request.target.ids(state)).await?;
            DdlComparison {
                source_ddl: view
                    .get_sql_from_diff(&source_ctx, request.source_oid, None, &plain)
                    .await?,
                target_ddl: view
                    .get_sql_from_diff(&target_ctx, request.target_oid, None, &plain)
                    .await?,
                diff_ddl: String::new(),
            }
        }
    };
    Ok(comparison)
}

/// Name of the schema on one side, read through the schema node.
async fn schema_name<P>(state: &AppState<P>, schema: SchemaRef) -> NodeResult<String>
where
    P: ConnectionProvider + ?Sized,
{
    let (view, ctx) = schema_context(state, schema.sid, schema.did).await?;
    let properties = view
        .fetch_properties(&ctx, schema.scid)
        .await?
        .ok_or_else(|| view.gone())?;
    Ok(row_str(&properties, "name").unwrap_or_default().to_string())
}

async fn schema_context<P>(
    state: &AppState<P>,
    sid: u32,
    did: Oid,
) -> NodeResult<(std::sync::Arc<dyn NodeView>, NodeContext)>
where
    P: ConnectionProvider + ?Sized,
{
    let view = state
        .registry
        .get("schema")
        .ok_or_else(|| NodeError::Internal("Schema node is not registered".into()))?;
    let gid = state.provider.server(sid).map(|s| s.gid).unwrap_or(1);
    let ctx = precondition(state, view.def(), NodeIds::database(gid, sid, did)).await?;
    Ok((view, ctx))
}

fn group_label(gid: u32) -> String {
    if gid == 1 {
        "Servers".to_string()
    } else {
        format!("Server Group {}", gid)
    }
}

/// Registered servers grouped by server group, as select options.
pub fn list_servers<P>(state: &AppState<P>) -> Value
where
    P: ConnectionProvider + ?Sized,
{
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for server in state.provider.servers() {
        let info = state.provider.connected_info(server.id);
        let image = match &info {
            Some(info) => format!("icon-{}", info.server_type.as_str()),
            None => "icon-server-not-connected".to_string(),
        };
        groups.entry(group_label(server.gid)).or_default().push(json!({
            "value": server.id,
            "label": server.name,
            "image": image,
            "_id": server.id,
            "connected": info.is_some(),
        }));
    }
    json!(groups)
}

/// Schemas of a database as select options.
pub async fn list_schemas<P>(state: &AppState<P>, sid: u32, did: Oid) -> NodeResult<Value>
where
    P: ConnectionProvider + ?Sized,
{
    let (view, ctx) = schema_context(state, sid, did).await?;
    let rows = ctx.fetch("nodes.sql", ctx.args()).await?;
    let mut schemas = Vec::new();
    for row in &rows.rows {
        let node = view.browser_node(&ctx, row)?;
        if !ctx.server.schema_visible(&node.label) {
            continue;
        }
        schemas.push(json!({
            "value": node.node_id,
            "label": node.label,
            "_id": node.node_id,
            "image": node.icon,
        }));
    }
    Ok(Value::Array(schemas))
}
