use std::sync::Arc;

use serde_json::Value;

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::node::{ParentLevel, Verb};
use crate::logic::view::NodeView;
use crate::model::{value_oid, BrowserNode, NodeResponse, Oid, Row, ServerInfo};

/// Every registered node view, in registration order. The order is also
/// the order schema diff walks the diff-capable nodes.
#[derive(Default)]
pub struct NodeRegistry {
    views: Vec<Arc<dyn NodeView>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<V: NodeView + 'static>(&mut self, view: V) {
        self.views.push(Arc::new(view));
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeView>> {
        self.views
            .iter()
            .find(|view| view.def().node_type == node_type)
            .cloned()
    }

    pub fn views(&self) -> &[Arc<dyn NodeView>] {
        &self.views
    }

    /// Collection nodes of the modules living at `level` that the server
    /// supports.
    pub fn collection_nodes(&self, level: ParentLevel, info: &ServerInfo, parent_id: Oid) -> Vec<BrowserNode> {
        self.views
            .iter()
            .map(|view| view.def())
            .filter(|def| def.parent == level && def.supports(info))
            .map(|def| BrowserNode::collection(def.node_type, def.label, parent_id))
            .collect()
    }

    /// Nodes the schema diff compares on this server, in order.
    pub fn diff_views(&self, info: &ServerInfo) -> Vec<Arc<dyn NodeView>> {
        self.views
            .iter()
            .filter(|view| view.supports_diff() && view.def().parent == ParentLevel::Schema)
            .filter(|view| view.def().supports(info))
            .cloned()
            .collect()
    }
}

/// Ids of a collection-level delete: `{"ids": [..]}`.
fn ids_from_body(data: &Row) -> NodeResult<Vec<Oid>> {
    match data.get("ids") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| value_oid(item).ok_or_else(|| NodeError::BadRequest("Invalid object id.".into())))
            .collect(),
        _ => Err(NodeError::missing("ids")),
    }
}

/// Run a resolved verb against a view.
pub async fn dispatch(
    registry: &NodeRegistry,
    view: &dyn NodeView,
    ctx: &NodeContext,
    verb: Verb,
    data: Row,
) -> NodeResult<NodeResponse> {
    let oid = ctx.ids.oid;
    let object = || oid.ok_or_else(|| NodeError::NotFound("Object id required.".into()));

    match verb {
        Verb::List => view.list(ctx).await,
        Verb::Nodes => view.nodes(ctx).await,
        Verb::Node => view.node(ctx, object()?).await,
        Verb::Properties => view.properties(ctx, object()?).await,
        Verb::Create => view.create(ctx, data).await,
        Verb::Update => view.update(ctx, object()?, data).await,
        Verb::Delete { cascade } => {
            let oids = match oid {
                Some(oid) => vec![oid],
                None => ids_from_body(&data)?,
            };
            view.delete(ctx, oids, cascade).await
        }
        Verb::Msql => view.msql(ctx, oid, data).await,
        Verb::Sql => view.sql(ctx, object()?).await,
        Verb::Dependents => view.dependents(ctx, object()?).await,
        Verb::Dependencies => view.dependencies(ctx, object()?).await,
        Verb::Statistics => view.statistics(ctx, oid).await,
        Verb::Children => {
            let oid = object()?;
            view.check_children(ctx, oid).await?;
            let nodes = match view.def().children {
                Some(level) => registry.collection_nodes(level, &ctx.info, oid),
                None => Vec::new(),
            };
            Ok(NodeResponse::data(serde_json::to_value(nodes)?))
        }
        Verb::Custom(action) => view.custom(ctx, action, oid, data).await,
    }
}
