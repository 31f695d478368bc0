use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::bgprocess::BackgroundJobs;
use crate::logic::node::{NodeDef, ParentLevel};
use crate::model::{DatabaseInfo, NodeIds, Oid, Row, Server, ServerInfo};
use crate::state::AppState;
use crate::store::{Connection, ConnectionProvider, ResultSet};
use crate::templates::TemplateRenderer;

/// Settings every node view reads, taken from the application config.
#[derive(Debug, Clone, Default)]
pub struct BrowserSettings {
    pub show_system_objects: bool,
    pub ignore_whitespaces: bool,
    pub psql_path: String,
}

/// Everything a verb needs for one request: the open connection, the
/// server it points at and the template directory of the node.
pub struct NodeContext {
    pub def: &'static NodeDef,
    pub ids: NodeIds,
    pub server: Server,
    pub info: ServerInfo,
    pub database: DatabaseInfo,
    pub template_path: String,
    pub conn: Arc<dyn Connection>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub settings: Arc<BrowserSettings>,
    pub jobs: Arc<BackgroundJobs>,
}

/// Resolve the server, connection and template path for a node request.
pub async fn precondition<P>(
    state: &AppState<P>,
    def: &'static NodeDef,
    ids: NodeIds,
) -> NodeResult<NodeContext>
where
    P: ConnectionProvider + ?Sized,
{
    let server = state
        .provider
        .server(ids.sid)
        .ok_or_else(|| NodeError::gone("Could not find the specified server."))?;
    let info = state.provider.server_info(ids.sid).await?;
    if !def.supports(&info) {
        return Err(NodeError::gone("This node is not supported by the server."));
    }
    let database = state.provider.database_info(ids.sid, ids.did).await?;
    let conn = state.provider.connection(ids.sid, ids.did).await?;

    Ok(NodeContext {
        def,
        ids,
        template_path: def.template_path(&info),
        server,
        info,
        database,
        conn,
        templates: state.templates.clone(),
        settings: state.settings.clone(),
        jobs: state.jobs.clone(),
    })
}

impl NodeContext {
    pub fn parent_id(&self) -> Oid {
        self.def.parent_id(&self.ids)
    }

    pub fn scid(&self) -> Option<Oid> {
        match self.def.parent {
            ParentLevel::Schema => self.ids.parent,
            _ => None,
        }
    }

    pub fn is_system_oid(&self, oid: Oid) -> bool {
        oid <= self.database.datlastsysoid
    }

    /// Keyword arguments shared by every template of this node.
    pub fn args(&self) -> Row {
        let mut args = Row::new();
        args.insert("gid".into(), json!(self.ids.gid));
        args.insert("sid".into(), json!(self.ids.sid));
        args.insert("did".into(), json!(self.ids.did));
        args.insert("datlastsysoid".into(), json!(self.database.datlastsysoid));
        args.insert("show_sysobj".into(), json!(self.settings.show_system_objects));
        args.insert("server_type".into(), json!(self.info.server_type.as_str()));
        args.insert("version".into(), json!(self.info.version));
        if let Some(scid) = self.scid() {
            args.insert("scid".into(), json!(scid));
        }
        args
    }

    /// [`Self::args`] plus the object's id under the node's id name.
    pub fn object_args(&self, oid: Oid) -> Row {
        let mut args = self.args();
        args.insert(self.def.id_name.into(), json!(oid));
        args
    }

    /// [`Self::args`] merged with the entries of `extra`.
    pub fn args_with(&self, extra: Value) -> Row {
        merge_args(self.args(), extra)
    }

    pub fn render(&self, file: &str, args: Row) -> NodeResult<String> {
        self.render_in(&self.template_path, file, args)
    }

    pub fn render_in(&self, directory: &str, file: &str, args: Row) -> NodeResult<String> {
        let path = format!("{}/{}", directory, file);
        self.templates.render(&path, &Value::Object(args))
    }

    /// Template directory of a sibling kind, e.g. programs from the jobs view.
    pub fn sibling_path(&self, kind: &str) -> String {
        self.def.template_path_for(kind, &self.info)
    }

    pub async fn fetch(&self, file: &str, args: Row) -> NodeResult<ResultSet> {
        let sql = self.render(file, args)?;
        self.conn.execute_dict(&sql).await
    }

    pub async fn fetch_first(&self, file: &str, args: Row) -> NodeResult<Option<Row>> {
        Ok(self.fetch(file, args).await?.rows.into_iter().next())
    }

    pub async fn scalar(&self, file: &str, args: Row) -> NodeResult<Value> {
        let sql = self.render(file, args)?;
        self.conn.execute_scalar(&sql).await
    }
}

/// Overlay the entries of an object value onto `base`.
pub fn merge_args(mut base: Row, extra: Value) -> Row {
    if let Value::Object(extra) = extra {
        for (key, value) in extra {
            base.insert(key, value);
        }
    }
    base
}
