use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::bgprocess::JobCommand;
use crate::logic::context::NodeContext;
use crate::logic::node::{CustomOperation, HttpMethod, NodeDef, ParentLevel, Scope, TemplateLayout};
use crate::logic::privileges::{format_request_acls, group_privileges_by_type, parse_security_labels};
use crate::logic::view::NodeView;
use crate::model::{row_bool, row_str, value_oid, NodeResponse, Oid, Row};
use crate::templates::{qt_ident, template_path};

pub static VIEW: NodeDef = NodeDef {
    node_type: "view",
    label: "Views",
    title: "View",
    parent: ParentLevel::Schema,
    children: None,
    id_name: "vid",
    template_kind: "views",
    layout: TemplateLayout::ByServerType,
    inode: false,
    server_types: &[],
    min_version: 0,
    max_version: None,
    ddl_keyword: "VIEW",
};

pub static MVIEW: NodeDef = NodeDef {
    node_type: "mview",
    label: "Materialized Views",
    title: "Materialized View",
    parent: ParentLevel::Schema,
    children: None,
    id_name: "vid",
    template_kind: "mviews",
    layout: TemplateLayout::ByServerType,
    inode: false,
    server_types: &[],
    min_version: 90300,
    max_version: None,
    ddl_keyword: "MATERIALIZED VIEW",
};

static VIEW_OPERATIONS: [CustomOperation; 2] = [
    CustomOperation::new("select_sql", HttpMethod::Get, Scope::Both),
    CustomOperation::new("insert_sql", HttpMethod::Get, Scope::Both),
];

static MVIEW_OPERATIONS: [CustomOperation; 3] = [
    CustomOperation::new("select_sql", HttpMethod::Get, Scope::Both),
    CustomOperation::new("insert_sql", HttpMethod::Get, Scope::Both),
    CustomOperation::new("refresh_data", HttpMethod::Put, Scope::Object),
];

const VIEW_ACLS: &[(&str, &[&str])] = &[("relacl", &["a", "r", "w", "d", "D", "x", "t"])];
const MVIEW_ACLS: &[(&str, &[&str])] = &[("relacl", &["r"])];

pub const REFRESH_JOB_CREATED: &str = "Materialized view refresh job created.";

/// Flags posted as JSON booleans or their text form.
fn flag(data: &Row, key: &str) -> bool {
    match data.get(key) {
        Some(Value::String(s)) => s == "true",
        _ => row_bool(data, key),
    }
}

pub fn select_script(relation: &str, columns: &[String]) -> String {
    let columns = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };
    format!("SELECT {}\n\tFROM {};", columns, relation)
}

pub fn insert_script(relation: &str, columns: &[String]) -> String {
    if columns.is_empty() {
        return "-- Please create column(s) first...".to_string();
    }
    let placeholders = std::iter::repeat("?").take(columns.len()).join(", ");
    format!(
        "INSERT INTO {}(\n\t{})\n\tVALUES ({});",
        relation,
        columns.join(", "),
        placeholders
    )
}

/// Plain and materialized views share everything but their privileges
/// and the refresh action.
pub struct RelationView {
    def: &'static NodeDef,
    acls: &'static [(&'static str, &'static [&'static str])],
    operations: &'static [CustomOperation],
}

impl RelationView {
    pub fn view() -> Self {
        Self {
            def: &VIEW,
            acls: VIEW_ACLS,
            operations: &VIEW_OPERATIONS,
        }
    }

    pub fn materialized() -> Self {
        Self {
            def: &MVIEW,
            acls: MVIEW_ACLS,
            operations: &MVIEW_OPERATIONS,
        }
    }

    async fn resolve_schema(&self, ctx: &NodeContext, data: &mut Row) -> NodeResult<()> {
        if let Some(Value::Number(number)) = data.get("schema") {
            let Some(scid) = number.as_u64() else {
                return Ok(());
            };
            let name = ctx.scalar("get_schema.sql", ctx.args_with(json!({"scid": scid}))).await?;
            data.insert("schema".into(), name);
        }
        Ok(())
    }

    /// Qualified name and quoted column list of the relation.
    async fn relation_columns(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<(String, Vec<String>)> {
        let view = ctx
            .fetch_first("properties.sql", ctx.object_args(oid))
            .await?
            .ok_or_else(|| self.gone())?;
        let relation = qt_ident([
            row_str(&view, "schema").unwrap_or_default(),
            row_str(&view, "name").unwrap_or_default(),
        ]);
        let columns_path = template_path("columns", None, ctx.info.version);
        let sql = ctx.render_in(&columns_path, "properties.sql", ctx.args_with(json!({"tid": oid})))?;
        let columns = ctx
            .conn
            .execute_dict(&sql)
            .await?
            .rows
            .iter()
            .filter_map(|column| row_str(column, "name"))
            .map(|name| qt_ident([name]))
            .collect();
        Ok((relation, columns))
    }

    async fn refresh_data(&self, ctx: &NodeContext, oid: Oid, data: &Row) -> NodeResult<NodeResponse> {
        let view = ctx
            .fetch_first("get_view_name.sql", ctx.object_args(oid))
            .await?
            .ok_or_else(|| self.gone())?;
        let name = row_str(&view, "name").unwrap_or_default();
        let schema = row_str(&view, "schema").unwrap_or_default();
        let sql = ctx.render(
            "refresh.sql",
            ctx.args_with(json!({
                "name": name,
                "nspname": schema,
                "is_concurrent": flag(data, "concurrent"),
                "with_data": flag(data, "with_data"),
            })),
        )?;

        let command = JobCommand::psql(&ctx.settings.psql_path, &ctx.server, &ctx.database.name, &sql);
        let job = ctx
            .jobs
            .spawn(format!("Refresh Materialized View ({}.{})", schema, name), command)?;
        Ok(NodeResponse::info(
            REFRESH_JOB_CREATED,
            json!({"job_id": job.id, "desc": job.desc, "status": job.status}),
        ))
    }
}

#[async_trait]
impl NodeView for RelationView {
    fn def(&self) -> &'static NodeDef {
        self.def
    }

    fn custom_operations(&self) -> &'static [CustomOperation] {
        self.operations
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name", "schema", "definition"]
    }

    fn raw_string_keys(&self) -> &'static [&'static str] {
        &["description", "comment", "definition"]
    }

    fn extra_create_templates(&self) -> &'static [&'static str] {
        &["grant.sql"]
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn diff_ignore_keys(&self) -> &'static [&'static str] {
        &["oid", "schema", "xmin", "oid-2", "setting", "indrelid"]
    }

    fn gone(&self) -> NodeError {
        NodeError::gone(format!("Could not find the {}.", self.def.title.to_lowercase()))
    }

    async fn format_properties(&self, ctx: &NodeContext, oid: Oid, mut row: Row) -> NodeResult<Row> {
        let acl = ctx.fetch("acl.sql", ctx.object_args(oid)).await?;
        row.extend(group_privileges_by_type(&acl.rows));
        let labels = parse_security_labels(&row, "seclabels").unwrap_or_default();
        row.insert("seclabels".into(), Value::Array(labels));
        Ok(row)
    }

    async fn prepare_create(&self, ctx: &NodeContext, mut data: Row) -> NodeResult<Row> {
        self.resolve_schema(ctx, &mut data).await?;
        format_request_acls(&mut data, self.acls, false);
        Ok(data)
    }

    async fn prepare_update(&self, ctx: &NodeContext, mut data: Row, _old: &Row) -> NodeResult<Row> {
        self.resolve_schema(ctx, &mut data).await?;
        format_request_acls(&mut data, self.acls, true);
        Ok(data)
    }

    async fn custom(
        &self,
        ctx: &NodeContext,
        action: &str,
        oid: Option<Oid>,
        data: Row,
    ) -> NodeResult<NodeResponse> {
        let oid = oid
            .or_else(|| data.get("vid").and_then(value_oid))
            .ok_or_else(|| NodeError::NotFound("Object id required.".into()))?;
        match action {
            "select_sql" => {
                let (relation, columns) = self.relation_columns(ctx, oid).await?;
                Ok(NodeResponse::text(select_script(&relation, &columns)))
            }
            "insert_sql" => {
                let (relation, columns) = self.relation_columns(ctx, oid).await?;
                Ok(NodeResponse::text(insert_script(&relation, &columns)))
            }
            "refresh_data" => self.refresh_data(ctx, oid, &data).await,
            _ => Err(NodeError::NotFound(format!(
                "Unsupported operation {} for {}",
                action, self.def.node_type
            ))),
        }
    }
}
