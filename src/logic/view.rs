use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::dependency;
use crate::logic::node::{CustomOperation, NodeDef};
use crate::model::{row_oid, row_str, BrowserNode, NodeResponse, Oid, Row, SqlOptions};
use crate::templates::qt_ident;

/// Placeholder returned by `msql` while required fields are still empty.
pub const INCOMPLETE_DEFINITION: &str = "-- definition incomplete";

/// Returned by `msql` when the form did not change anything.
pub const UNMODIFIED_SQL: &str = "--modified SQL";

/// DDL generated from form data, plus the object name it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    pub sql: String,
    pub name: String,
}

/// Decode query-string arguments. Values are parsed as JSON where
/// possible; keys listed in `raw_keys` (free-text descriptions) are kept
/// verbatim.
pub fn parse_request_args(pairs: &[(String, String)], raw_keys: &[&str]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| {
            let parsed = if raw_keys.contains(&key.as_str()) {
                Value::String(value.clone())
            } else {
                serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.clone()))
            };
            (key.clone(), parsed)
        })
        .collect()
}

pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

pub fn required_oid(row: &Row, column: &str) -> NodeResult<Oid> {
    row_oid(row, column)
        .ok_or_else(|| NodeError::Internal(format!("Column {} missing from result", column)))
}

pub fn gone_message(def: &NodeDef) -> String {
    format!(
        "Could not find the {} in the database.",
        def.title.to_lowercase()
    )
}

/// Leading comment block of reverse-engineered DDL.
pub fn sql_header(keyword: &str, schema: Option<&str>, name: &str) -> String {
    let (display, drop_target) = match schema {
        Some(schema) => (format!("{}.{}", schema, name), qt_ident([schema, name])),
        None => (name.to_string(), qt_ident([name])),
    };
    format!(
        "-- {}: {}\n\n-- DROP {} IF EXISTS {};\n\n",
        keyword, display, keyword, drop_target
    )
}

/// Squeeze runs of blank lines left behind by optional template blocks.
pub fn collapse_blank_lines(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut newlines = 0;
    for c in sql.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
        } else {
            newlines = 0;
            out.push(c);
        }
    }
    out
}

/// DROP statement built from `get_name.sql`, for kinds whose properties
/// query does not carry the qualified name.
pub async fn delete_by_name(ctx: &NodeContext, oid: Oid, cascade: bool) -> NodeResult<Option<String>> {
    let Some(row) = ctx.fetch_first("get_name.sql", ctx.object_args(oid)).await? else {
        return Ok(None);
    };
    let schema = row.get("schema").or_else(|| row.get("nspname")).cloned();
    let sql = ctx.render(
        "delete.sql",
        ctx.args_with(json!({
            "data": row,
            "name": row.get("name"),
            "schema": schema,
            "nspname": schema,
            "cascade": cascade,
        })),
    )?;
    Ok(Some(sql))
}

/// `-- <heading>\n\n-- <DROP ...>\n\n` built from the node's `delete.sql`.
pub fn drop_comment_header(ctx: &NodeContext, heading: &str, data: &Row) -> NodeResult<String> {
    let drop = ctx.render(
        "delete.sql",
        ctx.args_with(json!({
            "data": data,
            "name": data.get("name"),
            "schema": data.get("schema"),
            "nspname": data.get("schema"),
            "cascade": false,
        })),
    )?;
    Ok(format!("-- {}\n\n-- {}\n\n", heading, drop.trim()))
}

/// Map `{label, value}` select options out of result rows.
pub fn select_options(rows: &[Row], label: &str, value: &str) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                json!({
                    "label": row.get(label).cloned().unwrap_or(Value::Null),
                    "value": row.get(value).cloned().unwrap_or(Value::Null),
                })
            })
            .collect(),
    )
}

/// One object type's view. The provided methods implement the standard
/// verb protocol over the node's SQL templates; modules override the hooks
/// (`format_properties`, `prepare_create`, ...) or whole verbs where their
/// catalog needs more.
#[async_trait]
pub trait NodeView: Send + Sync {
    fn def(&self) -> &'static NodeDef;

    fn custom_operations(&self) -> &'static [CustomOperation] {
        &[]
    }

    /// Template listing the tree nodes of this kind.
    fn nodes_template(&self) -> &'static str {
        "nodes.sql"
    }

    /// Arguments `create` insists on.
    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    /// Query arguments kept as raw strings by `msql`.
    fn raw_string_keys(&self) -> &'static [&'static str] {
        &["description", "comment"]
    }

    /// Templates rendered after `create.sql`, e.g. `grant.sql`.
    fn extra_create_templates(&self) -> &'static [&'static str] {
        &[]
    }

    fn supports_diff(&self) -> bool {
        false
    }

    fn diff_ignore_keys(&self) -> &'static [&'static str] {
        &["oid", "oid-2", "schema", "xmin"]
    }

    /// Object name used in not-found messages.
    fn object_name(&self) -> String {
        self.def().title.to_lowercase()
    }

    /// Checks on create data beyond the required arguments.
    fn validate_create(&self, _data: &Row) -> NodeResult<()> {
        Ok(())
    }

    fn gone(&self) -> NodeError {
        NodeError::gone(gone_message(self.def()))
    }

    fn browser_node(&self, ctx: &NodeContext, row: &Row) -> NodeResult<BrowserNode> {
        let def = self.def();
        let oid = required_oid(row, "oid")?;
        let label = row_str(row, "name").unwrap_or_default();
        let mut node = BrowserNode::new(
            def.node_type,
            oid,
            ctx.parent_id(),
            label,
            def.icon(),
            def.inode,
        );
        if let Some(description) = row.get("description") {
            node = node.with_extra("description", description.clone());
        }
        Ok(node)
    }

    async fn format_properties(&self, _ctx: &NodeContext, _oid: Oid, row: Row) -> NodeResult<Row> {
        Ok(row)
    }

    async fn fetch_properties(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<Option<Row>> {
        match ctx.fetch_first("properties.sql", ctx.object_args(oid)).await? {
            Some(row) => Ok(Some(self.format_properties(ctx, oid, row).await?)),
            None => Ok(None),
        }
    }

    /// Reshape form data (or fetched properties) before `create.sql`.
    async fn prepare_create(&self, _ctx: &NodeContext, data: Row) -> NodeResult<Row> {
        Ok(data)
    }

    /// Reshape change data before `update.sql`.
    async fn prepare_update(&self, _ctx: &NodeContext, data: Row, _old: &Row) -> NodeResult<Row> {
        Ok(data)
    }

    fn missing_arg(&self, data: &Row) -> Option<&'static str> {
        self.required_args()
            .iter()
            .copied()
            .find(|arg| is_blank(data.get(*arg)))
    }

    fn render_create(&self, ctx: &NodeContext, data: &Row, display_comments: bool) -> NodeResult<String> {
        let args = ctx.args_with(json!({"data": data, "display_comments": display_comments}));
        let mut sql = ctx.render("create.sql", args.clone())?;
        for template in self.extra_create_templates() {
            let extra = ctx.render(template, args.clone())?;
            if !extra.trim().is_empty() {
                sql.push_str("\n\n");
                sql.push_str(extra.trim_matches('\n'));
            }
        }
        Ok(sql)
    }

    /// Create DDL without an oid, update DDL against the current
    /// properties with one.
    async fn get_sql(&self, ctx: &NodeContext, data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        match oid {
            Some(oid) => {
                let old = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
                let data = self.prepare_update(ctx, data, &old).await?;
                let name = row_str(&data, "name")
                    .or_else(|| row_str(&old, "name"))
                    .unwrap_or_default()
                    .to_string();
                let sql = ctx.render(
                    "update.sql",
                    ctx.args_with(json!({"data": data, "o_data": old})),
                )?;
                Ok(GeneratedSql { sql, name })
            }
            None => {
                let name = row_str(&data, "name").unwrap_or_default().to_string();
                if self.missing_arg(&data).is_some() {
                    return Ok(GeneratedSql {
                        sql: INCOMPLETE_DEFINITION.to_string(),
                        name,
                    });
                }
                let data = self.prepare_create(ctx, data).await?;
                let sql = self.render_create(ctx, &data, false)?;
                Ok(GeneratedSql { sql, name })
            }
        }
    }

    /// Tree node of a freshly created object, found through `get_oid.sql`.
    async fn created_node(&self, ctx: &NodeContext, data: &Row) -> NodeResult<BrowserNode> {
        let def = self.def();
        let row = ctx
            .fetch_first(
                "get_oid.sql",
                ctx.args_with(json!({
                    "data": data,
                    "name": data.get("name"),
                    "schema": data.get("schema"),
                })),
            )
            .await?
            .ok_or_else(|| self.gone())?;

        let oid = required_oid(&row, "oid")?;
        let parent = row_oid(&row, "relnamespace")
            .or_else(|| row_oid(&row, "nspid"))
            .or_else(|| row_oid(&row, "scid"))
            .unwrap_or_else(|| ctx.parent_id());
        let label = row_str(&row, "name")
            .or_else(|| row_str(data, "name"))
            .unwrap_or_default();
        Ok(BrowserNode::new(def.node_type, oid, parent, label, def.icon(), def.inode))
    }

    /// Tree node of an existing object, re-read through `nodes.sql`.
    async fn refreshed_node(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<BrowserNode> {
        let row = ctx
            .fetch_first(self.nodes_template(), ctx.object_args(oid))
            .await?
            .ok_or_else(|| self.gone())?;
        self.browser_node(ctx, &row)
    }

    /// DROP statement for one object, `None` when it no longer exists.
    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, cascade: bool) -> NodeResult<Option<String>> {
        let Some(row) = ctx.fetch_first("properties.sql", ctx.object_args(oid)).await? else {
            return Ok(None);
        };
        let sql = ctx.render(
            "delete.sql",
            ctx.args_with(json!({
                "data": row,
                "name": row.get("name"),
                "schema": row.get("schema"),
                "cascade": cascade,
            })),
        )?;
        Ok(Some(sql))
    }

    fn sql_header(&self, data: &Row) -> String {
        sql_header(
            self.def().ddl_keyword,
            row_str(data, "schema"),
            row_str(data, "name").unwrap_or_default(),
        )
    }

    /// Reverse-engineered DDL of an existing object.
    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }

        let mut data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        if let Some(schema) = &opts.diff_schema {
            data.insert("schema".into(), json!(schema));
        }
        let data = self.prepare_create(ctx, data).await?;
        let body = self.render_create(ctx, &data, true)?;
        Ok(format!("{}{}", self.sql_header(&data), body.trim_matches('\n')))
    }

    /// DDL for schema diff: an update when change data is given, otherwise
    /// the create (or, with `drop_sql`, drop) statement of the object.
    async fn get_sql_from_diff(
        &self,
        ctx: &NodeContext,
        oid: Oid,
        data: Option<Row>,
        opts: &SqlOptions,
    ) -> NodeResult<String> {
        match data {
            Some(mut data) => {
                if let Some(schema) = &opts.diff_schema {
                    data.insert("schema".into(), json!(schema));
                }
                Ok(self.get_sql(ctx, data, Some(oid)).await?.sql)
            }
            None => self.reverse_sql(ctx, oid, opts).await,
        }
    }

    fn diff_key(&self, node_row: &Row, _properties: &Row) -> String {
        row_str(node_row, "name").unwrap_or_default().to_string()
    }

    /// Properties of every object in the schema, keyed for comparison.
    async fn objects_to_compare(&self, ctx: &NodeContext) -> NodeResult<BTreeMap<String, Row>> {
        let nodes = ctx
            .fetch(self.nodes_template(), ctx.args_with(json!({"schema_diff": true})))
            .await?;
        let mut objects = BTreeMap::new();
        for row in nodes.rows {
            let oid = required_oid(&row, "oid")?;
            let Some(mut properties) = self.fetch_properties(ctx, oid).await? else {
                continue;
            };
            properties.entry("oid").or_insert_with(|| json!(oid));
            objects.insert(self.diff_key(&row, &properties), properties);
        }
        Ok(objects)
    }

    async fn list(&self, ctx: &NodeContext) -> NodeResult<NodeResponse> {
        let rows = ctx.fetch("properties.sql", ctx.args()).await?;
        Ok(NodeResponse::Raw(Value::Array(
            rows.rows.into_iter().map(Value::Object).collect(),
        )))
    }

    async fn nodes(&self, ctx: &NodeContext) -> NodeResult<NodeResponse> {
        let rows = ctx.fetch(self.nodes_template(), ctx.args()).await?;
        let nodes = rows
            .rows
            .iter()
            .map(|row| self.browser_node(ctx, row))
            .collect::<NodeResult<Vec<_>>>()?;
        Ok(NodeResponse::data(serde_json::to_value(nodes)?))
    }

    async fn node(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<NodeResponse> {
        let node = self.refreshed_node(ctx, oid).await?;
        Ok(NodeResponse::data(serde_json::to_value(node)?))
    }

    async fn properties(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<NodeResponse> {
        let row = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        Ok(NodeResponse::Raw(Value::Object(row)))
    }

    async fn create(&self, ctx: &NodeContext, data: Row) -> NodeResult<NodeResponse> {
        if let Some(arg) = self.missing_arg(&data) {
            return Err(NodeError::missing(arg));
        }
        self.validate_create(&data)?;
        let generated = self.get_sql(ctx, data.clone(), None).await?;
        ctx.conn.execute_scalar(&generated.sql).await?;
        let node = self.created_node(ctx, &data).await?;
        Ok(NodeResponse::Node(node))
    }

    async fn update(&self, ctx: &NodeContext, oid: Oid, data: Row) -> NodeResult<NodeResponse> {
        let generated = self.get_sql(ctx, data, Some(oid)).await?;
        let sql = generated.sql.trim();
        if sql.is_empty() {
            return Ok(NodeResponse::info("Nothing to update.", self.response_ids(ctx, oid)));
        }
        ctx.conn.execute_scalar(sql).await?;
        let node = self.refreshed_node(ctx, oid).await?;
        Ok(NodeResponse::Node(node))
    }

    fn response_ids(&self, ctx: &NodeContext, oid: Oid) -> Value {
        let mut ids = json!({
            "id": oid,
            "gid": ctx.ids.gid,
            "sid": ctx.ids.sid,
            "did": ctx.ids.did,
        });
        if let (Some(scid), Value::Object(map)) = (ctx.scid(), &mut ids) {
            map.insert("scid".into(), json!(scid));
        }
        ids
    }

    async fn delete(&self, ctx: &NodeContext, oids: Vec<Oid>, cascade: bool) -> NodeResult<NodeResponse> {
        let def = self.def();
        let mut last = None;
        for oid in oids {
            let Some(sql) = self.delete_sql(ctx, oid, cascade).await? else {
                return Err(NodeError::ObjectNotFound {
                    info: format!("The specified {} could not be found.\n", self.object_name()),
                });
            };
            ctx.conn.execute_scalar(&sql).await?;
            last = Some(oid);
        }
        let data = match last {
            Some(oid) => self.response_ids(ctx, oid),
            None => Value::Null,
        };
        Ok(NodeResponse::info(format!("{} dropped", def.title), data))
    }

    async fn msql(&self, ctx: &NodeContext, oid: Option<Oid>, data: Row) -> NodeResult<NodeResponse> {
        let generated = self.get_sql(ctx, data, oid).await?;
        let sql = generated.sql.trim_matches(|c: char| c == '\n' || c == ' ');
        if sql.is_empty() {
            return Ok(NodeResponse::data(UNMODIFIED_SQL));
        }
        Ok(NodeResponse::data(sql))
    }

    async fn sql(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<NodeResponse> {
        let sql = self.reverse_sql(ctx, oid, &SqlOptions::default()).await?;
        Ok(NodeResponse::text(sql))
    }

    async fn dependents(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<NodeResponse> {
        let dependents = dependency::get_dependents(ctx, oid, None).await?;
        Ok(NodeResponse::Raw(dependency::to_value(&dependents)))
    }

    async fn dependencies(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<NodeResponse> {
        let dependencies = dependency::get_dependencies(ctx, oid, None).await?;
        Ok(NodeResponse::Raw(dependency::to_value(&dependencies)))
    }

    async fn statistics(&self, ctx: &NodeContext, oid: Option<Oid>) -> NodeResult<NodeResponse> {
        let result = match oid {
            Some(oid) => ctx.fetch("stats.sql", ctx.object_args(oid)).await?,
            None => ctx.fetch("coll_stats.sql", ctx.args()).await?,
        };
        Ok(NodeResponse::data(serde_json::to_value(result)?))
    }

    /// Validate the object before its child collections are listed.
    async fn check_children(&self, _ctx: &NodeContext, _oid: Oid) -> NodeResult<()> {
        Ok(())
    }

    async fn custom(
        &self,
        _ctx: &NodeContext,
        action: &str,
        _oid: Option<Oid>,
        _data: Row,
    ) -> NodeResult<NodeResponse> {
        Err(NodeError::NotFound(format!(
            "Unsupported operation {} for {}",
            action,
            self.def().node_type
        )))
    }
}
