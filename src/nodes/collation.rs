use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::node::{CustomOperation, HttpMethod, NodeDef, ParentLevel, Scope, TemplateLayout};
use crate::logic::view::{delete_by_name, drop_comment_header, is_blank, NodeView};
use crate::model::{row_str, NodeResponse, Oid, Row, SqlOptions};

pub static COLLATION: NodeDef = NodeDef {
    node_type: "collation",
    label: "Collations",
    title: "Collation",
    parent: ParentLevel::Schema,
    children: None,
    id_name: "coid",
    template_kind: "collations",
    layout: TemplateLayout::Plain,
    inode: false,
    server_types: &[],
    min_version: 90100,
    max_version: None,
    ddl_keyword: "COLLATION",
};

static OPERATIONS: [CustomOperation; 1] = [CustomOperation::new("get_collations", HttpMethod::Get, Scope::Both)];

/// A collation is defined by a locale, by copying another collation or by
/// both `lc_collate` and `lc_type`.
fn has_definition(data: &Row) -> bool {
    !is_blank(data.get("locale"))
        || !is_blank(data.get("copy_collation"))
        || (!is_blank(data.get("lc_collate")) && !is_blank(data.get("lc_type")))
}

pub struct CollationView;

#[async_trait]
impl NodeView for CollationView {
    fn def(&self) -> &'static NodeDef {
        &COLLATION
    }

    fn custom_operations(&self) -> &'static [CustomOperation] {
        &OPERATIONS
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name", "schema"]
    }

    fn validate_create(&self, data: &Row) -> NodeResult<()> {
        if has_definition(data) {
            Ok(())
        } else {
            Err(NodeError::gone(
                "Incomplete definition. Please provide Locale OR Copy Collation OR LC_TYPE/LC_COLLATE",
            ))
        }
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("Could not find the collation object in the database. It may have been removed by another user.")
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, cascade: bool) -> NodeResult<Option<String>> {
        delete_by_name(ctx, oid, cascade).await
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        let mut data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        if let Some(schema) = &opts.diff_schema {
            data.insert("schema".into(), json!(schema));
        }
        let heading = format!("Collation: {};", row_str(&data, "name").unwrap_or_default());
        let header = drop_comment_header(ctx, &heading, &data)?;
        let body = self.render_create(ctx, &data, true)?;
        Ok(format!("{}{}", header, body.trim_matches('\n')))
    }

    async fn custom(
        &self,
        ctx: &NodeContext,
        action: &str,
        _oid: Option<Oid>,
        _data: Row,
    ) -> NodeResult<NodeResponse> {
        match action {
            "get_collations" => {
                let rows = ctx.fetch("get_collations.sql", ctx.args()).await?;
                let mut options = vec![json!({"label": "", "value": ""})];
                options.extend(rows.rows.iter().map(|row| {
                    let name = row.get("copy_collation").cloned().unwrap_or(Value::Null);
                    json!({"label": name, "value": name})
                }));
                Ok(NodeResponse::data(Value::Array(options)))
            }
            _ => Err(NodeError::NotFound(format!("Unsupported operation {} for collation", action))),
        }
    }
}
