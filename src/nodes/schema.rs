use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::NodeResult;
use crate::logic::context::NodeContext;
use crate::logic::node::{NodeDef, ParentLevel, TemplateLayout};
use crate::logic::privileges::{format_request_acls, group_privileges_by_type, parse_security_labels};
use crate::logic::view::{delete_by_name, drop_comment_header, required_oid, NodeView};
use crate::model::{row_str, value_oid, BrowserNode, NodeResponse, Oid, Row, SqlOptions};

pub static SCHEMA: NodeDef = NodeDef {
    node_type: "schema",
    label: "Schemas",
    title: "Schema",
    parent: ParentLevel::Database,
    children: Some(ParentLevel::Schema),
    id_name: "scid",
    template_kind: "schemas",
    layout: TemplateLayout::ByServerType,
    inode: true,
    server_types: &[],
    min_version: 0,
    max_version: None,
    ddl_keyword: "SCHEMA",
};

/// Privilege columns of a schema and the codes each accepts.
const SCHEMA_ACLS: &[(&str, &[&str])] = &[
    ("nspacl", &["C", "U"]),
    ("deftblacl", &["a", "r", "w", "d", "D", "x", "t"]),
    ("defseqacl", &["r", "w", "U"]),
    ("deffuncacl", &["X"]),
    ("deftypeacl", &["U"]),
];

pub struct SchemaView;

#[async_trait]
impl NodeView for SchemaView {
    fn def(&self) -> &'static NodeDef {
        &SCHEMA
    }

    fn browser_node(&self, ctx: &NodeContext, row: &Row) -> NodeResult<BrowserNode> {
        let oid = required_oid(row, "oid")?;
        let flag = |key: &str| row.get(key).cloned().unwrap_or(Value::Bool(false));
        let mut node = BrowserNode::new(
            SCHEMA.node_type,
            oid,
            ctx.parent_id(),
            row_str(row, "name").unwrap_or_default(),
            SCHEMA.icon(),
            SCHEMA.inode,
        )
        .with_extra("can_create", flag("can_create"))
        .with_extra("has_usage", flag("has_usage"));
        if let Some(description) = row.get("description") {
            node = node.with_extra("description", description.clone());
        }
        Ok(node)
    }

    async fn nodes(&self, ctx: &NodeContext) -> NodeResult<NodeResponse> {
        let rows = ctx.fetch("nodes.sql", ctx.args()).await?;
        let nodes = rows
            .rows
            .iter()
            .filter(|row| ctx.server.schema_visible(row_str(row, "name").unwrap_or_default()))
            .map(|row| self.browser_node(ctx, row))
            .collect::<NodeResult<Vec<_>>>()?;
        Ok(NodeResponse::data(serde_json::to_value(nodes)?))
    }

    async fn format_properties(&self, ctx: &NodeContext, oid: Oid, mut row: Row) -> NodeResult<Row> {
        if let Some(labels) = parse_security_labels(&row, "seclabels") {
            row.insert("seclabels".into(), json!(labels));
        }
        let acl = ctx.fetch("acl.sql", ctx.object_args(oid)).await?;
        row.extend(group_privileges_by_type(&acl.rows));
        let defacl = ctx.fetch("defacl.sql", ctx.object_args(oid)).await?;
        row.extend(group_privileges_by_type(&defacl.rows));
        Ok(row)
    }

    async fn prepare_create(&self, _ctx: &NodeContext, mut data: Row) -> NodeResult<Row> {
        format_request_acls(&mut data, SCHEMA_ACLS, false);
        Ok(data)
    }

    async fn prepare_update(&self, _ctx: &NodeContext, mut data: Row, old: &Row) -> NodeResult<Row> {
        if !data.contains_key("name") {
            if let Some(name) = old.get("name") {
                data.insert("name".into(), name.clone());
            }
        }
        format_request_acls(&mut data, SCHEMA_ACLS, true);
        Ok(data)
    }

    async fn created_node(&self, ctx: &NodeContext, data: &Row) -> NodeResult<BrowserNode> {
        let name = row_str(data, "name").unwrap_or_default();
        let oid = ctx
            .scalar("oid.sql", ctx.args_with(json!({"schema": name, "data": data})))
            .await?;
        let oid = value_oid(&oid).ok_or_else(|| self.gone())?;
        Ok(BrowserNode::new(
            SCHEMA.node_type,
            oid,
            ctx.ids.did,
            name,
            SCHEMA.icon(),
            SCHEMA.inode,
        ))
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, cascade: bool) -> NodeResult<Option<String>> {
        delete_by_name(ctx, oid, cascade).await
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        let data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        let heading = format!("SCHEMA: {}", row_str(&data, "name").unwrap_or_default());
        let header = drop_comment_header(ctx, &heading, &data)?;
        let data = self.prepare_create(ctx, data).await?;
        let body = self.render_create(ctx, &data, true)?;
        Ok(format!("{}{}", header, body.trim_matches('\n')))
    }

    /// System catalogs have their own module; a schema that no longer
    /// exists has no children at all.
    async fn check_children(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<()> {
        match ctx.fetch_first("is_catalog.sql", ctx.object_args(oid)).await? {
            Some(_) => Ok(()),
            None => Err(self.gone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::privileges::parse_priv_to_db;

    #[test]
    fn test_default_table_acl_collapses_to_all() {
        let allowed = SCHEMA_ACLS
            .iter()
            .find(|(key, _)| *key == "deftblacl")
            .map(|(_, allowed)| *allowed)
            .unwrap();
        let privileges: Vec<Value> = allowed
            .iter()
            .map(|code| json!({"privilege_type": code, "privilege": true, "with_grant": false}))
            .collect();
        let parsed = parse_priv_to_db(&[json!({"grantee": "app", "privileges": privileges})], allowed);
        assert_eq!(parsed[0]["without_grant"], json!(["ALL"]));
    }
}
