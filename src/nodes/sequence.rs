use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::dependency::{self, Dependency};
use crate::logic::node::{NodeDef, ParentLevel, TemplateLayout};
use crate::logic::privileges::{format_request_acls, group_privileges_by_type, parse_security_labels};
use crate::logic::view::NodeView;
use crate::model::{row_str, NodeResponse, Oid, Row};

pub static SEQUENCE: NodeDef = NodeDef {
    node_type: "sequence",
    label: "Sequences",
    title: "Sequence",
    parent: ParentLevel::Schema,
    children: None,
    id_name: "seid",
    template_kind: "sequences",
    layout: TemplateLayout::Plain,
    inode: false,
    server_types: &[],
    min_version: 0,
    max_version: None,
    ddl_keyword: "SEQUENCE",
};

const SEQUENCE_ACLS: &[(&str, &[&str])] = &[("relacl", &["r", "w", "U"])];

/// `get_def.sql` column and the property it is shown as.
const DEFINITION_COLUMNS: &[(&str, &str)] = &[
    ("last_value", "current_value"),
    ("min_value", "minimum"),
    ("max_value", "maximum"),
    ("increment_by", "increment"),
    ("start_value", "start"),
    ("cache_value", "cache"),
    ("is_cycled", "cycled"),
];

fn merge_definition(row: &mut Row, definition: &Row) {
    for (column, property) in DEFINITION_COLUMNS {
        let value = definition.get(*column).cloned().unwrap_or(Value::Null);
        row.insert((*property).to_string(), value);
    }
}

/// Owned-by columns pg_depend does not report against the sequence itself.
fn owning_column(row: &Row) -> Option<Dependency> {
    let name = row_str(row, "refname")?;
    let field = match row_str(row, "deptype") {
        Some("a") => "auto",
        Some("n") => "normal",
        Some("i") => "internal",
        _ => "",
    };
    Some(Dependency {
        object_type: "column".to_string(),
        name: name.to_string(),
        field: field.to_string(),
        oid: None,
    })
}

pub struct SequenceView;

#[async_trait]
impl NodeView for SequenceView {
    fn def(&self) -> &'static NodeDef {
        &SEQUENCE
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name", "schema", "seqowner"]
    }

    fn extra_create_templates(&self) -> &'static [&'static str] {
        &["grant.sql"]
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn diff_ignore_keys(&self) -> &'static [&'static str] {
        &["oid", "oid-2", "schema", "xmin", "current_value"]
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("could not find the sequence in the database.")
    }

    async fn format_properties(&self, ctx: &NodeContext, oid: Oid, mut row: Row) -> NodeResult<Row> {
        let definition = ctx
            .fetch_first("get_def.sql", ctx.args_with(json!({"data": row})))
            .await?
            .unwrap_or_default();
        merge_definition(&mut row, &definition);

        let labels = parse_security_labels(&row, "securities").unwrap_or_default();
        row.insert("securities".into(), Value::Array(labels));

        let acl = ctx.fetch("acl.sql", ctx.object_args(oid)).await?;
        let mut grouped = group_privileges_by_type(&acl.rows);
        let relacl = grouped.remove("relacl").unwrap_or_else(|| json!([]));
        row.insert("relacl".into(), relacl);
        row.extend(grouped);
        Ok(row)
    }

    async fn prepare_create(&self, _ctx: &NodeContext, mut data: Row) -> NodeResult<Row> {
        format_request_acls(&mut data, SEQUENCE_ACLS, false);
        Ok(data)
    }

    async fn prepare_update(&self, _ctx: &NodeContext, mut data: Row, old: &Row) -> NodeResult<Row> {
        format_request_acls(&mut data, SEQUENCE_ACLS, true);
        for key in ["name", "schema"] {
            if !data.contains_key(key) {
                if let Some(value) = old.get(key) {
                    data.insert(key.to_string(), value.clone());
                }
            }
        }
        Ok(data)
    }

    async fn dependencies(&self, ctx: &NodeContext, oid: Oid) -> NodeResult<NodeResponse> {
        let mut dependencies = dependency::get_dependencies(ctx, oid, None).await?;
        let owners = ctx.fetch("get_dependencies.sql", ctx.object_args(oid)).await?;
        dependencies.extend(owners.rows.iter().filter_map(owning_column));
        Ok(NodeResponse::Raw(dependency::to_value(&dependencies)))
    }
}
