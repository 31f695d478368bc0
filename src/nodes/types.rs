use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::node::{NodeDef, ParentLevel, TemplateLayout};
use crate::logic::privileges::{format_request_acls, group_privileges_by_type, parse_security_labels};
use crate::logic::view::{drop_comment_header, is_blank, GeneratedSql, NodeView, INCOMPLETE_DEFINITION};
use crate::model::{row_str, value_oid, BrowserNode, Oid, Row, SqlOptions};
use crate::templates::qt_ident;

pub static TYPE: NodeDef = NodeDef {
    node_type: "type",
    label: "Types",
    title: "Type",
    parent: ParentLevel::Schema,
    children: None,
    id_name: "tid",
    template_kind: "types",
    layout: TemplateLayout::Plain,
    inode: false,
    server_types: &[],
    min_version: 0,
    max_version: None,
    ddl_keyword: "TYPE",
};

const TYPE_ACLS: &[(&str, &[&str])] = &[("typacl", &["U"])];

fn storage_keyword(code: &str) -> Option<&'static str> {
    match code {
        "p" => Some("PLAIN"),
        "e" => Some("EXTERNAL"),
        "m" => Some("MAIN"),
        "x" => Some("EXTENDED"),
        _ => None,
    }
}

fn alignment_keyword(code: &str) -> Option<&'static str> {
    match code {
        "c" => Some("char"),
        "s" => Some("int2"),
        "i" => Some("int4"),
        "d" => Some("double"),
        _ => None,
    }
}

/// Storage and alignment codes as the DDL spells them.
pub fn convert_for_sql(data: &mut Row) {
    for (key, convert) in [
        ("typstorage", storage_keyword as fn(&str) -> Option<&'static str>),
        ("typalign", alignment_keyword),
    ] {
        let keyword = row_str(data, key).and_then(convert);
        if let Some(keyword) = keyword {
            data.insert(key.to_string(), json!(keyword));
        }
    }
}

fn array_len(data: &Row, key: &str) -> usize {
    data.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

/// Type name including its modifier and array dimensions.
pub fn full_type_name(schema: Option<&str>, typname: &str, is_dup: bool, dims: i64, typmod: i64) -> String {
    let mut name = match schema {
        Some(schema) if is_dup => qt_ident([schema, typname]),
        _ => typname.to_string(),
    };
    if typmod >= 0 {
        let modifier = match typname {
            "numeric" => {
                let value = typmod - 4;
                Some(format!("({},{})", (value >> 16) & 0xffff, value & 0xffff))
            }
            "character varying" | "varchar" | "character" | "bpchar" | "char" => Some(format!("({})", typmod - 4)),
            "bit" | "bit varying" | "varbit" => Some(format!("({})", typmod)),
            _ => None,
        };
        if let Some(modifier) = modifier {
            name.push_str(&modifier);
        }
    }
    for _ in 0..dims.max(0) {
        name.push_str("[]");
    }
    name
}

/// Length and precision of a modifier such as `(10,2)`.
pub fn length_and_precision(full_type: &str) -> (Option<String>, Option<String>) {
    let Some(open) = full_type.find('(') else {
        return (None, None);
    };
    let Some(close) = full_type[open..].find(')') else {
        return (None, None);
    };
    let inner = &full_type[open + 1..open + close];
    let mut parts = inner.split(',').map(str::trim);
    let is_number = |s: &&str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let length = parts.next().filter(is_number).map(String::from);
    let precision = parts.next().filter(is_number).map(String::from);
    (length, precision)
}

fn composite_member(row: &Row) -> (String, Value) {
    let typname = row_str(row, "typname").unwrap_or_default();
    let number = |key: &str| row.get(key).and_then(Value::as_i64);
    let full_type = full_type_name(
        row_str(row, "collnspname").or_else(|| row_str(row, "typnspname")),
        typname,
        row.get("isdup").and_then(Value::as_bool).unwrap_or(false),
        number("attndims").unwrap_or(0),
        number("atttypmod").unwrap_or(-1),
    );
    let attname = row_str(row, "attname").unwrap_or_default();

    let collation = match (row_str(row, "collnspname"), row_str(row, "collname")) {
        (Some("pg_catalog"), Some("default")) | (_, None) | (_, Some("")) => String::new(),
        (Some(schema), Some(name)) => qt_ident([schema, name]),
        (None, Some(name)) => qt_ident([name]),
    };
    let mut display = format!("{} {}", attname, full_type);
    if !collation.is_empty() {
        display.push_str(" COLLATE ");
        display.push_str(&collation);
    }

    let (length, precision) = length_and_precision(&full_type);
    let member = json!({
        "attnum": row.get("attnum").cloned().unwrap_or(Value::Null),
        "member_name": attname,
        "type": typname,
        "collation": collation,
        "tlength": length,
        "precision": precision,
        "is_tlength": length.is_some(),
        "is_precision": precision.is_some(),
    });
    (display, member)
}

pub struct TypeView;

impl TypeView {
    /// Members, labels or range settings, depending on `typtype`.
    async fn additional_properties(&self, ctx: &NodeContext, oid: Oid, row: &mut Row) -> NodeResult<()> {
        match row_str(row, "typtype") {
            Some("c") => {
                let rows = ctx
                    .fetch(
                        "additional_properties.sql",
                        ctx.args_with(json!({"type": "c", "typrelid": row.get("typrelid")})),
                    )
                    .await?;
                let (display, members): (Vec<String>, Vec<Value>) = rows.rows.iter().map(composite_member).unzip();
                row.insert("member_list".into(), json!(display.join(", ")));
                row.insert("composite".into(), Value::Array(members));
            }
            Some("e") => {
                let rows = ctx
                    .fetch("additional_properties.sql", ctx.args_with(json!({"type": "e", "tid": oid})))
                    .await?;
                let labels: Vec<&str> = rows.rows.iter().filter_map(|r| row_str(r, "enumlabel")).collect();
                row.insert("enum_list".into(), json!(labels.join(", ")));
                row.insert(
                    "enum".into(),
                    Value::Array(labels.iter().map(|label| json!({"label": label})).collect()),
                );
            }
            Some("r") => {
                let range = ctx
                    .fetch_first("additional_properties.sql", ctx.args_with(json!({"type": "r", "tid": oid})))
                    .await?;
                if let Some(range) = range {
                    row.extend(range);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl NodeView for TypeView {
    fn def(&self) -> &'static NodeDef {
        &TYPE
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name", "typtype"]
    }

    fn validate_create(&self, data: &Row) -> NodeResult<()> {
        let message = match row_str(data, "typtype") {
            Some("c") if array_len(data, "composite") < 2 => "Composite types require at least two members.",
            Some("e") if array_len(data, "enum") < 1 => "Enumeration types require at least one label.",
            Some("r") if is_blank(data.get("typname")) => "Subtype must be defined for range types.",
            Some("b") if is_blank(data.get("typinput")) || is_blank(data.get("typoutput")) => {
                "External types require both Input and Output conversion functions."
            }
            _ => return Ok(()),
        };
        Err(NodeError::gone(message))
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("Could not find the type in the table.")
    }

    async fn format_properties(&self, ctx: &NodeContext, oid: Oid, mut row: Row) -> NodeResult<Row> {
        let acl = ctx.fetch("acl.sql", ctx.object_args(oid)).await?;
        row.insert("typacl".into(), json!([]));
        row.extend(group_privileges_by_type(&acl.rows));
        self.additional_properties(ctx, oid, &mut row).await?;
        if let Some(labels) = parse_security_labels(&row, "seclabels") {
            row.insert("seclabels".into(), json!(labels));
        }
        Ok(row)
    }

    async fn prepare_create(&self, _ctx: &NodeContext, mut data: Row) -> NodeResult<Row> {
        format_request_acls(&mut data, TYPE_ACLS, false);
        convert_for_sql(&mut data);
        Ok(data)
    }

    async fn get_sql(&self, ctx: &NodeContext, mut data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        match oid {
            Some(oid) => {
                let mut old = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
                convert_for_sql(&mut old);
                format_request_acls(&mut data, TYPE_ACLS, true);
                let name = row_str(&data, "name")
                    .or_else(|| row_str(&old, "name"))
                    .unwrap_or_default()
                    .to_string();
                let sql = ctx.render("update.sql", ctx.args_with(json!({"data": data, "o_data": old})))?;
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

    async fn created_node(&self, ctx: &NodeContext, data: &Row) -> NodeResult<BrowserNode> {
        let scid = match data.get("schema") {
            Some(schema) => {
                let scid = ctx.scalar("get_scid.sql", ctx.args_with(json!({"schema": schema}))).await?;
                value_oid(&scid).unwrap_or_else(|| ctx.parent_id())
            }
            None => ctx.parent_id(),
        };
        let tid = ctx
            .scalar("get_oid.sql", ctx.args_with(json!({"scid": scid, "data": data})))
            .await?;
        let tid = value_oid(&tid).ok_or_else(|| self.gone())?;
        Ok(BrowserNode::new(
            TYPE.node_type,
            tid,
            scid,
            row_str(data, "name").unwrap_or_default(),
            TYPE.icon(),
            TYPE.inode,
        ))
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        let mut data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        // "-" marks an unset catalog function.
        for value in data.values_mut() {
            if value.as_str() == Some("-") {
                *value = Value::Null;
            }
        }
        if let Some(schema) = &opts.diff_schema {
            data.insert("schema".into(), json!(schema));
        }
        let heading = format!("Type: {}", row_str(&data, "name").unwrap_or_default());
        let header = drop_comment_header(ctx, &heading, &data)?;
        let data = self.prepare_create(ctx, data).await?;
        let body = self.render_create(ctx, &data, true)?;
        Ok(format!("{}{}", header, body.trim_matches('\n')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_storage_and_alignment_keywords() {
        let mut data = row(json!({"typstorage": "x", "typalign": "d", "name": "money2"}));
        convert_for_sql(&mut data);
        assert_eq!(data["typstorage"], json!("EXTENDED"));
        assert_eq!(data["typalign"], json!("double"));
        assert_eq!(data["name"], json!("money2"));
    }

    #[test]
    fn test_create_checks_by_kind() {
        let composite = row(json!({"name": "pair", "typtype": "c", "composite": [{"member_name": "a"}]}));
        assert!(matches!(TypeView.validate_create(&composite), Err(NodeError::Gone(_))));

        let labels = row(json!({"name": "mood", "typtype": "e", "enum": [{"label": "sad"}]}));
        assert!(TypeView.validate_create(&labels).is_ok());

        let range = row(json!({"name": "floatrange", "typtype": "r", "typname": null}));
        match TypeView.validate_create(&range) {
            Err(NodeError::Gone(message)) => assert_eq!(message, "Subtype must be defined for range types."),
            other => panic!("unexpected {:?}", other),
        }

        let external = row(json!({"name": "ext", "typtype": "b", "typinput": "ext_in"}));
        assert!(TypeView.validate_create(&external).is_err());
    }

    #[test]
    fn test_full_type_name_modifiers() {
        assert_eq!(full_type_name(None, "numeric", false, 0, (10 << 16) + 2 + 4), "numeric(10,2)");
        assert_eq!(full_type_name(None, "character varying", false, 1, 36), "character varying(32)[]");
        assert_eq!(full_type_name(Some("app"), "Money", true, 0, -1), "app.\"Money\"");
        assert_eq!(full_type_name(None, "int4", false, 0, -1), "int4");
    }

    #[test]
    fn test_length_and_precision() {
        assert_eq!(
            length_and_precision("numeric(10,2)"),
            (Some("10".to_string()), Some("2".to_string()))
        );
        assert_eq!(length_and_precision("character varying(32)[]"), (Some("32".to_string()), None));
        assert_eq!(length_and_precision("int4"), (None, None));
    }

    #[test]
    fn test_composite_member_collation() {
        let (display, member) = composite_member(&row(json!({
            "attnum": 1,
            "attname": "label",
            "typname": "text",
            "collname": "C",
            "collnspname": "pg_catalog",
            "isdup": false,
            "attndims": 0,
            "atttypmod": -1
        })));
        assert_eq!(display, "label text COLLATE pg_catalog.\"C\"");
        assert_eq!(member["is_tlength"], json!(false));
    }
}
