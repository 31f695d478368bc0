//! Dependency and dependent lookups shared by every node view.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::NodeResult;
use crate::logic::context::NodeContext;
use crate::model::{row_oid, row_str, Oid, Row};
use crate::templates::template_path;

/// One row of the dependencies / dependents panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub object_type: String,
    pub name: String,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<Oid>,
}

/// `pg_class.relkind` style codes; `r` is split into table and column by
/// its sub id.
fn standard_type(code: char) -> Option<&'static str> {
    match code {
        'i' => Some("index"),
        'S' => Some("sequence"),
        'v' => Some("view"),
        'p' => Some("partition_table"),
        'f' => Some("foreign_table"),
        'm' => Some("materialized_view"),
        't' => Some("toast_table"),
        'I' => Some("partition_index"),
        _ => None,
    }
}

const CUSTOM_TYPES: &[(&str, &str)] = &[
    ("x", "external_table"),
    ("n", "schema"),
    ("d", "domain"),
    ("l", "language"),
    ("Cc", "check"),
    ("Cd", "domain_constraints"),
    ("Cf", "foreign_key"),
    ("Cp", "primary_key"),
    ("Co", "collation"),
    ("Cu", "unique_constraint"),
    ("Cx", "exclusion_constraint"),
    ("Fw", "foreign_data_wrapper"),
    ("Fs", "foreign_server"),
    ("Fc", "fts_configuration"),
    ("Fp", "fts_parser"),
    ("Fd", "fts_dictionary"),
    ("Ft", "fts_template"),
    ("Ex", "extension"),
    ("Et", "event_trigger"),
    ("Pa", "package"),
    ("Pf", "function"),
    ("Pt", "trigger_function"),
    ("Pp", "procedure"),
    ("Rl", "rule"),
    ("Rs", "row_security_policy"),
    ("Sy", "synonym"),
    ("Ty", "type"),
    ("Tr", "trigger"),
    ("Tc", "compound_trigger"),
];

fn custom_type(code: &str) -> Option<&'static str> {
    let lookup = |key: &str| {
        CUSTOM_TYPES
            .iter()
            .find(|(c, _)| *c == key)
            .map(|(_, name)| *name)
    };
    lookup(code)
        .or_else(|| code.get(..2).and_then(lookup))
        .or_else(|| code.get(..1).and_then(lookup))
}

fn dependency_kind(deptype: &str) -> Option<&'static str> {
    match deptype.chars().next()? {
        'n' => Some("normal"),
        'a' => Some("auto"),
        'i' => Some("internal"),
        'e' => Some("extension"),
        'p' => Some("pin"),
        _ => None,
    }
}

fn positive_digit(c: Option<char>) -> bool {
    matches!(c.and_then(|c| c.to_digit(10)), Some(d) if d > 0)
}

/// Classify one row of `dependents.sql` / `dependencies.sql`. Rows of
/// unknown types, column defaults that are not function calls and pinned
/// entries (unless system objects are shown) yield `None`.
pub fn classify_dependency(row: &Row, show_system_objects: bool) -> Option<Dependency> {
    let type_code = row_str(row, "type").unwrap_or_default();
    let ref_name = row_str(row, "refname").unwrap_or_default();
    let mut name = match row_str(row, "nspname") {
        Some(nsp) => format!("{}.{}", nsp, ref_name),
        None => ref_name.to_string(),
    };

    let mut chars = type_code.chars();
    let first = chars.next()?;
    let object_type = if first == 'r' {
        if positive_digit(chars.next()) || positive_digit(type_code.chars().nth(2)) {
            "column"
        } else {
            "table"
        }
    } else if let Some(standard) = standard_type(first) {
        standard
    } else if first == 'A' {
        // Column defaults are only interesting when they call a function.
        let adbin = row_str(row, "adbin").unwrap_or_default();
        if !adbin.starts_with("{FUNCEXPR") {
            return None;
        }
        name = row_str(row, "adsrc").unwrap_or_default().to_string();
        "function"
    } else {
        custom_type(type_code)?
    };

    let deptype = row_str(row, "deptype").unwrap_or_default();
    let field = match dependency_kind(deptype) {
        Some("pin") if !show_system_objects => return None,
        Some(kind) => kind,
        None => "",
    };

    Some(Dependency {
        object_type: object_type.to_string(),
        name,
        field: field.to_string(),
        oid: row_oid(row, "objid").or_else(|| row_oid(row, "oid")),
    })
}

fn depends_path(ctx: &NodeContext) -> String {
    template_path("depends", Some(ctx.info.server_type), ctx.info.version)
}

async fn fetch_dependency(ctx: &NodeContext, sql: &str) -> NodeResult<Vec<Dependency>> {
    let result = ctx.conn.execute_dict(sql).await?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| classify_dependency(row, ctx.settings.show_system_objects))
        .collect())
}

/// Objects that depend on `oid`.
pub async fn get_dependents(
    ctx: &NodeContext,
    oid: Oid,
    where_clause: Option<String>,
) -> NodeResult<Vec<Dependency>> {
    let where_clause =
        where_clause.unwrap_or_else(|| format!("WHERE dep.refobjid={}::oid", oid));
    let sql = ctx.render_in(
        &depends_path(ctx),
        "dependents.sql",
        ctx.args_with(json!({"where_clause": where_clause})),
    )?;
    fetch_dependency(ctx, &sql).await
}

/// Objects `oid` depends on, including owning and granted roles.
pub async fn get_dependencies(
    ctx: &NodeContext,
    oid: Oid,
    where_clause: Option<String>,
) -> NodeResult<Vec<Dependency>> {
    let where_clause = where_clause.unwrap_or_else(|| format!("WHERE dep.objid={}::oid", oid));
    let path = depends_path(ctx);
    let sql = ctx.render_in(
        &path,
        "dependencies.sql",
        ctx.args_with(json!({"where_clause": where_clause, "object_id": oid})),
    )?;
    let mut dependencies = fetch_dependency(ctx, &sql).await?;

    // Column level lookups carry no role dependencies.
    if !where_clause.contains("subid") {
        let sql = ctx.render_in(
            &path,
            "role_dependencies.sql",
            ctx.args_with(json!({"where_clause": where_clause})),
        )?;
        let roles = ctx.conn.execute_dict(&sql).await?;
        dependencies.extend(roles.rows.iter().filter_map(role_dependency));
    }
    Ok(dependencies)
}

const PG_AUTHID_CLASS_OID: Oid = 1260;

fn role_dependency(row: &Row) -> Option<Dependency> {
    if row_oid(row, "refclassid") != Some(PG_AUTHID_CLASS_OID) {
        return None;
    }
    let field = match row_str(row, "deptype") {
        Some("a") => "ACL",
        Some("o") => "Owner",
        _ => "",
    };
    Some(Dependency {
        object_type: "role".to_string(),
        name: row_str(row, "refname").unwrap_or_default().to_string(),
        field: field.to_string(),
        oid: None,
    })
}

pub fn to_value(dependencies: &[Dependency]) -> Value {
    serde_json::to_value(dependencies).unwrap_or(Value::Array(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_table_and_column_codes() {
        let table = classify_dependency(
            &row(json!({"type": "r0", "refname": "orders", "nspname": "public", "deptype": "n", "objid": 16400})),
            false,
        )
        .unwrap();
        assert_eq!(table.object_type, "table");
        assert_eq!(table.name, "public.orders");
        assert_eq!(table.field, "normal");
        assert_eq!(table.oid, Some(16400));

        let column = classify_dependency(
            &row(json!({"type": "r3", "refname": "orders.id", "nspname": null, "deptype": "a"})),
            false,
        )
        .unwrap();
        assert_eq!(column.object_type, "column");
        assert_eq!(column.name, "orders.id");
        assert_eq!(column.field, "auto");
    }

    #[test]
    fn test_custom_codes_and_unknowns() {
        let function = classify_dependency(
            &row(json!({"type": "Pf", "refname": "f()", "nspname": "app", "deptype": "n"})),
            false,
        )
        .unwrap();
        assert_eq!(function.object_type, "function");

        let schema = classify_dependency(
            &row(json!({"type": "n", "refname": "app", "nspname": null, "deptype": "n"})),
            false,
        )
        .unwrap();
        assert_eq!(schema.object_type, "schema");

        assert!(classify_dependency(
            &row(json!({"type": "Zz", "refname": "x", "nspname": null, "deptype": "n"})),
            false
        )
        .is_none());
    }

    #[test]
    fn test_pinned_rows_hidden_without_system_objects() {
        let pinned = row(json!({"type": "S", "refname": "s", "nspname": "pg_catalog", "deptype": "p"}));
        assert!(classify_dependency(&pinned, false).is_none());
        assert_eq!(classify_dependency(&pinned, true).unwrap().field, "pin");
    }

    #[test]
    fn test_column_default_only_for_function_calls() {
        let call = row(json!({"type": "A", "refname": "", "nspname": null, "deptype": "n",
            "adbin": "{FUNCEXPR :funcid 480}", "adsrc": "nextval('s'::regclass)"}));
        let dep = classify_dependency(&call, false).unwrap();
        assert_eq!(dep.object_type, "function");
        assert_eq!(dep.name, "nextval('s'::regclass)");

        let constant = row(json!({"type": "A", "refname": "", "nspname": null, "deptype": "n",
            "adbin": "{CONST}", "adsrc": "1"}));
        assert!(classify_dependency(&constant, false).is_none());
    }

    #[test]
    fn test_role_rows() {
        let owner = role_dependency(&row(json!({"refclassid": 1260, "refname": "alice", "deptype": "o"}))).unwrap();
        assert_eq!(owner.object_type, "role");
        assert_eq!(owner.field, "Owner");
        assert!(role_dependency(&row(json!({"refclassid": 1259, "refname": "x", "deptype": "a"}))).is_none());
    }
}
