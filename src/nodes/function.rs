use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::function_args::format_arguments_from_db;
use crate::logic::node::{CustomOperation, HttpMethod, NodeDef, ParentLevel, Scope, TemplateLayout};
use crate::logic::privileges::{format_request_acls, parse_priv_from_db, parse_security_labels, parse_variables};
use crate::logic::view::{collapse_blank_lines, is_blank, required_oid, GeneratedSql, NodeView, INCOMPLETE_DEFINITION};
use crate::model::{row_oid, row_str, value_oid, BrowserNode, NodeResponse, Oid, Row, SqlOptions};
use crate::templates::qt_ident;

pub static FUNCTION: NodeDef = NodeDef {
    node_type: "function",
    label: "Functions",
    title: "Function",
    parent: ParentLevel::Schema,
    children: None,
    id_name: "fnid",
    template_kind: "functions",
    layout: TemplateLayout::ByServerType,
    inode: false,
    server_types: &[],
    min_version: 0,
    max_version: None,
    ddl_keyword: "FUNCTION",
};

static OPERATIONS: [CustomOperation; 4] = [
    CustomOperation::new("get_types", HttpMethod::Get, Scope::Both),
    CustomOperation::new("get_languages", HttpMethod::Get, Scope::Both),
    CustomOperation::new("vopts", HttpMethod::Get, Scope::Collection),
    CustomOperation::new("select_sql", HttpMethod::Get, Scope::Object),
];

const FUNCTION_ACLS: &[(&str, &[&str])] = &[("acl", &["X"])];

/// Changing any of these needs `CREATE OR REPLACE FUNCTION`.
const REPLACING_KEYS: &[&str] = &[
    "lanname",
    "prosrc",
    "probin",
    "prosrc_c",
    "provolatile",
    "proisstrict",
    "prosecdef",
    "procost",
    "proleakproof",
    "arguments",
];

fn volatility(code: &str) -> Option<&'static str> {
    match code {
        "v" => Some("VOLATILE"),
        "s" => Some("STABLE"),
        "i" => Some("IMMUTABLE"),
        _ => None,
    }
}

fn map_volatility(data: &mut Row) {
    let mapped = row_str(data, "provolatile").and_then(volatility);
    if let Some(keyword) = mapped {
        data.insert("provolatile".into(), json!(keyword));
    }
}

/// Signature of the input arguments, with and without argument names.
pub fn signature_args(arguments: &[Value]) -> (String, String) {
    let mut with_names = Vec::new();
    let mut types = Vec::new();
    for arg in arguments.iter().filter_map(Value::as_object) {
        let mode = arg.get("argmode");
        if matches!(mode, Some(Value::Null)) || row_str(arg, "argmode") == Some("OUT") {
            continue;
        }
        let mut parts = Vec::new();
        if let Some(mode) = row_str(arg, "argmode").filter(|m| !m.is_empty()) {
            parts.push(mode.to_string());
        }
        if let Some(name) = row_str(arg, "argname").filter(|n| !n.is_empty()) {
            parts.push(qt_ident([name]));
        }
        if let Some(argtype) = row_str(arg, "argtype") {
            parts.push(argtype.to_string());
            types.push(argtype.to_string());
        }
        with_names.push(parts.join(" "));
    }
    (with_names.join(", "), types.join(", "))
}

/// `SELECT` template of a function call with one placeholder per argument.
pub fn select_statement(signature: &str) -> String {
    let Some(open) = signature.rfind('(') else {
        return format!("SELECT {}", signature);
    };
    let args = signature[open..].trim_matches(|c| c == '(' || c == ')');
    if args.is_empty() {
        return format!("SELECT {}", signature);
    }
    let placeholders = args
        .split(',')
        .map(|arg| format!("\n\t<{}>", arg.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {}{}\n)", &signature[..=open], placeholders)
}

fn variable_section(data: &Row, mode: &str) -> Vec<Value> {
    data.get("variables")
        .and_then(|variables| variables.get(mode))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn variable_entry(variable: &Value) -> Option<(String, Value)> {
    let name = variable.get("name")?.as_str()?.to_string();
    Some((name, variable.get("value").cloned().unwrap_or(Value::Null)))
}

/// Variables the update statement sets. A replaced function has to carry
/// over every old setting that was not deleted.
pub fn merge_variables(data: &Row, old: &Row, change_func: bool) -> Vec<Value> {
    if !change_func {
        return variable_section(data, "changed")
            .into_iter()
            .chain(variable_section(data, "added"))
            .collect();
    }

    let deleted: Vec<String> = variable_section(data, "deleted")
        .iter()
        .filter_map(variable_entry)
        .map(|(name, _)| name)
        .collect();
    let mut merged: Vec<(String, Value)> = Vec::new();
    let mut set = |name: String, value: Value, overwrite: bool| {
        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) if overwrite => entry.1 = value,
            Some(_) => {}
            None => merged.push((name, value)),
        }
    };
    for (name, value) in variable_section(data, "changed")
        .iter()
        .chain(variable_section(data, "added").iter())
        .filter_map(variable_entry)
    {
        set(name, value, true);
    }
    let old_variables = old.get("variables").and_then(Value::as_array).cloned().unwrap_or_default();
    for (name, value) in old_variables.iter().filter_map(variable_entry) {
        if !deleted.contains(&name) {
            set(name, value, false);
        }
    }
    merged
        .into_iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect()
}

/// Apply the changed rows of an argument grid onto the stored arguments.
fn merge_arguments(changes: &Value, old_arguments: &[Value]) -> Vec<Value> {
    let mut merged = old_arguments.to_vec();
    let changed = changes.get("changed").and_then(Value::as_array).cloned().unwrap_or_default();
    for change in changed.iter().filter_map(Value::as_object) {
        let target = merged
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|old| old.get("argid") == change.get("argid"));
        if let Some(old) = target {
            for (key, value) in change {
                old.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

fn has_arguments(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

pub struct FunctionView;

impl FunctionView {
    /// Replace a namespace oid with the schema name.
    async fn resolve_namespace(&self, ctx: &NodeContext, data: &mut Row) -> NodeResult<()> {
        let Some(scid) = data.get("pronamespace").and_then(value_oid) else {
            return Ok(());
        };
        let name = ctx
            .scalar("get_schema.sql", ctx.args_with(json!({"scid": scid})))
            .await?;
        data.insert("pronamespace".into(), name);
        Ok(())
    }

    fn arguments_of(data: &Row) -> Vec<Value> {
        ["arguments", "args"]
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_array))
            .find(|items| !items.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    fn insert_signature(data: &mut Row) {
        let (func_args, func_args_without) = signature_args(&Self::arguments_of(data));
        data.insert("func_args".into(), json!(func_args));
        data.insert("func_args_without".into(), json!(func_args_without));
    }

    async fn update_sql(&self, ctx: &NodeContext, mut data: Row, oid: Oid) -> NodeResult<GeneratedSql> {
        let mut old = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        self.resolve_namespace(ctx, &mut old).await?;
        map_volatility(&mut old);

        let change_func = REPLACING_KEYS.iter().any(|key| match *key {
            "arguments" => has_arguments(data.get("arguments")),
            key => data.contains_key(key),
        });
        data.insert("change_func".into(), json!(change_func));

        let old_arguments = old.get("arguments").and_then(Value::as_array).cloned().unwrap_or_default();
        let arguments = match data.get("arguments") {
            Some(changes @ Value::Object(_)) if has_arguments(Some(changes)) => {
                Some(merge_arguments(changes, &old_arguments))
            }
            Some(Value::Array(items)) if !items.is_empty() => None,
            _ if change_func => Some(old_arguments),
            _ => None,
        };
        if let Some(arguments) = arguments {
            data.insert("arguments".into(), Value::Array(arguments));
        }

        format_request_acls(&mut data, FUNCTION_ACLS, true);
        let merged = merge_variables(&data, &old, change_func);
        data.insert("merged_variables".into(), Value::Array(merged));

        let name = row_str(&data, "name")
            .or_else(|| row_str(&old, "name"))
            .unwrap_or_default()
            .to_string();
        let sql = ctx.render("update.sql", ctx.args_with(json!({"data": data, "o_data": old})))?;
        Ok(GeneratedSql {
            sql: sql.trim_matches('\n').to_string(),
            name,
        })
    }
}

#[async_trait]
impl NodeView for FunctionView {
    fn def(&self) -> &'static NodeDef {
        &FUNCTION
    }

    fn custom_operations(&self) -> &'static [CustomOperation] {
        &OPERATIONS
    }

    fn nodes_template(&self) -> &'static str {
        "node.sql"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name", "funcowner", "pronamespace", "prorettypename", "lanname", "prosrc", "probin"]
    }

    /// C functions are defined by an object file, every other language by
    /// its source.
    fn missing_arg(&self, data: &Row) -> Option<&'static str> {
        let c_language = row_str(data, "lanname") == Some("c");
        self.required_args().iter().copied().find(|arg| match *arg {
            "prosrc" => !c_language && is_blank(data.get("prosrc")),
            "probin" => c_language && is_blank(data.get("probin")),
            arg => is_blank(data.get(arg)),
        })
    }

    fn raw_string_keys(&self) -> &'static [&'static str] {
        &["description", "prosrc", "probin", "prosrc_c"]
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn diff_ignore_keys(&self) -> &'static [&'static str] {
        &[
            "oid",
            "proowner",
            "typnsp",
            "xmin",
            "prokind",
            "proisagg",
            "pronamespace",
            "proargdefaults",
            "prorettype",
            "proallargtypes",
            "proacl",
            "oid-2",
            "prolang",
        ]
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("Could not find the function node in the database.")
    }

    fn browser_node(&self, ctx: &NodeContext, row: &Row) -> NodeResult<BrowserNode> {
        let oid = required_oid(row, "oid")?;
        let parent = row_oid(row, "nsp").unwrap_or_else(|| ctx.parent_id());
        Ok(BrowserNode::new(
            FUNCTION.node_type,
            oid,
            parent,
            row_str(row, "name").unwrap_or_default(),
            FUNCTION.icon(),
            FUNCTION.inode,
        )
        .with_extra("funcowner", row.get("funcowner").cloned().unwrap_or(Value::Null))
        .with_extra("language", row.get("lanname").cloned().unwrap_or(Value::Null)))
    }

    async fn format_properties(&self, ctx: &NodeContext, oid: Oid, mut row: Row) -> NodeResult<Row> {
        let formatted = format_arguments_from_db(&row, |type_oid| async move {
            let name = ctx
                .scalar("get_out_types.sql", ctx.args_with(json!({"out_arg_oid": type_oid})))
                .await?;
            Ok::<_, NodeError>(name.as_str().unwrap_or_default().to_string())
        })
        .await?;
        row.insert("arguments".into(), Value::Array(formatted.arguments));
        row.insert("proargs".into(), json!(formatted.proargs));

        let acl = ctx.fetch("acl.sql", ctx.object_args(oid)).await?;
        let privileges: Vec<Value> = acl.rows.iter().map(parse_priv_from_db).collect();
        row.insert("acl".into(), Value::Array(privileges));

        row.insert("sysfunc".into(), json!(ctx.is_system_oid(oid)));
        if let Some(labels) = parse_security_labels(&row, "seclabels") {
            row.insert("seclabels".into(), json!(labels));
        }
        let config = row.get("proconfig").and_then(Value::as_array).cloned().unwrap_or_default();
        row.insert("variables".into(), Value::Array(parse_variables(&config)));
        Ok(row)
    }

    async fn get_sql(&self, ctx: &NodeContext, mut data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        self.resolve_namespace(ctx, &mut data).await?;
        map_volatility(&mut data);

        if let Some(oid) = oid {
            return self.update_sql(ctx, data, oid).await;
        }

        let name = row_str(&data, "name").unwrap_or_default().to_string();
        if self.missing_arg(&data).is_some() {
            return Ok(GeneratedSql {
                sql: INCOMPLETE_DEFINITION.to_string(),
                name,
            });
        }
        format_request_acls(&mut data, FUNCTION_ACLS, false);
        Self::insert_signature(&mut data);
        let sql = ctx.render("create.sql", ctx.args_with(json!({"data": data, "is_sql": false})))?;
        Ok(GeneratedSql {
            sql: sql.trim_matches('\n').to_string(),
            name,
        })
    }

    async fn created_node(&self, ctx: &NodeContext, data: &Row) -> NodeResult<BrowserNode> {
        let row = ctx
            .fetch_first(
                "get_oid.sql",
                ctx.args_with(json!({"nspname": data.get("pronamespace"), "name": data.get("name")})),
            )
            .await?
            .ok_or_else(|| self.gone())?;
        self.browser_node(ctx, &row)
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, cascade: bool) -> NodeResult<Option<String>> {
        let Some(row) = ctx.fetch_first("delete.sql", ctx.object_args(oid)).await? else {
            return Ok(None);
        };
        let sql = ctx.render(
            "delete.sql",
            ctx.args_with(json!({
                "name": row.get("name"),
                "func_args": row.get("func_args"),
                "nspname": row.get("nspname"),
                "cascade": cascade,
            })),
        )?;
        Ok(Some(sql))
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }

        let mut data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        let arguments = Self::arguments_of(&data);
        data.insert("args".into(), Value::Array(arguments));
        Self::insert_signature(&mut data);
        self.resolve_namespace(ctx, &mut data).await?;
        if let Some(schema) = &opts.diff_schema {
            data.insert("pronamespace".into(), json!(schema));
        }
        format_request_acls(&mut data, FUNCTION_ACLS, false);

        let definition = ctx
            .fetch_first("get_definition.sql", ctx.args_with(json!({"data": data, "fnid": oid})))
            .await?
            .ok_or_else(|| self.gone())?;
        let func_def = row_str(&definition, "name_with_default_args")
            .unwrap_or_default()
            .replace(", ", ",\r\t")
            .replace('(', "(\r\t");

        let signature = format!(
            "{}.{}({})",
            row_str(&data, "pronamespace").unwrap_or_default(),
            row_str(&data, "proname").or_else(|| row_str(&data, "name")).unwrap_or_default(),
            row_str(&data, "proargtypenames").unwrap_or_default(),
        );
        let body = ctx.render(
            "create.sql",
            ctx.args_with(json!({
                "data": data,
                "query_type": "create",
                "func_def": func_def,
                "query_for": "sql_panel",
            })),
        )?;
        let sql = format!("-- FUNCTION: {0}\n\n-- DROP FUNCTION {0};\n\n{1}", signature, body);
        Ok(collapse_blank_lines(&sql))
    }

    fn diff_key(&self, node_row: &Row, properties: &Row) -> String {
        let name = row_str(node_row, "name").unwrap_or_default();
        match row_str(properties, "proargs") {
            Some(args) if !name.ends_with(')') => format!("{}({})", name, args),
            _ => name.to_string(),
        }
    }

    async fn custom(
        &self,
        ctx: &NodeContext,
        action: &str,
        oid: Option<Oid>,
        _data: Row,
    ) -> NodeResult<NodeResponse> {
        match action {
            "get_types" => {
                let mut condition = String::from(
                    "(typtype IN ('b', 'c', 'd', 'e', 'p', 'r') AND typname NOT IN ('any', 'trigger', 'language_handler', 'event_trigger'))",
                );
                if ctx.settings.show_system_objects {
                    condition.push_str(
                        " AND nspname NOT LIKE E'pg\\\\_toast%' AND nspname NOT LIKE E'pg\\\\_temp%'",
                    );
                }
                let path = ctx.sibling_path("datatype");
                let sql = ctx.render_in(&path, "get_types.sql", ctx.args_with(json!({"condition": condition})))?;
                let rows = ctx.conn.execute_dict(&sql).await?;
                let types: Vec<Value> = rows
                    .rows
                    .iter()
                    .map(|row| {
                        let typname = row.get("typname").cloned().unwrap_or(Value::Null);
                        json!({
                            "label": typname,
                            "value": typname,
                            "typval": row.get("typtype").cloned().unwrap_or(Value::Null),
                            "elemoid": row.get("elemoid").cloned().unwrap_or(Value::Null),
                            "is_collatable": row.get("is_collatable").cloned().unwrap_or(Value::Bool(false)),
                        })
                    })
                    .collect();
                Ok(NodeResponse::data(Value::Array(types)))
            }
            "get_languages" => {
                let rows = ctx.fetch("get_languages.sql", ctx.args()).await?;
                let mut languages = vec![json!({"label": "", "value": ""})];
                languages.extend(rows.rows.into_iter().map(Value::Object));
                Ok(NodeResponse::data(Value::Array(languages)))
            }
            "vopts" => {
                let rows = ctx.fetch("variables.sql", ctx.args()).await?;
                Ok(NodeResponse::data(Value::Array(
                    rows.rows.into_iter().map(Value::Object).collect(),
                )))
            }
            "select_sql" => {
                let oid = oid.ok_or_else(|| self.gone())?;
                let definition = ctx
                    .fetch_first("get_definition.sql", ctx.object_args(oid))
                    .await?
                    .ok_or_else(|| self.gone())?;
                let sql = select_statement(row_str(&definition, "name").unwrap_or_default());
                Ok(NodeResponse::text(sql))
            }
            _ => Err(NodeError::NotFound(format!("Unsupported operation {} for function", action))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_signature_skips_out_arguments() {
        let arguments = vec![
            json!({"argmode": "IN", "argname": "customerId", "argtype": "integer"}),
            json!({"argmode": "OUT", "argname": "total", "argtype": "numeric"}),
            json!({"argtype": "text"}),
        ];
        let (with_names, types) = signature_args(&arguments);
        assert_eq!(with_names, "IN \"customerId\" integer, text");
        assert_eq!(types, "integer, text");
    }

    #[test]
    fn test_select_statement_placeholders() {
        assert_eq!(
            select_statement("public.add(integer, integer)"),
            "SELECT public.add(\n\t<integer>, \n\t<integer>\n)"
        );
        assert_eq!(select_statement("public.now_utc()"), "SELECT public.now_utc()");
    }

    #[test]
    fn test_required_source_depends_on_language() {
        let base = json!({
            "name": "f",
            "funcowner": "postgres",
            "pronamespace": 2200,
            "prorettypename": "integer",
        });
        let mut sql_fn = row(base.clone());
        sql_fn.insert("lanname".into(), json!("sql"));
        assert_eq!(FunctionView.missing_arg(&sql_fn), Some("prosrc"));
        sql_fn.insert("prosrc".into(), json!("select 1"));
        assert_eq!(FunctionView.missing_arg(&sql_fn), None);

        let mut c_fn = row(base);
        c_fn.insert("lanname".into(), json!("c"));
        assert_eq!(FunctionView.missing_arg(&c_fn), Some("probin"));
        c_fn.insert("probin".into(), json!("$libdir/ext"));
        assert_eq!(FunctionView.missing_arg(&c_fn), None);
    }

    #[test]
    fn test_merge_variables_on_replace() {
        let data = row(json!({
            "variables": {
                "changed": [{"name": "work_mem", "value": "64MB"}],
                "deleted": [{"name": "search_path", "value": "public"}]
            }
        }));
        let old = row(json!({
            "variables": [
                {"name": "work_mem", "value": "4MB"},
                {"name": "search_path", "value": "public"},
                {"name": "statement_timeout", "value": "5s"}
            ]
        }));
        assert_eq!(
            merge_variables(&data, &old, true),
            vec![
                json!({"name": "work_mem", "value": "64MB"}),
                json!({"name": "statement_timeout", "value": "5s"}),
            ]
        );
        assert_eq!(
            merge_variables(&data, &old, false),
            vec![json!({"name": "work_mem", "value": "64MB"})]
        );
    }

    #[test]
    fn test_merge_arguments_by_argid() {
        let old = vec![
            json!({"argid": 0, "argname": "a", "argtype": "integer"}),
            json!({"argid": 1, "argname": "b", "argtype": "text"}),
        ];
        let changes = json!({"changed": [{"argid": 1, "argdefval": "'x'"}]});
        let merged = merge_arguments(&changes, &old);
        assert_eq!(merged[1]["argdefval"], json!("'x'"));
        assert_eq!(merged[1]["argname"], json!("b"));
        assert_eq!(merged[0], old[0]);
    }

    #[test]
    fn test_volatility_keywords() {
        let mut data = row(json!({"provolatile": "s"}));
        map_volatility(&mut data);
        assert_eq!(data["provolatile"], json!("STABLE"));
        map_volatility(&mut data);
        assert_eq!(data["provolatile"], json!("STABLE"));
    }
}
