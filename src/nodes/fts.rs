//! Full text search objects: configurations, dictionaries, parsers and
//! templates. Their catalog rows carry the schema as an oid, so every
//! DDL path resolves it through `schema.sql` first.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::context::NodeContext;
use crate::logic::node::{CustomOperation, HttpMethod, NodeDef, ParentLevel, Scope, TemplateLayout};
use crate::logic::view::{delete_by_name, is_blank, required_oid, GeneratedSql, NodeView, INCOMPLETE_DEFINITION};
use crate::model::{row_oid, row_str, value_oid, BrowserNode, NodeResponse, Oid, Row, SqlOptions};
use crate::templates::qt_ident;

const fn fts_def(
    node_type: &'static str,
    label: &'static str,
    title: &'static str,
    id_name: &'static str,
    template_kind: &'static str,
    ddl_keyword: &'static str,
) -> NodeDef {
    NodeDef {
        node_type,
        label,
        title,
        parent: ParentLevel::Schema,
        children: None,
        id_name,
        template_kind,
        layout: TemplateLayout::Plain,
        inode: false,
        server_types: &[],
        min_version: 0,
        max_version: None,
        ddl_keyword,
    }
}

pub static FTS_CONFIGURATION: NodeDef = fts_def(
    "fts_configuration",
    "FTS Configurations",
    "FTS Configuration",
    "cfgid",
    "fts_configurations",
    "TEXT SEARCH CONFIGURATION",
);

pub static FTS_DICTIONARY: NodeDef = fts_def(
    "fts_dictionary",
    "FTS Dictionaries",
    "FTS Dictionary",
    "dcid",
    "fts_dictionaries",
    "TEXT SEARCH DICTIONARY",
);

pub static FTS_PARSER: NodeDef = fts_def(
    "fts_parser",
    "FTS Parsers",
    "FTS Parser",
    "pid",
    "fts_parsers",
    "TEXT SEARCH PARSER",
);

pub static FTS_TEMPLATE: NodeDef = fts_def(
    "fts_template",
    "FTS Templates",
    "FTS Template",
    "tid",
    "fts_templates",
    "TEXT SEARCH TEMPLATE",
);

static CONFIGURATION_OPERATIONS: [CustomOperation; 4] = [
    CustomOperation::new("parsers", HttpMethod::Get, Scope::Both),
    CustomOperation::new("copyConfig", HttpMethod::Get, Scope::Both),
    CustomOperation::new("tokens", HttpMethod::Get, Scope::Both),
    CustomOperation::new("dictionaries", HttpMethod::Get, Scope::Collection),
];

static DICTIONARY_OPERATIONS: [CustomOperation; 1] =
    [CustomOperation::new("fetch_templates", HttpMethod::Get, Scope::Both)];

static PARSER_OPERATIONS: [CustomOperation; 5] = [
    CustomOperation::new("start_functions", HttpMethod::Get, Scope::Both),
    CustomOperation::new("token_functions", HttpMethod::Get, Scope::Both),
    CustomOperation::new("end_functions", HttpMethod::Get, Scope::Both),
    CustomOperation::new("lextype_functions", HttpMethod::Get, Scope::Both),
    CustomOperation::new("headline_functions", HttpMethod::Get, Scope::Both),
];

static TEMPLATE_OPERATIONS: [CustomOperation; 2] = [
    CustomOperation::new("get_lexize", HttpMethod::Get, Scope::Both),
    CustomOperation::new("get_init", HttpMethod::Get, Scope::Both),
];

/// Returned by `msql` when nothing changed.
pub const NO_CHANGE: &str = "-- No change";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsKind {
    Configuration,
    Dictionary,
    Parser,
    Template,
}

/// Split a stored option string such as `k1 = v1, k2 = 'v2'` into
/// `{option, value}` pairs.
pub fn tokenize_options(options: &str) -> Vec<Value> {
    options
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(option, value)| {
            json!({
                "option": option.trim(),
                "value": value.trim().trim_matches('\''),
            })
        })
        .collect()
}

fn with_empty_option(first_value: &str, options: impl IntoIterator<Item = Value>) -> Value {
    let mut all = vec![json!({"label": "", "value": first_value})];
    all.extend(options);
    Value::Array(all)
}

fn option(label: &str) -> Value {
    json!({"label": label, "value": label})
}

/// User objects are shown schema-qualified, built-in ones by bare name.
fn qualified_label(row: &Row, name: &str, oid_column: &str, datlastsysoid: Oid) -> String {
    let bare = row_str(row, name).unwrap_or_default();
    match (row_oid(row, oid_column), row_str(row, "nspname")) {
        (Some(oid), Some(nspname)) if oid > datlastsysoid => format!("{}.{}", nspname, bare),
        _ => bare.to_string(),
    }
}

pub struct FtsView {
    kind: FtsKind,
}

impl FtsView {
    pub fn new(kind: FtsKind) -> Self {
        Self { kind }
    }

    /// Name of the schema whose oid sits in `data.schema`.
    async fn schema_name(&self, ctx: &NodeContext, data: &Row) -> NodeResult<Value> {
        ctx.scalar("schema.sql", ctx.args_with(json!({"data": data}))).await
    }

    async fn function_options(&self, ctx: &NodeContext, flag: &str, first_value: &str) -> NodeResult<Value> {
        let rows = ctx.fetch("functions.sql", ctx.args_with(json!({flag: true}))).await?;
        Ok(with_empty_option(
            first_value,
            rows.rows
                .iter()
                .map(|row| option(row_str(row, "proname").unwrap_or_default())),
        ))
    }

    async fn configuration_operation(
        &self,
        ctx: &NodeContext,
        action: &str,
        oid: Option<Oid>,
    ) -> NodeResult<Value> {
        let datlastsysoid = ctx.database.datlastsysoid;
        match action {
            "parsers" => {
                let rows = ctx.fetch("parser.sql", ctx.args_with(json!({"parser": true}))).await?;
                Ok(with_empty_option(
                    "",
                    rows.rows
                        .iter()
                        .map(|row| option(&qualified_label(row, "prsname", "schemaoid", datlastsysoid))),
                ))
            }
            "copyConfig" => {
                let rows = ctx
                    .fetch("copy_config.sql", ctx.args_with(json!({"copy_config": true})))
                    .await?;
                Ok(with_empty_option(
                    "",
                    rows.rows
                        .iter()
                        .map(|row| option(&qualified_label(row, "cfgname", "oid", datlastsysoid))),
                ))
            }
            "tokens" => {
                let Some(cfgid) = oid else {
                    return Ok(json!([]));
                };
                let parser = ctx.scalar("parser.sql", ctx.args_with(json!({"cfgid": cfgid}))).await?;
                let rows = ctx.fetch("tokens.sql", ctx.args_with(json!({"parseroid": parser}))).await?;
                Ok(Value::Array(
                    rows.rows
                        .iter()
                        .map(|row| option(row_str(row, "alias").unwrap_or_default()))
                        .collect(),
                ))
            }
            "dictionaries" => {
                let rows = ctx.fetch("dictionaries.sql", ctx.args()).await?;
                Ok(Value::Array(
                    rows.rows
                        .iter()
                        .map(|row| option(row_str(row, "dictname").unwrap_or_default()))
                        .collect(),
                ))
            }
            _ => Err(self.unsupported(action)),
        }
    }

    async fn fetch_templates(&self, ctx: &NodeContext) -> NodeResult<Value> {
        let rows = ctx.fetch("templates.sql", ctx.args_with(json!({"template": true}))).await?;
        Ok(with_empty_option(
            "",
            rows.rows.iter().map(|row| {
                let name = row_str(row, "tmplname").unwrap_or_default();
                match row_str(row, "nspname") {
                    Some(nspname) if nspname != "pg_catalog" => option(&qt_ident([nspname, name])),
                    _ => option(name),
                }
            }),
        ))
    }

    fn unsupported(&self, action: &str) -> NodeError {
        NodeError::NotFound(format!(
            "Unsupported operation {} for {}",
            action,
            self.def().node_type
        ))
    }

    fn reverse_gone(&self) -> NodeError {
        NodeError::gone(format!(
            "Could not generate reversed engineered query for {} node.",
            self.def().title
        ))
    }

    /// Dictionaries have no `sql.sql`; their DDL is rendered from the
    /// properties.
    async fn dictionary_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        let mut data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        if !data.get("options").is_some_and(Value::is_array) {
            data.insert("options".into(), json!([]));
        }
        let schema = match &opts.diff_schema {
            Some(schema) => json!(schema),
            None => self.schema_name(ctx, &data).await?,
        };
        data.insert("schema".into(), schema);

        let sql = ctx.render(
            "create.sql",
            ctx.args_with(json!({"data": data, "is_displaying": true})),
        )?;
        let schema = row_str(&data, "schema").unwrap_or_default();
        let name = row_str(&data, "name").unwrap_or_default();
        let header = format!(
            "-- Text Search Dictionary: {}.{}\n\n-- DROP TEXT SEARCH DICTIONARY {};\n\n",
            schema,
            name,
            qt_ident([schema, name])
        );
        Ok(format!("{}{}", header, sql).trim_matches('\n').to_string())
    }
}

#[async_trait]
impl NodeView for FtsView {
    fn def(&self) -> &'static NodeDef {
        match self.kind {
            FtsKind::Configuration => &FTS_CONFIGURATION,
            FtsKind::Dictionary => &FTS_DICTIONARY,
            FtsKind::Parser => &FTS_PARSER,
            FtsKind::Template => &FTS_TEMPLATE,
        }
    }

    fn custom_operations(&self) -> &'static [CustomOperation] {
        match self.kind {
            FtsKind::Configuration => &CONFIGURATION_OPERATIONS,
            FtsKind::Dictionary => &DICTIONARY_OPERATIONS,
            FtsKind::Parser => &PARSER_OPERATIONS,
            FtsKind::Template => &TEMPLATE_OPERATIONS,
        }
    }

    fn required_args(&self) -> &'static [&'static str] {
        match self.kind {
            FtsKind::Configuration => &["schema", "name"],
            FtsKind::Dictionary => &["template", "schema", "name"],
            FtsKind::Parser => &["prsstart", "prstoken", "prsend", "prslextype", "schema", "name"],
            FtsKind::Template => &["tmpllexize", "schema", "name"],
        }
    }

    fn validate_create(&self, data: &Row) -> NodeResult<()> {
        if self.kind == FtsKind::Configuration
            && is_blank(data.get("copy_config"))
            && is_blank(data.get("prsname"))
        {
            return Err(NodeError::gone("Provide at least copy config or parser."));
        }
        Ok(())
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn gone(&self) -> NodeError {
        match self.kind {
            FtsKind::Template => NodeError::gone("Could not find the requested FTS template."),
            _ => NodeError::gone(format!(
                "Could not find the {} node in the database node.",
                self.def().title
            )),
        }
    }

    async fn format_properties(&self, ctx: &NodeContext, oid: Oid, mut row: Row) -> NodeResult<Row> {
        let is_sys_obj = row_oid(&row, "oid").is_some_and(|oid| ctx.is_system_oid(oid));
        row.insert("is_sys_obj".into(), json!(is_sys_obj));

        match self.kind {
            FtsKind::Configuration => {
                let tokens = ctx
                    .fetch("tokenDictList.sql", ctx.args_with(json!({"cfgid": oid})))
                    .await?;
                row.insert(
                    "tokens".into(),
                    Value::Array(tokens.rows.into_iter().map(Value::Object).collect()),
                );
            }
            FtsKind::Dictionary => {
                let template = row_str(&row, "template").unwrap_or_default().to_string();
                if let Some(template_schema) = row_str(&row, "template_schema") {
                    if template_schema != "pg_catalog" {
                        let qualified = qt_ident([template_schema, template.as_str()]);
                        row.insert("template".into(), json!(qualified));
                    }
                }
                if let Some(options) = row_str(&row, "options") {
                    let options = tokenize_options(options);
                    row.insert("options".into(), Value::Array(options));
                }
            }
            FtsKind::Parser | FtsKind::Template => {}
        }
        Ok(row)
    }

    async fn get_sql(&self, ctx: &NodeContext, mut data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        match oid {
            Some(oid) => {
                let mut old = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
                if !data.contains_key("schema") {
                    if let Some(schema) = old.get("schema") {
                        data.insert("schema".into(), schema.clone());
                    }
                }
                let new_schema = self.schema_name(ctx, &data).await?;
                let mut new_data = data.clone();
                new_data.insert("schema".into(), new_schema);
                let old_schema = self.schema_name(ctx, &old).await?;
                old.insert("schema".into(), old_schema);

                let sql = ctx.render(
                    "update.sql",
                    ctx.args_with(json!({"data": new_data, "o_data": old})),
                )?;
                let name = row_str(&data, "name")
                    .or_else(|| row_str(&old, "name"))
                    .unwrap_or_default()
                    .to_string();
                Ok(GeneratedSql {
                    sql: sql.trim_matches('\n').to_string(),
                    name,
                })
            }
            None => {
                let name = row_str(&data, "name").unwrap_or_default().to_string();
                if self.missing_arg(&data).is_some() {
                    return Ok(GeneratedSql {
                        sql: INCOMPLETE_DEFINITION.to_string(),
                        name,
                    });
                }
                let schema = self.schema_name(ctx, &data).await?;
                data.insert("schema".into(), schema);
                let sql = ctx.render("create.sql", ctx.args_with(json!({"data": data})))?;
                Ok(GeneratedSql {
                    sql: sql.trim_matches('\n').to_string(),
                    name,
                })
            }
        }
    }

    /// The new object is found by name within the schema oid it was
    /// created in.
    async fn created_node(&self, ctx: &NodeContext, data: &Row) -> NodeResult<BrowserNode> {
        let def = self.def();
        let scid = data
            .get("schema")
            .and_then(value_oid)
            .or_else(|| ctx.scid())
            .unwrap_or_else(|| ctx.parent_id());
        let row = ctx
            .fetch_first(
                "properties.sql",
                ctx.args_with(json!({"name": data.get("name"), "scid": scid})),
            )
            .await?
            .ok_or_else(|| self.gone())?;
        let oid = required_oid(&row, "oid")?;
        let label = row_str(data, "name").unwrap_or_default();
        Ok(BrowserNode::new(def.node_type, oid, scid, label, def.icon(), def.inode))
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, cascade: bool) -> NodeResult<Option<String>> {
        delete_by_name(ctx, oid, cascade).await
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        if self.kind == FtsKind::Dictionary {
            return self.dictionary_sql(ctx, oid, opts).await;
        }

        let sql = match ctx.scalar("sql.sql", ctx.object_args(oid)).await? {
            Value::String(sql) => sql,
            _ => return Err(self.reverse_gone()),
        };
        match (&opts.diff_schema, ctx.scid()) {
            (Some(target), Some(scid)) => {
                let mut probe = Row::new();
                probe.insert("schema".into(), json!(scid));
                let current = self.schema_name(ctx, &probe).await?;
                match current.as_str() {
                    Some(current) if !current.is_empty() => Ok(sql.replace(current, target)),
                    _ => Ok(sql),
                }
            }
            _ => Ok(sql),
        }
    }

    async fn msql(&self, ctx: &NodeContext, oid: Option<Oid>, data: Row) -> NodeResult<NodeResponse> {
        let generated = self.get_sql(ctx, data, oid).await?;
        let sql = generated.sql.trim();
        if sql.is_empty() {
            return Ok(NodeResponse::data(NO_CHANGE));
        }
        Ok(NodeResponse::data(sql))
    }

    async fn custom(
        &self,
        ctx: &NodeContext,
        action: &str,
        oid: Option<Oid>,
        _data: Row,
    ) -> NodeResult<NodeResponse> {
        let data = match (self.kind, action) {
            (FtsKind::Configuration, _) => self.configuration_operation(ctx, action, oid).await?,
            (FtsKind::Dictionary, "fetch_templates") => self.fetch_templates(ctx).await?,
            (FtsKind::Parser, "start_functions") => self.function_options(ctx, "start", "").await?,
            (FtsKind::Parser, "token_functions") => self.function_options(ctx, "token", "").await?,
            (FtsKind::Parser, "end_functions") => self.function_options(ctx, "end", "").await?,
            (FtsKind::Parser, "lextype_functions") => self.function_options(ctx, "lextype", "").await?,
            (FtsKind::Parser, "headline_functions") => self.function_options(ctx, "headline", "").await?,
            (FtsKind::Template, "get_lexize") => self.function_options(ctx, "lexize", "").await?,
            // The server reports a missing init function as "-".
            (FtsKind::Template, "get_init") => self.function_options(ctx, "init", "-").await?,
            _ => return Err(self.unsupported(action)),
        };
        Ok(NodeResponse::data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_options() {
        assert_eq!(
            tokenize_options("dictfile = english, accept = 'false'"),
            vec![
                json!({"option": "dictfile", "value": "english"}),
                json!({"option": "accept", "value": "false"}),
            ]
        );
        assert_eq!(
            tokenize_options("stopwords = 'a=b'"),
            vec![json!({"option": "stopwords", "value": "a=b"})]
        );
        assert!(tokenize_options("").is_empty());
    }

    #[test]
    fn test_user_objects_are_qualified() {
        let user = json!({"cfgname": "shop_cfg", "nspname": "shop", "oid": 20001})
            .as_object()
            .unwrap()
            .clone();
        let builtin = json!({"cfgname": "english", "nspname": "pg_catalog", "oid": 3748})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(qualified_label(&user, "cfgname", "oid", 16383), "shop.shop_cfg");
        assert_eq!(qualified_label(&builtin, "cfgname", "oid", 16383), "english");
    }

    #[test]
    fn test_configuration_needs_parser_or_copy() {
        let view = FtsView::new(FtsKind::Configuration);
        let data = json!({"name": "cfg", "schema": 2200}).as_object().unwrap().clone();
        match view.validate_create(&data) {
            Err(NodeError::Gone(message)) => assert_eq!(message, "Provide at least copy config or parser."),
            other => panic!("unexpected {:?}", other),
        }
        let with_parser = json!({"name": "cfg", "schema": 2200, "prsname": "default"})
            .as_object()
            .unwrap()
            .clone();
        assert!(view.validate_create(&with_parser).is_ok());
        assert!(FtsView::new(FtsKind::Parser).validate_create(&data).is_ok());
    }

    #[test]
    fn test_required_arguments_by_kind() {
        let template = FtsView::new(FtsKind::Template);
        let data = json!({"name": "t", "schema": 2200}).as_object().unwrap().clone();
        assert_eq!(template.missing_arg(&data), Some("tmpllexize"));

        let parser = FtsView::new(FtsKind::Parser);
        assert_eq!(parser.missing_arg(&data), Some("prsstart"));
    }

    #[test]
    fn test_empty_option_leads_list() {
        let options = with_empty_option("-", [option("dsimple_init")]);
        assert_eq!(
            options,
            json!([{"label": "", "value": "-"}, {"label": "dsimple_init", "value": "dsimple_init"}])
        );
    }
}
