//! EDB Advanced Server `DBMS_SCHEDULER` objects. They hang below a fixed
//! job-scheduler entry of the database and are driven through the
//! scheduler package, so their templates take keyword arguments rather
//! than a `data` object.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::logic::calendar::RepeatInterval;
use crate::logic::context::NodeContext;
use crate::logic::function_args::format_arguments_from_db;
use crate::logic::node::{CustomOperation, HttpMethod, NodeDef, ParentLevel, Scope, TemplateLayout};
use crate::logic::view::{is_blank, required_oid, GeneratedSql, NodeView, INCOMPLETE_DEFINITION};
use crate::model::{
    row_bool, row_str, BrowserNode, NodeResponse, Oid, Row, ServerType, SqlOptions,
    DATABASE_LAST_SYSTEM_OID, DBMS_JOB_SCHEDULER_ID,
};

const fn scheduler_def(
    node_type: &'static str,
    label: &'static str,
    title: &'static str,
    id_name: &'static str,
    template_kind: &'static str,
) -> NodeDef {
    NodeDef {
        node_type,
        label,
        title,
        parent: ParentLevel::JobScheduler,
        children: None,
        id_name,
        template_kind,
        layout: TemplateLayout::ByServerType,
        inode: false,
        server_types: &[ServerType::Ppas],
        min_version: 90600,
        max_version: None,
        ddl_keyword: "",
    }
}

pub static DBMS_JOB: NodeDef = scheduler_def("dbms_job", "DBMS Jobs", "Job", "jsjobid", "dbms_jobs");
pub static DBMS_PROGRAM: NodeDef =
    scheduler_def("dbms_program", "DBMS Programs", "Program", "jsprid", "dbms_programs");
pub static DBMS_SCHEDULE: NodeDef =
    scheduler_def("dbms_schedule", "DBMS Schedules", "Schedule", "jsscid", "dbms_schedules");

static JOB_OPERATIONS: [CustomOperation; 5] = [
    CustomOperation::new("get_procedures", HttpMethod::Get, Scope::Collection),
    CustomOperation::new("enable_disable", HttpMethod::Put, Scope::Object),
    CustomOperation::new("get_programs", HttpMethod::Get, Scope::Collection),
    CustomOperation::new("get_schedules", HttpMethod::Get, Scope::Collection),
    CustomOperation::new("run_job", HttpMethod::Put, Scope::Object),
];

static PROGRAM_OPERATIONS: [CustomOperation; 2] = [
    CustomOperation::new("get_procedures", HttpMethod::Get, Scope::Collection),
    CustomOperation::new("enable_disable", HttpMethod::Put, Scope::Object),
];

const STORED_PROCEDURE: &str = "STORED_PROCEDURE";

/// Procedure name for stored-procedure programs, the PL/SQL block
/// otherwise.
fn program_action(data: &Row) -> Value {
    let key = if row_str(data, "jsprtype") == Some(STORED_PROCEDURE) {
        "jsprproc"
    } else {
        "jsprcode"
    };
    data.get(key).cloned().unwrap_or(Value::Null)
}

fn field(data: &Row, key: &str) -> Value {
    data.get(key).cloned().unwrap_or(Value::Null)
}

fn arguments(data: &Row) -> Value {
    match data.get("jsprarguments") {
        Some(args @ Value::Array(_)) => args.clone(),
        _ => json!([]),
    }
}

/// Jobs that name both a program and a schedule are `p`, inline jobs `s`.
fn job_type(data: &Row) -> &'static str {
    if !is_blank(data.get("jsjobscname")) && !is_blank(data.get("jsjobprname")) {
        "p"
    } else {
        "s"
    }
}

fn job_create_args(data: &Row, repeat_interval: Value) -> Value {
    json!({
        "job_name": field(data, "jsjobname"),
        "internal_job_type": field(data, "jsjobtype"),
        "job_type": field(data, "jsprtype"),
        "job_action": program_action(data),
        "enabled": field(data, "jsjobenabled"),
        "comments": field(data, "jsjobdesc"),
        "number_of_arguments": field(data, "jsprnoofargs"),
        "start_date": field(data, "jsscstart"),
        "repeat_interval": repeat_interval,
        "end_date": field(data, "jsscend"),
        "program_name": field(data, "jsjobprname"),
        "schedule_name": field(data, "jsjobscname"),
        "arguments": arguments(data),
    })
}

fn program_create_args(data: &Row) -> Value {
    json!({
        "program_name": field(data, "jsprname"),
        "program_type": field(data, "jsprtype"),
        "program_action": program_action(data),
        "number_of_arguments": field(data, "jsprnoofargs"),
        "enabled": field(data, "jsprenabled"),
        "comments": field(data, "jsprdesc"),
        "arguments": arguments(data),
    })
}

fn schedule_create_args(data: &Row, repeat_interval: Value) -> Value {
    json!({
        "schedule_name": field(data, "jsscname"),
        "start_date": field(data, "jsscstart"),
        "repeat_interval": repeat_interval,
        "end_date": field(data, "jsscend"),
        "comments": field(data, "jsscdesc"),
    })
}

/// Tree entry of a scheduler object; enabled state picks the icon.
fn scheduler_node(
    def: &NodeDef,
    row: &Row,
    name: &str,
    enabled: Option<&str>,
    description: &str,
    icon: &str,
) -> NodeResult<BrowserNode> {
    let oid = required_oid(row, def.id_name)?;
    let label = row_str(row, name).unwrap_or_default();
    let (icon, is_enabled) = match enabled {
        Some(column) if row_bool(row, column) => (icon.to_string(), Some(true)),
        Some(_) => (format!("{}-disabled", icon), Some(false)),
        None => (icon.to_string(), None),
    };
    let mut node = BrowserNode::new(def.node_type, oid, DBMS_JOB_SCHEDULER_ID, label, icon, def.inode);
    if let Some(is_enabled) = is_enabled {
        node = node.with_extra("is_enabled", is_enabled);
    }
    if let Some(description) = row.get(description) {
        node = node.with_extra("description", description.clone());
    }
    Ok(node)
}

/// Scheduler package calls run inside an explicit transaction block.
async fn execute_in_block(ctx: &NodeContext, sql: &str) -> NodeResult<()> {
    ctx.conn.execute_void("BEGIN").await?;
    if let Err(e) = ctx.conn.execute_scalar(sql).await {
        if let Err(end) = ctx.conn.execute_void("END").await {
            log::warn!("Could not close scheduler transaction: {}", end);
        }
        return Err(e);
    }
    ctx.conn.execute_void("END").await
}

/// Arguments declared by a program, taken from the programs template
/// directory.
async fn program_arguments(ctx: &NodeContext, program: &Row) -> NodeResult<Vec<Value>> {
    let path = ctx.sibling_path(DBMS_PROGRAM.template_kind);
    let sql = ctx.render_in(
        &path,
        "get_program_args.sql",
        ctx.args_with(json!({"program_name": field(program, "jsprname")})),
    )?;
    let rows = ctx.conn.execute_dict(&sql).await?;
    Ok(rows
        .rows
        .into_iter()
        .map(|row| {
            json!({
                "argid": field(&row, "argid"),
                "argtype": field(&row, "argtype"),
                "argname": field(&row, "argname"),
                "argdefval": field(&row, "argdefval"),
            })
        })
        .collect())
}

async fn get_procedures(ctx: &NodeContext) -> NodeResult<Value> {
    let path = ctx.sibling_path(DBMS_PROGRAM.template_kind);
    let sql = ctx.render_in(
        &path,
        "get_procedures.sql",
        ctx.args_with(json!({"datlastsysoid": DATABASE_LAST_SYSTEM_OID})),
    )?;
    let rows = ctx.conn.execute_dict(&sql).await?;

    let mut procedures = Vec::with_capacity(rows.rows.len());
    for row in &rows.rows {
        let formatted = format_arguments_from_db(row, |type_oid| {
            let path = path.clone();
            async move {
                let sql = ctx.render_in(&path, "get_out_types.sql", ctx.args_with(json!({"out_arg_oid": type_oid})))?;
                let name = ctx.conn.execute_scalar(&sql).await?;
                Ok::<_, NodeError>(name.as_str().unwrap_or_default().to_string())
            }
        })
        .await?;
        procedures.push(json!({
            "label": field(row, "proc_name"),
            "value": field(row, "proc_name"),
            "no_of_args": field(row, "number_of_arguments"),
            "arguments": formatted.arguments,
        }));
    }
    Ok(Value::Array(procedures))
}

/// `{label, value}` options of a sibling collection's `nodes.sql`.
async fn sibling_names(ctx: &NodeContext, def: &NodeDef, column: &str) -> NodeResult<Value> {
    let path = ctx.sibling_path(def.template_kind);
    let sql = ctx.render_in(&path, "nodes.sql", ctx.args())?;
    let rows = ctx.conn.execute_dict(&sql).await?;
    Ok(Value::Array(
        rows.rows
            .iter()
            .map(|row| json!({"label": field(row, column), "value": field(row, column)}))
            .collect(),
    ))
}

async fn enable_disable(
    ctx: &NodeContext,
    oid: Option<Oid>,
    data: &Row,
    name_key: &str,
    flag_key: &str,
    title: &str,
) -> NodeResult<NodeResponse> {
    let is_enable = row_bool(data, flag_key);
    let path = ctx.sibling_path(DBMS_PROGRAM.template_kind);
    let sql = ctx.render_in(
        &path,
        "enable_disable.sql",
        ctx.args_with(json!({"name": field(data, name_key), "is_enable": is_enable})),
    )?;
    ctx.conn.execute_void(&sql).await?;

    let info = if is_enable {
        format!("{} enabled", title)
    } else {
        format!("{} disabled", title)
    };
    let mut ids = json!({"sid": ctx.ids.sid, "did": ctx.ids.did, "jsid": DBMS_JOB_SCHEDULER_ID});
    if let Value::Object(map) = &mut ids {
        map.insert(ctx.def.id_name.into(), json!(oid));
    }
    Ok(NodeResponse::info(info, ids))
}

fn unsupported(def: &NodeDef, action: &str) -> NodeError {
    NodeError::NotFound(format!("Unsupported operation {} for {}", action, def.node_type))
}

pub struct DbmsJobView;

impl DbmsJobView {
    /// Fill in the value each program argument currently has for this job.
    async fn job_argument_values(&self, ctx: &NodeContext, job: &str, args: &mut [Value]) -> NodeResult<()> {
        for arg in args.iter_mut() {
            let Value::Object(arg) = arg else {
                continue;
            };
            let value = ctx
                .scalar(
                    "get_job_args_value.sql",
                    ctx.args_with(json!({"job_name": job, "arg_name": field(arg, "argname")})),
                )
                .await?;
            arg.insert("argval".into(), value);
        }
        Ok(())
    }
}

#[async_trait]
impl NodeView for DbmsJobView {
    fn def(&self) -> &'static NodeDef {
        &DBMS_JOB
    }

    fn custom_operations(&self) -> &'static [CustomOperation] {
        &JOB_OPERATIONS
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["jsjobname"]
    }

    fn raw_string_keys(&self) -> &'static [&'static str] {
        &["jsjobdesc"]
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("Could not find the specified job.")
    }

    fn browser_node(&self, _ctx: &NodeContext, row: &Row) -> NodeResult<BrowserNode> {
        scheduler_node(&DBMS_JOB, row, "jsjobname", Some("jsjobenabled"), "jsjobdesc", "icon-pga_job")
    }

    async fn format_properties(&self, ctx: &NodeContext, _oid: Oid, mut row: Row) -> NodeResult<Row> {
        row.insert("jsjobtype".into(), json!(job_type(&row)));
        if let Some(calendar) = row.get("jsscrepeatint") {
            let calendar = calendar.as_str().unwrap_or_default().to_string();
            RepeatInterval::parse(&calendar).apply_to(&mut row);
        }

        let path = ctx.sibling_path(DBMS_PROGRAM.template_kind);
        let sql = ctx.render_in(
            &path,
            "properties.sql",
            ctx.args_with(json!({"jsprid": field(&row, "program_id")})),
        )?;
        if let Some(program) = ctx.conn.execute_dict(&sql).await?.rows.into_iter().next() {
            let mut args = program_arguments(ctx, &program).await?;
            let job = row_str(&row, "jsjobname").unwrap_or_default().to_string();
            self.job_argument_values(ctx, &job, &mut args).await?;
            row.insert("jsprarguments".into(), Value::Array(args));
        }
        Ok(row)
    }

    /// Jobs are created whole; afterwards only argument values change.
    async fn get_sql(&self, ctx: &NodeContext, data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        match oid {
            None => {
                let name = row_str(&data, "jsjobname").unwrap_or_default().to_string();
                if self.missing_arg(&data).is_some() {
                    return Ok(GeneratedSql {
                        sql: INCOMPLETE_DEFINITION.to_string(),
                        name,
                    });
                }
                let calendar = RepeatInterval::from_form(&data).to_calendar_string();
                let sql = ctx.render("create.sql", ctx.args_with(job_create_args(&data, json!(calendar))))?;
                Ok(GeneratedSql { sql, name })
            }
            Some(oid) => {
                let old = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
                let name = row_str(&old, "jsjobname").unwrap_or_default().to_string();
                let Some(changed) = data.get("jsprarguments").and_then(|args| args.get("changed")) else {
                    return Ok(GeneratedSql { sql: String::new(), name });
                };
                let sql = ctx.render(
                    "update.sql",
                    ctx.args_with(json!({"job_name": name, "changed_value": changed})),
                )?;
                Ok(GeneratedSql { sql, name })
            }
        }
    }

    async fn create(&self, ctx: &NodeContext, data: Row) -> NodeResult<NodeResponse> {
        if let Some(arg) = self.missing_arg(&data) {
            return Err(NodeError::missing(arg));
        }
        let generated = self.get_sql(ctx, data.clone(), None).await?;
        execute_in_block(ctx, &generated.sql).await?;
        let row = ctx
            .fetch_first("get_job_id.sql", ctx.args_with(json!({"job_name": generated.name})))
            .await?
            .ok_or_else(|| NodeError::gone("Job creation failed."))?;
        Ok(NodeResponse::Node(self.browser_node(ctx, &row)?))
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, _cascade: bool) -> NodeResult<Option<String>> {
        let Some(row) = ctx.fetch_first("properties.sql", ctx.object_args(oid)).await? else {
            return Ok(None);
        };
        let sql = ctx.render("delete.sql", ctx.args_with(json!({"job_name": field(&row, "jsjobname")})))?;
        Ok(Some(sql))
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        let data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        let mut args = ctx.args_with(job_create_args(&data, field(&data, "jsscrepeatint")));
        args.insert("display_comments".into(), json!(true));
        ctx.render("create.sql", args)
    }

    async fn custom(
        &self,
        ctx: &NodeContext,
        action: &str,
        oid: Option<Oid>,
        data: Row,
    ) -> NodeResult<NodeResponse> {
        match action {
            "get_procedures" => Ok(NodeResponse::data(get_procedures(ctx).await?)),
            "get_programs" => Ok(NodeResponse::data(sibling_names(ctx, &DBMS_PROGRAM, "jsprname").await?)),
            "get_schedules" => Ok(NodeResponse::data(sibling_names(ctx, &DBMS_SCHEDULE, "jsscname").await?)),
            "enable_disable" => enable_disable(ctx, oid, &data, "job_name", "is_enable_job", "Job").await,
            "run_job" => {
                let sql = ctx.render("run_job.sql", ctx.args_with(json!({"job_name": field(&data, "job_name")})))?;
                ctx.conn.execute_void(&sql).await?;
                Ok(NodeResponse::info("Started the Job execution.", Value::Null))
            }
            _ => Err(unsupported(&DBMS_JOB, action)),
        }
    }
}

pub struct DbmsProgramView;

#[async_trait]
impl NodeView for DbmsProgramView {
    fn def(&self) -> &'static NodeDef {
        &DBMS_PROGRAM
    }

    fn custom_operations(&self) -> &'static [CustomOperation] {
        &PROGRAM_OPERATIONS
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["jsprname", "jsprtype"]
    }

    fn raw_string_keys(&self) -> &'static [&'static str] {
        &["jsprdesc"]
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("Could not find the specified program.")
    }

    fn browser_node(&self, _ctx: &NodeContext, row: &Row) -> NodeResult<BrowserNode> {
        scheduler_node(&DBMS_PROGRAM, row, "jsprname", Some("jsprenabled"), "jsprdesc", "icon-pga_jobstep")
    }

    async fn format_properties(&self, ctx: &NodeContext, _oid: Oid, mut row: Row) -> NodeResult<Row> {
        let args = program_arguments(ctx, &row).await?;
        row.insert("jsprarguments".into(), Value::Array(args));
        Ok(row)
    }

    async fn get_sql(&self, ctx: &NodeContext, data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        let name = row_str(&data, "jsprname").unwrap_or_default().to_string();
        if oid.is_some() {
            return Err(NodeError::BadRequest("Programs cannot be altered.".into()));
        }
        if self.missing_arg(&data).is_some() {
            return Ok(GeneratedSql {
                sql: INCOMPLETE_DEFINITION.to_string(),
                name,
            });
        }
        let sql = ctx.render("create.sql", ctx.args_with(program_create_args(&data)))?;
        Ok(GeneratedSql { sql, name })
    }

    async fn create(&self, ctx: &NodeContext, data: Row) -> NodeResult<NodeResponse> {
        if let Some(arg) = self.missing_arg(&data) {
            return Err(NodeError::missing(arg));
        }
        let generated = self.get_sql(ctx, data, None).await?;
        execute_in_block(ctx, &generated.sql).await?;
        let row = ctx
            .fetch_first("get_program_id.sql", ctx.args_with(json!({"jsprname": generated.name})))
            .await?
            .ok_or_else(|| NodeError::gone("Job program creation failed."))?;
        Ok(NodeResponse::Node(self.browser_node(ctx, &row)?))
    }

    async fn update(&self, _ctx: &NodeContext, _oid: Oid, _data: Row) -> NodeResult<NodeResponse> {
        Err(unsupported(&DBMS_PROGRAM, "update"))
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, _cascade: bool) -> NodeResult<Option<String>> {
        let Some(row) = ctx.fetch_first("properties.sql", ctx.object_args(oid)).await? else {
            return Ok(None);
        };
        let sql = ctx.render(
            "delete.sql",
            ctx.args_with(json!({"program_name": field(&row, "jsprname")})),
        )?;
        Ok(Some(sql))
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        let data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        let mut args = ctx.args_with(program_create_args(&data));
        args.insert("display_comments".into(), json!(true));
        ctx.render("create.sql", args)
    }

    async fn custom(
        &self,
        ctx: &NodeContext,
        action: &str,
        oid: Option<Oid>,
        data: Row,
    ) -> NodeResult<NodeResponse> {
        match action {
            "get_procedures" => Ok(NodeResponse::data(get_procedures(ctx).await?)),
            "enable_disable" => {
                enable_disable(ctx, oid, &data, "program_name", "is_enable_program", "Program").await
            }
            _ => Err(unsupported(&DBMS_PROGRAM, action)),
        }
    }
}

pub struct DbmsScheduleView;

#[async_trait]
impl NodeView for DbmsScheduleView {
    fn def(&self) -> &'static NodeDef {
        &DBMS_SCHEDULE
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["jsscname"]
    }

    fn raw_string_keys(&self) -> &'static [&'static str] {
        &["jsscdesc"]
    }

    fn gone(&self) -> NodeError {
        NodeError::gone("Could not find the specified schedule.")
    }

    fn browser_node(&self, _ctx: &NodeContext, row: &Row) -> NodeResult<BrowserNode> {
        scheduler_node(&DBMS_SCHEDULE, row, "jsscname", None, "jsscdesc", "icon-pga_schedule")
    }

    async fn format_properties(&self, _ctx: &NodeContext, _oid: Oid, mut row: Row) -> NodeResult<Row> {
        if let Some(calendar) = row.get("jsscrepeatint") {
            let calendar = calendar.as_str().unwrap_or_default().to_string();
            RepeatInterval::parse(&calendar).apply_to(&mut row);
        }
        Ok(row)
    }

    async fn get_sql(&self, ctx: &NodeContext, data: Row, oid: Option<Oid>) -> NodeResult<GeneratedSql> {
        let name = row_str(&data, "jsscname").unwrap_or_default().to_string();
        if oid.is_some() {
            return Err(NodeError::BadRequest("Schedules cannot be altered.".into()));
        }
        if self.missing_arg(&data).is_some() {
            return Ok(GeneratedSql {
                sql: INCOMPLETE_DEFINITION.to_string(),
                name,
            });
        }
        let calendar = RepeatInterval::from_form(&data).to_calendar_string();
        let sql = ctx.render("create.sql", ctx.args_with(schedule_create_args(&data, json!(calendar))))?;
        Ok(GeneratedSql { sql, name })
    }

    async fn create(&self, ctx: &NodeContext, data: Row) -> NodeResult<NodeResponse> {
        if let Some(arg) = self.missing_arg(&data) {
            return Err(NodeError::missing(arg));
        }
        let generated = self.get_sql(ctx, data, None).await?;
        execute_in_block(ctx, &generated.sql).await?;
        let row = ctx
            .fetch_first("get_schedule_id.sql", ctx.args_with(json!({"jsscname": generated.name})))
            .await?
            .ok_or_else(|| NodeError::gone("Job schedule creation failed."))?;
        Ok(NodeResponse::Node(self.browser_node(ctx, &row)?))
    }

    async fn update(&self, _ctx: &NodeContext, _oid: Oid, _data: Row) -> NodeResult<NodeResponse> {
        Err(unsupported(&DBMS_SCHEDULE, "update"))
    }

    async fn delete_sql(&self, ctx: &NodeContext, oid: Oid, _cascade: bool) -> NodeResult<Option<String>> {
        let Some(row) = ctx.fetch_first("properties.sql", ctx.object_args(oid)).await? else {
            return Ok(None);
        };
        let sql = ctx.render(
            "delete.sql",
            ctx.args_with(json!({"schedule_name": field(&row, "jsscname"), "force": false})),
        )?;
        Ok(Some(sql))
    }

    async fn reverse_sql(&self, ctx: &NodeContext, oid: Oid, opts: &SqlOptions) -> NodeResult<String> {
        if opts.drop_sql {
            return self.delete_sql(ctx, oid, false).await?.ok_or_else(|| self.gone());
        }
        let data = self.fetch_properties(ctx, oid).await?.ok_or_else(|| self.gone())?;
        let mut args = ctx.args_with(schedule_create_args(&data, field(&data, "jsscrepeatint")));
        args.insert("display_comments".into(), json!(true));
        ctx.render("create.sql", args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_job_type_from_program_and_schedule() {
        assert_eq!(job_type(&row(json!({"jsjobprname": "prg", "jsjobscname": "nightly"}))), "p");
        assert_eq!(job_type(&row(json!({"jsjobprname": "prg", "jsjobscname": null}))), "s");
        assert_eq!(job_type(&row(json!({}))), "s");
    }

    #[test]
    fn test_program_action_by_type() {
        let proc = row(json!({"jsprtype": "STORED_PROCEDURE", "jsprproc": "public.cleanup", "jsprcode": "x"}));
        assert_eq!(program_action(&proc), json!("public.cleanup"));
        let block = row(json!({"jsprtype": "PLSQL_BLOCK", "jsprcode": "BEGIN NULL; END;"}));
        assert_eq!(program_action(&block), json!("BEGIN NULL; END;"));
    }

    #[test]
    fn test_job_create_args_carry_calendar() {
        let data = row(json!({
            "jsjobname": "purge",
            "jsjobtype": "s",
            "jsprtype": "PLSQL_BLOCK",
            "jsprcode": "BEGIN NULL; END;",
            "jsjobenabled": true,
        }));
        let args = job_create_args(&data, json!("FREQ=DAILY;BYHOUR=2"));
        assert_eq!(args["job_name"], json!("purge"));
        assert_eq!(args["repeat_interval"], json!("FREQ=DAILY;BYHOUR=2"));
        assert_eq!(args["arguments"], json!([]));
        assert_eq!(args["schedule_name"], Value::Null);
    }

    #[test]
    fn test_disabled_job_icon() {
        let node = scheduler_node(
            &DBMS_JOB,
            &row(json!({"jsjobid": 7, "jsjobname": "purge", "jsjobenabled": false, "jsjobdesc": null})),
            "jsjobname",
            Some("jsjobenabled"),
            "jsjobdesc",
            "icon-pga_job",
        )
        .unwrap();
        assert_eq!(node.icon, "icon-pga_job-disabled");
        assert_eq!(node.parent_id, DBMS_JOB_SCHEDULER_ID);
        assert_eq!(node.extras["is_enabled"], json!(false));
    }

    #[test]
    fn test_schedule_node_has_no_enabled_flag() {
        let node = scheduler_node(
            &DBMS_SCHEDULE,
            &row(json!({"jsscid": 3, "jsscname": "nightly"})),
            "jsscname",
            None,
            "jsscdesc",
            "icon-pga_schedule",
        )
        .unwrap();
        assert_eq!(node.icon, "icon-pga_schedule");
        assert!(!node.extras.contains_key("is_enabled"));
    }
}
