mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{app, app_with_state, get, send, server, MockProvider, ScriptedConnection};
use pgnode_browser::logic::bgprocess::{JobCommand, JobStatus};
use pgnode_browser::ServerType;

const SCHEMA_TEMPLATES: &[(&str, &str)] = &[
    (
        "schemas/pg/default/nodes.sql",
        "-- schema nodes{% if scid %} scid={{ scid }}{% endif %}",
    ),
    ("schemas/pg/default/properties.sql", "-- schema properties scid={{ scid }}"),
    ("schemas/pg/default/acl.sql", "-- schema acl scid={{ scid }}"),
    ("schemas/pg/default/defacl.sql", "-- schema defacl scid={{ scid }}"),
    ("schemas/pg/default/is_catalog.sql", "-- schema is_catalog scid={{ scid }}"),
    ("schemas/pg/default/get_name.sql", "-- schema name scid={{ scid }}"),
    ("schemas/pg/default/oid.sql", "-- schema oid {{ schema }}"),
    ("schemas/pg/default/create.sql", "CREATE SCHEMA {{ data.name|qtIdent }};"),
    (
        "schemas/pg/default/delete.sql",
        "DROP SCHEMA {{ name|qtIdent }}{% if cascade %} CASCADE{% endif %};",
    ),
    (
        "schemas/pg/default/update.sql",
        "{% if data.name and data.name != o_data.name %}ALTER SCHEMA {{ o_data.name|qtIdent }} RENAME TO {{ data.name|qtIdent }};{% endif %}",
    ),
    ("views/pg/default/properties.sql", "-- view properties vid={{ vid }}"),
    ("columns/default/properties.sql", "-- column properties tid={{ tid }}"),
];

fn pg_app(conn: Arc<ScriptedConnection>) -> axum::Router {
    let provider = MockProvider::new().with_server(server(1, "local"), ServerType::Pg, 160002, conn);
    app(provider, SCHEMA_TEMPLATES)
}

#[tokio::test]
async fn test_health_check() {
    let app = pg_app(Arc::new(ScriptedConnection::new()));
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_schema_nodes_respect_restricted_schemas() {
    let conn = Arc::new(ScriptedConnection::new().respond(
        "-- schema nodes",
        json!([
            {"oid": 2200, "name": "public", "can_create": true, "has_usage": true},
            {"oid": 16400, "name": "audit", "can_create": false, "has_usage": true}
        ]),
    ));
    let mut restricted = server(1, "local");
    restricted.restricted_schemas = Some(vec!["public".to_string()]);
    let provider = MockProvider::new().with_server(restricted, ServerType::Pg, 160002, conn);
    let app = app(provider, SCHEMA_TEMPLATES);

    let (status, body) = get(&app, "/browser/schema/nodes/1/1/13799").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], 1);
    assert_eq!(body["errormsg"], "");
    assert_eq!(
        body["data"],
        json!([{
            "id": "schema_2200",
            "label": "public",
            "icon": "icon-schema",
            "inode": true,
            "_type": "schema",
            "_id": 2200,
            "_pid": 13799,
            "module": "pgadmin.node.schema",
            "can_create": true,
            "has_usage": true
        }])
    );
}

#[tokio::test]
async fn test_create_without_name_is_gone() {
    let conn = Arc::new(ScriptedConnection::new());
    let app = pg_app(conn.clone());

    let (status, body) = send(&app, Method::POST, "/browser/schema/obj/1/1/13799", Some(json!({}))).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["success"], 0);
    assert_eq!(body["errormsg"], "Could not find the required parameter (name).");
    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn test_create_schema_returns_node() {
    let conn = Arc::new(ScriptedConnection::new().respond("-- schema oid sales", json!({"oid": 16500})));
    let app = pg_app(conn.clone());

    let (status, body) = send(
        &app,
        Method::POST,
        "/browser/schema/obj/1/1/13799",
        Some(json!({"name": "sales"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"node": {
            "id": "schema_16500",
            "label": "sales",
            "icon": "icon-schema",
            "inode": true,
            "_type": "schema",
            "_id": 16500,
            "_pid": 13799,
            "module": "pgadmin.node.schema"
        }})
    );
    assert!(conn.executed().iter().any(|sql| sql == "CREATE SCHEMA sales;"));
}

#[tokio::test]
async fn test_driver_error_is_reported() {
    let conn = Arc::new(ScriptedConnection::new().fail("CREATE SCHEMA", "permission denied for database inventory"));
    let app = pg_app(conn);

    let (status, body) = send(
        &app,
        Method::POST,
        "/browser/schema/obj/1/1/13799",
        Some(json!({"name": "sales"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], 0);
    assert_eq!(body["errormsg"], "permission denied for database inventory");
}

#[tokio::test]
async fn test_delete_of_vanished_object() {
    let app = pg_app(Arc::new(ScriptedConnection::new()));

    let (status, body) = send(&app, Method::DELETE, "/browser/schema/obj/1/1/13799/16600", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": 0,
            "errormsg": "Error: Object not found.",
            "info": "The specified schema could not be found.\n"
        })
    );
}

#[tokio::test]
async fn test_delete_action_cascades() {
    let conn = Arc::new(ScriptedConnection::new().respond("-- schema name scid=16400", json!({"name": "audit"})));
    let app = pg_app(conn.clone());

    let (status, body) = send(&app, Method::DELETE, "/browser/schema/delete/1/1/13799/16400", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": 1,
            "info": "Schema dropped",
            "data": {"id": 16400, "gid": 1, "sid": 1, "did": 13799}
        })
    );
    assert!(conn.executed().iter().any(|sql| sql == "DROP SCHEMA audit CASCADE;"));
}

#[tokio::test]
async fn test_msql_previews_update() {
    let conn = Arc::new(
        ScriptedConnection::new().respond("-- schema properties scid=2200", json!({"oid": 2200, "name": "public"})),
    );
    let app = pg_app(conn.clone());

    let (status, body) = get(&app, "/browser/schema/msql/1/1/13799/2200?name=sales").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ALTER SCHEMA public RENAME TO sales;");

    let (status, body) = get(&app, "/browser/schema/msql/1/1/13799/2200?name=public").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "--modified SQL");

    // msql only previews
    assert!(!conn.executed().iter().any(|sql| sql.starts_with("ALTER")));
}

#[tokio::test]
async fn test_schema_children_are_collections() {
    let conn = Arc::new(ScriptedConnection::new().respond("-- schema is_catalog scid=2200", json!({"oid": 2200})));
    let app = pg_app(conn);

    let (status, body) = get(&app, "/browser/schema/children/1/1/13799/2200").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"coll-collation"));
    assert!(ids.contains(&"coll-mview"));
    assert!(ids.contains(&"coll-fts_template"));
    assert!(!ids.contains(&"coll-dbms_job"));
    assert!(body["data"].as_array().unwrap().iter().all(|node| node["_pid"] == 2200));
}

#[tokio::test]
async fn test_children_of_missing_schema_is_gone() {
    let app = pg_app(Arc::new(ScriptedConnection::new()));
    let (status, body) = get(&app, "/browser/schema/children/1/1/13799/99999").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["success"], 0);
}

#[tokio::test]
async fn test_database_children_depend_on_server_type() {
    let provider = MockProvider::new()
        .with_server(server(1, "pg"), ServerType::Pg, 160002, Arc::new(ScriptedConnection::new()))
        .with_server(server(2, "epas"), ServerType::Ppas, 160002, Arc::new(ScriptedConnection::new()));
    let app = app(provider, SCHEMA_TEMPLATES);

    let (status, body) = get(&app, "/browser/database/children/1/1/13799").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["coll-schema"]);

    let (_, body) = get(&app, "/browser/database/children/1/2/13799").await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["coll-schema", "dbms_job_scheduler_999999"]);

    let (_, body) = get(&app, "/browser/dbms_job_scheduler/children/1/2/13799/999999").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_node_not_supported_by_server() {
    let app = pg_app(Arc::new(ScriptedConnection::new()));
    let (status, body) = get(&app, "/browser/dbms_job/nodes/1/1/13799").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["errormsg"], "This node is not supported by the server.");
}

#[tokio::test]
async fn test_unknown_routes() {
    let app = pg_app(Arc::new(ScriptedConnection::new()));

    let (status, _) = get(&app, "/browser/table/nodes/1/1/13799/2200").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::PUT, "/browser/schema/obj/1/1/13799", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/browser/schema/nodes/1/7/13799").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["errormsg"], "Could not find the specified server.");
}

#[tokio::test]
async fn test_view_select_script() {
    let conn = Arc::new(
        ScriptedConnection::new()
            .respond(
                "-- view properties vid=16700",
                json!({"oid": 16700, "name": "order_totals", "schema": "public"}),
            )
            .respond(
                "-- column properties tid=16700",
                json!([{"name": "id"}, {"name": "Total"}]),
            ),
    );
    let app = pg_app(conn);

    let (status, body) = get(&app, "/browser/view/select_sql/1/1/13799/2200/16700").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("SELECT id, \"Total\"\n\tFROM public.order_totals;"));
}

#[tokio::test]
async fn test_background_process_listing() {
    let app = pg_app(Arc::new(ScriptedConnection::new()));

    let (status, body) = get(&app, "/misc/bgprocess").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = get(&app, "/misc/bgprocess/4f0c2a").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["errormsg"], "Could not find the process with id 4f0c2a.");
}

fn shell(script: &str) -> JobCommand {
    JobCommand {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
        envs: Vec::new(),
    }
}

#[tokio::test]
async fn test_background_process_release() {
    let provider = MockProvider::new().with_server(
        server(1, "local"),
        ServerType::Pg,
        160002,
        Arc::new(ScriptedConnection::new()),
    );
    let (app, state) = app_with_state(provider, SCHEMA_TEMPLATES);

    let (status, body) = send(&app, Method::DELETE, "/misc/bgprocess/4f0c2a", None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["errormsg"], "Could not find the process with id 4f0c2a.");

    let running = state.jobs.spawn("sleep", shell("sleep 5")).unwrap();
    let (status, _) = send(&app, Method::DELETE, &format!("/misc/bgprocess/{}", running.id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.jobs.get(&running.id).is_some());

    let done = state.jobs.spawn("true", shell("true")).unwrap();
    for _ in 0..100 {
        if state.jobs.get(&done.id).map(|job| job.status) != Some(JobStatus::Running) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let (status, body) = send(&app, Method::DELETE, &format!("/misc/bgprocess/{}", done.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], 1);
    assert_eq!(body["data"]["id"], done.id.as_str());
    assert_eq!(body["data"]["status"], "finished");

    let (status, _) = get(&app, &format!("/misc/bgprocess/{}", done.id)).await;
    assert_eq!(status, StatusCode::GONE);
    let (_, body) = get(&app, "/misc/bgprocess").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
