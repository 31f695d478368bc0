#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use pgnode_browser::api::routes::create_router;
use pgnode_browser::logic::BrowserSettings;
use pgnode_browser::store::ResultSet;
use pgnode_browser::{
    AppState, Connection, ConnectionProvider, DatabaseInfo, NodeError, NodeResult, Oid, Row, Server,
    ServerInfo, ServerType, SqlTemplates,
};

/// Answers statements by substring: the first scripted needle found in the
/// SQL text decides the rows. Unmatched statements return no rows.
#[derive(Default)]
pub struct ScriptedConnection {
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, String)>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, needle: &str, rows: Value) -> Self {
        let rows = match rows {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            Value::Object(row) => vec![row],
            _ => Vec::new(),
        };
        self.responses.push((needle.to_string(), rows));
        self
    }

    pub fn fail(mut self, needle: &str, message: &str) -> Self {
        self.failures.push((needle.to_string(), message.to_string()));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute_dict(&self, sql: &str) -> NodeResult<ResultSet> {
        self.executed.lock().push(sql.to_string());
        if let Some((_, message)) = self.failures.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            return Err(NodeError::Driver(message.clone()));
        }
        let rows = self
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(ResultSet::from_rows(rows))
    }

    async fn execute_void(&self, sql: &str) -> NodeResult<()> {
        self.execute_dict(sql).await.map(|_| ())
    }
}

/// Registered servers, each answering through one scripted connection.
#[derive(Default)]
pub struct MockProvider {
    servers: Vec<Server>,
    infos: HashMap<u32, ServerInfo>,
    connections: HashMap<u32, Arc<ScriptedConnection>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(
        mut self,
        server: Server,
        server_type: ServerType,
        version: u32,
        conn: Arc<ScriptedConnection>,
    ) -> Self {
        self.infos.insert(
            server.id,
            ServerInfo {
                sid: server.id,
                version,
                server_type,
            },
        );
        self.connections.insert(server.id, conn);
        self.servers.push(server);
        self
    }

    fn registered(&self, sid: u32) -> NodeResult<&ServerInfo> {
        self.infos
            .get(&sid)
            .ok_or_else(|| NodeError::gone("Could not find the specified server."))
    }
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    fn server(&self, sid: u32) -> Option<Server> {
        self.servers.iter().find(|s| s.id == sid).cloned()
    }

    fn servers(&self) -> Vec<Server> {
        self.servers.clone()
    }

    fn connected_info(&self, sid: u32) -> Option<ServerInfo> {
        self.infos.get(&sid).cloned()
    }

    async fn server_info(&self, sid: u32) -> NodeResult<ServerInfo> {
        self.registered(sid).cloned()
    }

    async fn database_info(&self, sid: u32, did: Oid) -> NodeResult<DatabaseInfo> {
        self.registered(sid)?;
        Ok(DatabaseInfo {
            did,
            name: "inventory".to_string(),
            datlastsysoid: 16383,
        })
    }

    async fn connection(&self, sid: u32, _did: Oid) -> NodeResult<Arc<dyn Connection>> {
        self.registered(sid)?;
        let conn = self
            .connections
            .get(&sid)
            .cloned()
            .ok_or_else(|| NodeError::gone("Could not find the specified server."))?;
        Ok(conn as Arc<dyn Connection>)
    }
}

pub fn server(id: u32, name: &str) -> Server {
    Server {
        id,
        gid: 1,
        name: name.to_string(),
        host: "localhost".to_string(),
        port: 5432,
        maintenance_db: "postgres".to_string(),
        username: "postgres".to_string(),
        password: None,
        restricted_schemas: None,
    }
}

pub fn app(provider: MockProvider, templates: &[(&str, &str)]) -> Router {
    app_with_state(provider, templates).0
}

/// Like `app`, also handing back the shared state for direct inspection.
pub fn app_with_state(provider: MockProvider, templates: &[(&str, &str)]) -> (Router, Arc<AppState<MockProvider>>) {
    let templates = SqlTemplates::from_sources(templates.iter().copied());
    let state = Arc::new(AppState::new(
        Arc::new(provider),
        Arc::new(templates),
        BrowserSettings::default(),
    ));
    (create_router().with_state(Arc::clone(&state)), state)
}

/// Send one request through the router and decode the JSON reply.
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}
