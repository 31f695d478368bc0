pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod nodes;
pub mod state;
pub mod store;
pub mod templates;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{NodeError, NodeResult};
pub use logic::{NodeRegistry, NodeView};

// Export all model types
pub use model::*;

pub use state::AppState;

// Export store types
pub use store::{Connection, ConnectionProvider, ConnectionRegistry};

pub use templates::{SqlTemplates, TemplateRenderer};

/// Build the application state from configuration: one connection manager
/// per registered server and the SQL templates on disk.
pub fn build_state(config: &config::AppConfig) -> AppState<ConnectionRegistry> {
    use std::sync::Arc;

    let provider = Arc::new(ConnectionRegistry::new(&config.servers, &config.database));
    let templates: Arc<dyn TemplateRenderer> = Arc::new(SqlTemplates::from_directory(&config.templates.directory));
    AppState::new(provider, templates, logic::BrowserSettings::from_config(config))
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = crate::config::AppConfig::load()?;

    let state = Arc::new(build_state(&config));
    let app = crate::api::routes::create_router().with_state(state);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_state_registers_configured_servers() {
        let mut config = config::AppConfig::default();
        config.servers.push(Server {
            id: 3,
            gid: 2,
            name: "reporting".into(),
            host: "db.internal".into(),
            port: 5433,
            maintenance_db: "postgres".into(),
            username: "report".into(),
            password: None,
            restricted_schemas: None,
        });

        let state = build_state(&config);
        let server = state.provider.server(3).expect("server 3 is registered");
        assert_eq!(server.port, 5433);
        assert!(state.provider.server(1).is_none());
        assert!(state.registry.get("schema").is_some());
        assert!(!state.settings.show_system_objects);
    }
}
