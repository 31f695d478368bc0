use axum::serve;
use pgnode_browser::api::routes::create_router;
use pgnode_browser::build_state;
use pgnode_browser::config::AppConfig;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)      // Default to Info for everything
        .filter_module("sqlx", LevelFilter::Warn)  // Suppress sqlx Debug logs
        .parse_default_env()
        .init();

    println!("pgnode-browser: PostgreSQL object browser backend");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}, {} registered server(s), templates in {}",
        config.server.host,
        config.server.port,
        config.servers.len(),
        config.templates.directory
    );

    let state = Arc::new(build_state(&config));

    run_server(create_router().with_state(state), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("pgnode-browser running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
