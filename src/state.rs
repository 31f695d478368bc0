use std::sync::Arc;

use crate::config::AppConfig;
use crate::logic::bgprocess::BackgroundJobs;
use crate::logic::context::BrowserSettings;
use crate::logic::registry::NodeRegistry;
use crate::logic::schema_diff::DiffSessions;
use crate::nodes;
use crate::store::ConnectionProvider;
use crate::templates::TemplateRenderer;

/// Shared application state handed to every handler.
pub struct AppState<P: ConnectionProvider + ?Sized> {
    pub provider: Arc<P>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub registry: Arc<NodeRegistry>,
    pub settings: Arc<BrowserSettings>,
    pub jobs: Arc<BackgroundJobs>,
    pub diff_sessions: Arc<DiffSessions>,
}

impl<P: ConnectionProvider + ?Sized> AppState<P> {
    pub fn new(provider: Arc<P>, templates: Arc<dyn TemplateRenderer>, settings: BrowserSettings) -> Self {
        Self {
            provider,
            templates,
            registry: Arc::new(nodes::registry()),
            settings: Arc::new(settings),
            jobs: Arc::new(BackgroundJobs::new()),
            diff_sessions: Arc::new(DiffSessions::new()),
        }
    }
}

impl BrowserSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            show_system_objects: config.browser.show_system_objects,
            ignore_whitespaces: config.schema_diff.ignore_whitespaces,
            psql_path: config.utilities.psql_path.clone(),
        }
    }
}
