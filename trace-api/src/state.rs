//! Application state for the API server

use std::sync::Arc;

use trace_db::services::{CatalogService, RecordService, TaskService};
use trace_db::store::TraceStore;

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// Catalog lookups and the operator import
    pub catalog: Arc<CatalogService>,
    /// Production task lifecycle
    pub tasks: Arc<TaskService>,
    /// Traceability record lifecycle
    pub records: Arc<RecordService>,
    /// API version
    pub version: String,
}

impl AppState {
    /// Create new app state over a storage backend
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        let catalog = Arc::new(CatalogService::new(store.clone()));
        let tasks = Arc::new(TaskService::new(store.clone(), catalog.clone()));
        let records = Arc::new(RecordService::new(store, catalog.clone()));

        Self {
            catalog,
            tasks,
            records,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// On-disk database directory; an in-memory store is used when unset
    pub data_dir: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            data_dir: None,
        }
    }
}

impl ApiConfig {
    /// Environment overrides on top of the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("TRACE_API_HOST").unwrap_or(defaults.host),
            port: std::env::var("TRACE_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            enable_cors: std::env::var("TRACE_API_CORS")
                .map(|v| v != "0" && v != "false")
                .unwrap_or(defaults.enable_cors),
            data_dir: std::env::var("TRACE_DATA_DIR").ok(),
        }
    }
}
