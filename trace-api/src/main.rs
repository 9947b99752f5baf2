//! Traceability API server binary.
//!
//! Configuration comes from the environment:
//! - TRACE_API_HOST / TRACE_API_PORT - bind address (default 0.0.0.0:3000)
//! - TRACE_API_CORS - disable CORS with "0" or "false"
//! - TRACE_DATA_DIR - sled database directory; in-memory when unset
//! - RUST_LOG - tracing filter (default "info")

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use trace_api::{run_server, ApiConfig};
use trace_db::store::{MemoryStore, SledStore, TraceStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ApiConfig::from_env();

    let store: Arc<dyn TraceStore> = match config.data_dir.as_deref() {
        Some(dir) => {
            tracing::info!(data_dir = dir, "Opening sled database");
            Arc::new(SledStore::open(dir)?)
        }
        None => {
            tracing::warn!("TRACE_DATA_DIR not set, using in-memory storage");
            Arc::new(MemoryStore::new())
        }
    };

    run_server(&config, store).await
}
