pub mod router;
pub mod state;

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::dirs;
use crate::error::{Error, Result};
use crate::gateway::GatewayRegistry;
use crate::jobs::JobRegistry;
use crate::sessions::{ArchiveScanner, StatsCache};
use crate::store::DataStore;
use crate::terminal::TerminalRegistry;

/// Start the HTTP server with the given configuration. Returns only on
/// shutdown; bind failure and an unwritable data dir are fatal.
pub async fn start(config: ServerConfig) -> Result<()> {
    dirs::ensure_dirs()?;

    let store = Arc::new(DataStore::open(&config.data_dir).await?);
    tracing::info!(
        projects = store.list_projects(None).await.len(),
        providers = store.list_providers().await.len(),
        "Loaded data store"
    );

    let bind_addr = config.bind_address();
    let state = state::AppState {
        config: Arc::new(config),
        store,
        gateways: Arc::new(GatewayRegistry::new()),
        scanner: Arc::new(ArchiveScanner::new()),
        stats: Arc::new(StatsCache::default()),
        terminals: TerminalRegistry::new(),
        jobs: JobRegistry::new(),
    };

    let app = router::build(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind to {bind_addr}: {e}")))?;

    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Config(format!("Server error: {e}")))?;

    Ok(())
}
