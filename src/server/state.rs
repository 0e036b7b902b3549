use std::sync::Arc;

use crate::config::ServerConfig;
use crate::gateway::GatewayRegistry;
use crate::jobs::JobRegistry;
use crate::sessions::{ArchiveScanner, StatsCache};
use crate::store::DataStore;
use crate::terminal::TerminalRegistry;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<DataStore>,
    pub gateways: Arc<GatewayRegistry>,
    pub scanner: Arc<ArchiveScanner>,
    pub stats: Arc<StatsCache>,
    pub terminals: TerminalRegistry,
    pub jobs: JobRegistry,
}
