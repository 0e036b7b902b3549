//! The agent gateway: one JSON-RPC child per tool, thread bindings, and the
//! A2A translation layer.

pub mod a2a;
pub mod client;
pub mod protocol;
pub mod threads;
pub mod tool;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::launcher;

use client::RpcClient;
use threads::ThreadManager;
use tool::ToolKind;

/// One tool's gateway: the stdio client plus its session/thread bindings.
pub struct ToolGateway {
    pub client: Arc<RpcClient>,
    pub threads: ThreadManager,
}

impl ToolGateway {
    pub fn new(client: Arc<RpcClient>) -> Self {
        let threads = ThreadManager::new(client.clone());
        Self { client, threads }
    }
}

/// Lazily constructed gateways, one per tool kind. Construction resolves the
/// executable; the child itself starts on the first call.
#[derive(Default)]
pub struct GatewayRegistry {
    inner: Mutex<HashMap<ToolKind, Arc<ToolGateway>>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, tool: ToolKind) -> Result<Arc<ToolGateway>> {
        let mut inner = self.inner.lock().await;
        if let Some(gateway) = inner.get(&tool) {
            return Ok(gateway.clone());
        }

        let spec = launcher::spawn_spec(tool.program(), None)
            .await?
            .args(tool.server_args().iter().copied());
        let gateway = Arc::new(ToolGateway::new(Arc::new(RpcClient::new(tool, spec))));
        inner.insert(tool, gateway.clone());
        Ok(gateway)
    }

    /// Tear down every child. Used on shutdown.
    pub async fn close_all(&self) {
        let gateways: Vec<Arc<ToolGateway>> = self.inner.lock().await.values().cloned().collect();
        for gateway in gateways {
            gateway.client.close().await;
        }
    }
}
