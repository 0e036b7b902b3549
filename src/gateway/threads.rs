//! Logical-session to agent-thread binding.
//!
//! The browser picks an opaque logical session id (the A2A `contextId`); the
//! child assigns the durable thread id. Bindings are created lazily on the
//! first chat turn and live for the process lifetime. A per-session lock
//! collapses concurrent first turns into a single `thread/start`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;

use super::client::RpcClient;

/// A bound agent thread for one logical session.
#[derive(Debug, Clone)]
pub struct ThreadBinding {
    pub thread_id: String,
    pub cwd: String,
    /// The child's on-disk rollout file for this thread, when reported.
    pub archive_path: Option<String>,
}

type Slot = Arc<Mutex<Option<ThreadBinding>>>;

pub struct ThreadManager {
    client: Arc<RpcClient>,
    sessions: Mutex<HashMap<String, Slot>>,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadManager {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            sessions: Mutex::new(HashMap::new()),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// At most one chat turn may be in flight per logical session: the
    /// child's notifications carry no marker tying a delta to one turn, so
    /// overlapping turns on a thread would bleed into each other's streams.
    /// The guard is held for the whole turn and released on drop, including
    /// when the browser aborts the stream.
    pub async fn turn_guard(&self, session_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Return the session's thread, starting one on the child if none is
    /// bound yet. Concurrent calls for the same session collapse to one
    /// `thread/start`.
    pub async fn get_or_create(&self, session_id: &str, cwd: &str) -> Result<ThreadBinding> {
        let slot = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let mut guard = slot.lock().await;
        if let Some(binding) = guard.as_ref() {
            return Ok(binding.clone());
        }

        let tool = self.client.tool();
        let result = self
            .client
            .call(tool.thread_start_method(), Some(tool.thread_start_params(cwd)))
            .await?;
        let (thread_id, archive_path) = tool.parse_thread_start(&result)?;

        tracing::info!(session_id, thread_id, cwd, "bound agent thread");

        let binding = ThreadBinding {
            thread_id,
            cwd: cwd.to_string(),
            archive_path,
        };
        *guard = Some(binding.clone());
        Ok(binding)
    }

    /// Drop a binding so the next turn starts a fresh thread.
    pub async fn forget(&self, session_id: &str) {
        self.sessions.lock().await.remove(session_id);
        self.turn_locks.lock().await.remove(session_id);
    }
}
