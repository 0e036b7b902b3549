//! Stdio JSON-RPC client for one agent child process.
//!
//! Owns the child's stdin/stdout/stderr, multiplexes many request/reply pairs
//! over a pending-completion map, and fans server-initiated notifications and
//! stderr lines out to subscribers. The child is started lazily; a start lock
//! collapses concurrent starts into one spawn + `initialize` handshake. If the
//! child dies, every in-flight waiter fails with a transport error and the
//! next call spawns a fresh child.
//!
//! The pending map is scoped to one child generation: the reader and exit
//! tasks of a dead child can only ever fail waiters that were talking to that
//! child, never requests issued against its replacement.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{Error, Result};
use crate::launcher::ToolSpec;

use super::protocol::{classify, JsonRpcNotification, JsonRpcRequest, Line};
use super::tool::ToolKind;

/// An event delivered to `subscribe()` callers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A server-initiated JSON message (no request of ours matched it).
    Notification(JsonRpcNotification),
    /// A raw stderr line, or a stdout line that failed to parse.
    Stderr(String),
    /// The child exited. Terminal for the current child; a later call respawns.
    Exit { code: Option<i32> },
}

type Completion = oneshot::Sender<Result<Value>>;
type PendingMap = Arc<StdMutex<HashMap<u64, Completion>>>;

/// Subscriber fan-out, shared with the reader tasks of every generation.
struct Subscribers {
    channels: StdMutex<HashMap<u64, mpsc::UnboundedSender<ClientEvent>>>,
    next_id: AtomicU64,
}

impl Subscribers {
    fn publish(&self, event: ClientEvent) {
        let channels = self.channels.lock().unwrap();
        for tx in channels.values() {
            let _ = tx.send(event.clone());
        }
    }
}

fn complete(pending: &PendingMap, id: u64, outcome: Result<Value>) {
    let completion = pending.lock().unwrap().remove(&id);
    match completion {
        // A send failure means the caller cancelled; the late reply is dropped.
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => tracing::debug!(id, "reply for unknown or cancelled request dropped"),
    }
}

fn fail_pending(pending: &PendingMap, reason: &str) {
    let drained: Vec<Completion> = {
        let mut pending = pending.lock().unwrap();
        pending.drain().map(|(_, tx)| tx).collect()
    };
    for tx in drained {
        let _ = tx.send(Err(Error::Transport(reason.to_string())));
    }
}

/// One live child generation.
struct Running {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    kill_tx: mpsc::Sender<()>,
}

/// JSON-RPC client over one child process's stdio.
pub struct RpcClient {
    tool: ToolKind,
    spec: ToolSpec,
    subscribers: Arc<Subscribers>,
    slot: Mutex<Option<Running>>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(tool: ToolKind, spec: ToolSpec) -> Self {
        Self {
            tool,
            spec,
            subscribers: Arc::new(Subscribers {
                channels: StdMutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Idempotent: spawns and initializes a child if none is alive.
    pub async fn ensure_started(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    /// Send one request and wait for the matching reply. Starts the child if
    /// needed. A JSON-RPC `error` in the reply fails with the carried message;
    /// otherwise the `result` member is returned.
    ///
    /// Dropping the returned future abandons only this caller's wait; the
    /// request stays in flight on the child and its late reply is dropped.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let (stdin, pending) = self.handle().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let rx = register(&pending, id);

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = write_request(&stdin, &request).await {
            pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Transport("agent process exited".to_string())),
        }
    }

    /// Subscribe to notifications, stderr lines, and exit events. The stream
    /// is unbounded; dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.channels.lock().unwrap().insert(id, tx);
        Subscription {
            id,
            subscribers: self.subscribers.clone(),
            rx,
        }
    }

    /// Kill the child (if alive), fail all pending waiters, and drop all
    /// subscriber channels. Idempotent; a later `call` starts over.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(running) = slot.take() {
            let _ = running.kill_tx.try_send(());
            fail_pending(&running.pending, "client closed");
        }
        self.subscribers.channels.lock().unwrap().clear();
    }

    /// The start lock: returns the live generation's stdin and pending map,
    /// spawning and handshaking first when necessary.
    async fn handle(&self) -> Result<(Arc<Mutex<ChildStdin>>, PendingMap)> {
        let mut slot = self.slot.lock().await;

        if let Some(running) = slot.as_ref() {
            if running.alive.load(Ordering::SeqCst) {
                return Ok((running.stdin.clone(), running.pending.clone()));
            }
            // The dead generation's cleanup has run (or is about to); nothing
            // from it may leak into the replacement.
            fail_pending(&running.pending, "agent process exited");
            *slot = None;
        }

        let running = self.spawn_child()?;
        match self.handshake(&running).await {
            Ok(()) => {
                let handles = (running.stdin.clone(), running.pending.clone());
                *slot = Some(running);
                Ok(handles)
            }
            Err(e) => {
                let _ = running.kill_tx.try_send(());
                Err(e)
            }
        }
    }

    fn spawn_child(&self) -> Result<Running> {
        let mut cmd = self.spec.command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Transport(format!(
                "Failed to spawn `{}`: {e}",
                self.spec.program.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("agent child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("agent child has no stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Transport("agent child has no stderr".into()))?;

        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);

        // Stdout reader: classifies every line and dispatches without blocking.
        let reader_pending = pending.clone();
        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match classify(&line) {
                    Line::Response(resp) => {
                        let id = resp.id_u64();
                        let outcome = match resp.error {
                            Some(err) => Err(Error::Upstream(err.message)),
                            None => Ok(resp.result.unwrap_or(Value::Null)),
                        };
                        match id {
                            Some(id) => complete(&reader_pending, id, outcome),
                            None => tracing::warn!("response without usable id dropped"),
                        }
                    }
                    Line::Notification(n) => subscribers.publish(ClientEvent::Notification(n)),
                    Line::Unparsed(raw) => subscribers.publish(ClientEvent::Stderr(raw)),
                }
            }
            tracing::debug!("agent stdout closed");
        });

        // Stderr reader: pure fan-out.
        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                subscribers.publish(ClientEvent::Stderr(line));
            }
        });

        // Waiter: owns the child, services kill requests, runs exit cleanup.
        // Pending fails before the alive flag drops so that by the time a
        // fresh generation can spawn, nothing of this one is still in flight.
        let waiter_pending = pending.clone();
        let subscribers = self.subscribers.clone();
        let alive_flag = alive.clone();
        let tool = self.tool;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status.ok(),
                _ = kill_rx.recv() => {
                    let _ = child.kill().await;
                    child.wait().await.ok()
                }
            };
            let code = status.and_then(|s| s.code());
            let reason = match code {
                Some(code) => format!("agent process exited with code {code}"),
                None => "agent process exited".to_string(),
            };
            fail_pending(&waiter_pending, &reason);
            alive_flag.store(false, Ordering::SeqCst);
            subscribers.publish(ClientEvent::Exit { code });
            tracing::warn!(%tool, ?code, "agent child exited");
        });

        Ok(Running {
            stdin: Arc::new(Mutex::new(stdin)),
            pending,
            alive,
            kill_tx,
        })
    }

    /// `initialize` request plus the dialect's `initialized` notification,
    /// performed while the start lock is held.
    async fn handshake(&self, running: &Running) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let rx = register(&running.pending, id);

        let request = JsonRpcRequest::new(
            id,
            self.tool.initialize_method(),
            Some(self.tool.initialize_params()),
        );
        write_request(&running.stdin, &request).await?;

        let reply = rx
            .await
            .map_err(|_| Error::Transport("agent process exited during initialize".to_string()))?;
        reply?;

        if let Some(method) = self.tool.initialized_notification() {
            let note = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": {} });
            write_value(&running.stdin, &note).await?;
        }

        tracing::debug!(tool = %self.tool, "agent child initialized");
        Ok(())
    }
}

fn register(pending: &PendingMap, id: u64) -> oneshot::Receiver<Result<Value>> {
    let (tx, rx) = oneshot::channel();
    pending.lock().unwrap().insert(id, tx);
    rx
}

async fn write_request(stdin: &Mutex<ChildStdin>, request: &JsonRpcRequest) -> Result<()> {
    let value = serde_json::to_value(request)?;
    write_value(stdin, &value).await
}

/// All writes serialize through the stdin lock so no partial line can
/// interleave with another writer.
async fn write_value(stdin: &Mutex<ChildStdin>, value: &Value) -> Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut guard = stdin.lock().await;
    guard
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("stdin write failed: {e}")))?;
    guard
        .flush()
        .await
        .map_err(|e| Error::Transport(format!("stdin flush failed: {e}")))?;
    Ok(())
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    subscribers: Arc<Subscribers>,
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.channels.lock().unwrap().remove(&self.id);
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    /// A shell JSON-RPC responder: echoes `{"id":N,"result":{"n":M}}` for every
    /// request, exits on a `die` method, and errors on a `boom` method.
    const RESPONDER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"method":"die"'*) exit 7 ;;
  esac
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"boom"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-1,"message":"boom failed"}}\n' "$id" ;;
    *)
      n=$(printf '%s' "$line" | sed -n 's/.*"n":\([0-9][0-9]*\).*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"n":%s}}\n' "$id" "${n:-0}" ;;
  esac
done
"#;

    fn responder_client() -> RpcClient {
        let spec = ToolSpec::new("sh").arg("-c").arg(RESPONDER);
        RpcClient::new(ToolKind::Codex, spec)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let client = responder_client();
        let result = client
            .call("ping", Some(serde_json::json!({"n": 41})))
            .await
            .unwrap();
        assert_eq!(result["n"], 41);
        client.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_own_results() {
        let client = Arc::new(responder_client());
        let mut handles = Vec::new();
        for n in 1..=8u64 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let result = client
                    .call("ping", Some(serde_json::json!({"n": n})))
                    .await
                    .unwrap();
                assert_eq!(result["n"], n);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        client.close().await;
    }

    #[tokio::test]
    async fn test_upstream_error_carries_message() {
        let client = responder_client();
        let err = client.call("boom", None).await.unwrap_err();
        match err {
            Error::Upstream(msg) => assert_eq!(msg, "boom failed"),
            other => panic!("expected upstream error, got {other:?}"),
        }
        client.close().await;
    }

    #[tokio::test]
    async fn test_child_exit_fails_pending_then_respawns() {
        let client = responder_client();

        let err = client.call("die", None).await.unwrap_err();
        match err {
            Error::Transport(msg) => assert!(msg.contains("exited"), "message: {msg}"),
            other => panic!("expected transport error, got {other:?}"),
        }

        // The next call transparently starts a fresh child.
        let result = client
            .call("ping", Some(serde_json::json!({"n": 5})))
            .await
            .unwrap();
        assert_eq!(result["n"], 5);
        client.close().await;
    }

    #[tokio::test]
    async fn test_subscriber_sees_exit_event() {
        let client = responder_client();
        client.ensure_started().await.unwrap();

        let mut sub = client.subscribe();
        let _ = client.call("die", None).await;

        loop {
            match sub.recv().await {
                Some(ClientEvent::Exit { code }) => {
                    assert_eq!(code, Some(7));
                    break;
                }
                Some(_) => continue,
                None => panic!("subscription closed before exit event"),
            }
        }
        client.close().await;
    }

    #[tokio::test]
    async fn test_notifications_fan_out() {
        // Responder that emits one notification before each reply.
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  printf '{"jsonrpc":"2.0","method":"turn/started","params":{"threadId":"t1"}}\n'
  printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
done
"#;
        let spec = ToolSpec::new("sh").arg("-c").arg(script);
        let client = RpcClient::new(ToolKind::Codex, spec);
        client.ensure_started().await.unwrap();

        let mut sub = client.subscribe();
        client.call("turn/start", None).await.unwrap();

        match sub.recv().await {
            Some(ClientEvent::Notification(n)) => assert_eq!(n.method, "turn/started"),
            other => panic!("expected notification, got {other:?}"),
        }
        client.close().await;
    }

    #[tokio::test]
    async fn test_string_ids_are_matched() {
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  printf '{"jsonrpc":"2.0","id":"%s","result":{"stringy":true}}\n' "$id"
done
"#;
        let spec = ToolSpec::new("sh").arg("-c").arg(script);
        let client = RpcClient::new(ToolKind::Codex, spec);
        let result = client.call("ping", None).await.unwrap();
        assert_eq!(result["stringy"], true);
        client.close().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces() {
        let spec = ToolSpec::new("/nonexistent/agent-binary-2f8a");
        let client = RpcClient::new(ToolKind::Codex, spec);
        let err = client.ensure_started().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = responder_client();
        client.ensure_started().await.unwrap();
        client.close().await;
        client.close().await;
    }
}
