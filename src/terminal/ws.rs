//! The terminal WebSocket: one socket per browser tab, many sessions.
//!
//! Incoming text frames carry control messages, incoming binary frames carry
//! stdin bytes. All outgoing traffic funnels through a single writer task so
//! frames never interleave. Per-session forwarder tasks bridge PTY output
//! into the writer channel; on socket loss live sessions are parked in the
//! process-wide registry instead of being killed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::frame::{decode_binary, encode_binary, ControlFrame};
use super::registry::TerminalRegistry;
use super::session::{PtyEvent, PtySession};

const OUT_QUEUE: usize = 256;

struct Attached {
    session: Arc<PtySession>,
    forwarder: JoinHandle<()>,
}

pub async fn handle_socket(socket: WebSocket, registry: TerminalRegistry) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUT_QUEUE);

    // The single WebSocket writer.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut sessions: HashMap<String, Attached> = HashMap::new();

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ControlFrame>(&text) {
                Ok(frame) => handle_control(frame, &mut sessions, &registry, &out_tx).await,
                Err(e) => tracing::debug!(error = %e, "unparseable terminal control frame"),
            },
            Message::Binary(data) => {
                if let Some((id, payload)) = decode_binary(&data) {
                    if let Some(attached) = sessions.get(id) {
                        attached.session.input(payload.to_vec());
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Socket loss: detach, don't kill. Forwarders die with the connection.
    let parked: Vec<Arc<PtySession>> = sessions
        .drain()
        .map(|(_, attached)| {
            attached.forwarder.abort();
            attached.session
        })
        .collect();
    registry.park(parked);

    drop(out_tx);
    let _ = writer.await;
    tracing::debug!("terminal socket closed");
}

async fn handle_control(
    frame: ControlFrame,
    sessions: &mut HashMap<String, Attached>,
    registry: &TerminalRegistry,
    out_tx: &mpsc::Sender<Message>,
) {
    match frame {
        ControlFrame::Open {
            id,
            cwd,
            shell,
            cols,
            rows,
        } => {
            if sessions.contains_key(&id) {
                send_control(
                    out_tx,
                    &ControlFrame::Error {
                        id,
                        message: "session already open".to_string(),
                    },
                )
                .await;
                return;
            }

            // A detached session with this id takes precedence over a fresh
            // spawn; the forwarder will replay its buffered tail.
            let session = match registry.take(&id) {
                Some(existing) => existing,
                None => match PtySession::spawn(&id, cwd.as_deref(), shell.as_deref(), cols, rows)
                {
                    Ok(session) => session,
                    Err(e) => {
                        send_control(
                            out_tx,
                            &ControlFrame::Error {
                                id,
                                message: e.to_string(),
                            },
                        )
                        .await;
                        return;
                    }
                },
            };

            send_control(out_tx, &ControlFrame::Opened { id: id.clone() }).await;
            let forwarder = spawn_forwarder(id.clone(), session.clone(), out_tx.clone());
            sessions.insert(id, Attached { session, forwarder });
        }
        ControlFrame::Resize { id, cols, rows } => {
            if let Some(attached) = sessions.get(&id) {
                attached.session.resize(cols, rows);
            }
        }
        ControlFrame::Close { id } => {
            // The forwarder stays alive to deliver the exit frame.
            if let Some(attached) = sessions.remove(&id) {
                attached.session.kill();
            }
        }
        // Server-to-client frames arriving inbound are ignored.
        ControlFrame::Opened { .. } | ControlFrame::Exit { .. } | ControlFrame::Error { .. } => {}
    }
}

/// Bridge one session's output into the socket writer. Replays the buffered
/// tail first so re-attached clients resume where they left off.
fn spawn_forwarder(
    id: String,
    session: Arc<PtySession>,
    out_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (tail, exited, mut rx) = session.subscribe();

        if !tail.is_empty() {
            let frame = encode_binary(&id, &tail);
            if out_tx.send(Message::Binary(frame)).await.is_err() {
                return;
            }
        }
        if let Some(code) = exited {
            send_control(&out_tx, &ControlFrame::Exit { id, code }).await;
            return;
        }

        loop {
            match rx.recv().await {
                Ok(PtyEvent::Output(bytes)) => {
                    let frame = encode_binary(&id, &bytes);
                    if out_tx.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(PtyEvent::Exit(code)) => {
                    send_control(&out_tx, &ControlFrame::Exit { id, code }).await;
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "terminal output lagged; dropping window");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_control(out_tx: &mpsc::Sender<Message>, frame: &ControlFrame) {
    if let Ok(json) = serde_json::to_string(frame) {
        let _ = out_tx.send(Message::Text(json)).await;
    }
}
