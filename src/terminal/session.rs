//! One PTY-backed shell session.
//!
//! Each session owns a spawned child on a PTY pair, an input queue consumed by
//! a blocking writer thread, a blocking reader thread that fans output into a
//! broadcast channel, and a bounded replay buffer holding the most recent
//! output so a re-attaching client can catch up.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex as StdMutex};

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{broadcast, mpsc};

use crate::error::{Error, Result};

/// Output kept for re-attach replay, per session.
pub const REPLAY_BYTES: usize = 64 * 1024;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum PtyEvent {
    Output(Vec<u8>),
    Exit(i32),
}

/// Replay tail and exit state; every mutation broadcasts while holding this
/// lock so `subscribe` snapshots stay consistent with the event stream.
struct Shared {
    tail: VecDeque<u8>,
    exited: Option<i32>,
}

pub struct PtySession {
    pub id: String,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    master: StdMutex<Box<dyn MasterPty + Send>>,
    killer: StdMutex<Box<dyn ChildKiller + Send + Sync>>,
    events: broadcast::Sender<PtyEvent>,
    shared: Arc<StdMutex<Shared>>,
}

impl PtySession {
    /// Spawn a shell on a fresh PTY. Failure leaves nothing behind.
    pub fn spawn(
        id: &str,
        cwd: Option<&str>,
        shell: Option<&str>,
        cols: u16,
        rows: u16,
    ) -> Result<Arc<Self>> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Transport(format!("openpty failed: {e}")))?;

        let shell = shell
            .map(str::to_string)
            .unwrap_or_else(default_shell);

        let mut cmd = CommandBuilder::new(&shell);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::Transport(format!("Failed to spawn `{shell}`: {e}")))?;
        drop(pair.slave);

        let killer = child.clone_killer();
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Transport(format!("pty writer: {e}")))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Transport(format!("pty reader: {e}")))?;

        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(StdMutex::new(Shared {
            tail: VecDeque::new(),
            exited: None,
        }));

        // Input pump: preserves byte order on the way to the child.
        std::thread::spawn(move || {
            while let Some(bytes) = input_rx.blocking_recv() {
                if writer.write_all(&bytes).is_err() || writer.flush().is_err() {
                    break;
                }
            }
        });

        // Output reader: tail buffer and broadcast stay in lockstep.
        let reader_shared = shared.clone();
        let reader_events = events.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let chunk = buf[..n].to_vec();
                        let mut shared = reader_shared.lock().unwrap();
                        shared.tail.extend(&chunk);
                        while shared.tail.len() > REPLAY_BYTES {
                            shared.tail.pop_front();
                        }
                        let _ = reader_events.send(PtyEvent::Output(chunk));
                    }
                }
            }
        });

        // Waiter: publishes the exit code exactly once.
        let waiter_shared = shared.clone();
        let waiter_events = events.clone();
        let session_id = id.to_string();
        std::thread::spawn(move || {
            let code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(_) => -1,
            };
            let mut shared = waiter_shared.lock().unwrap();
            shared.exited = Some(code);
            let _ = waiter_events.send(PtyEvent::Exit(code));
            drop(shared);
            tracing::debug!(id = %session_id, code, "pty child exited");
        });

        Ok(Arc::new(Self {
            id: id.to_string(),
            input_tx,
            master: StdMutex::new(pair.master),
            killer: StdMutex::new(killer),
            events,
            shared,
        }))
    }

    /// Queue stdin bytes. A no-op after exit.
    pub fn input(&self, bytes: Vec<u8>) {
        if self.exit_code().is_some() {
            return;
        }
        let _ = self.input_tx.send(bytes);
    }

    /// Resize the PTY. A no-op after exit.
    pub fn resize(&self, cols: u16, rows: u16) {
        if self.exit_code().is_some() {
            return;
        }
        let master = self.master.lock().unwrap();
        let _ = master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        });
    }

    pub fn kill(&self) {
        let _ = self.killer.lock().unwrap().kill();
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.shared.lock().unwrap().exited
    }

    /// Subscribe to output: returns the buffered tail, the exit code if the
    /// child is already gone, and a receiver for everything after the tail.
    pub fn subscribe(&self) -> (Vec<u8>, Option<i32>, broadcast::Receiver<PtyEvent>) {
        let shared = self.shared.lock().unwrap();
        let rx = self.events.subscribe();
        let tail: Vec<u8> = shared.tail.iter().copied().collect();
        (tail, shared.exited, rx)
    }
}

fn default_shell() -> String {
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn collect_until(
        rx: &mut broadcast::Receiver<PtyEvent>,
        needle: &str,
    ) -> (String, Option<i32>) {
        let mut out = String::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("timed out waiting for pty output");
            match event {
                Ok(PtyEvent::Output(bytes)) => {
                    out.push_str(&String::from_utf8_lossy(&bytes));
                    if out.contains(needle) {
                        return (out, None);
                    }
                }
                Ok(PtyEvent::Exit(code)) => return (out, Some(code)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return (out, None),
            }
        }
    }

    #[tokio::test]
    async fn test_spawn_echo_and_exit() {
        let session = PtySession::spawn("s1", Some("/tmp"), Some("sh"), 80, 24).unwrap();
        let (_, _, mut rx) = session.subscribe();

        session.input(b"echo terminal-ok && exit\n".to_vec());
        let (out, _) = collect_until(&mut rx, "terminal-ok").await;
        assert!(out.contains("terminal-ok"));

        // Drain to the exit event.
        let (_, code) = collect_until(&mut rx, "\u{0}never-matches\u{0}").await;
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_input_after_exit_is_noop() {
        let session = PtySession::spawn("s2", None, Some("sh"), 80, 24).unwrap();
        let (_, _, mut rx) = session.subscribe();
        session.input(b"exit 3\n".to_vec());
        let (_, code) = collect_until(&mut rx, "\u{0}never\u{0}").await;
        assert_eq!(code, Some(3));

        // Neither panics nor errors.
        session.input(b"echo ignored\n".to_vec());
        session.resize(120, 30);
        assert_eq!(session.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_kill_terminates_child() {
        let session = PtySession::spawn("s3", None, Some("sh"), 80, 24).unwrap();
        let (_, _, mut rx) = session.subscribe();
        session.kill();
        let (_, code) = collect_until(&mut rx, "\u{0}never\u{0}").await;
        assert!(code.is_some());
    }

    #[tokio::test]
    async fn test_replay_tail_after_output() {
        let session = PtySession::spawn("s4", None, Some("sh"), 80, 24).unwrap();
        let (_, _, mut rx) = session.subscribe();
        session.input(b"echo replay-me\n".to_vec());
        collect_until(&mut rx, "replay-me").await;

        // A late subscriber sees the same bytes from the tail.
        let (tail, _, _) = session.subscribe();
        assert!(String::from_utf8_lossy(&tail).contains("replay-me"));
        session.kill();
    }

    #[tokio::test]
    async fn test_resize_running_session() {
        let session = PtySession::spawn("s5", None, Some("sh"), 80, 24).unwrap();
        session.resize(120, 30);
        session.kill();
        let (_, _, mut rx) = session.subscribe();
        collect_until(&mut rx, "\u{0}never\u{0}").await;
    }
}
