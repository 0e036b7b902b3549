//! Process-wide pool of detached PTY sessions.
//!
//! While a WebSocket is attached, its sessions live in the connection's own
//! table. On socket loss the live children are parked here (socket-loss
//! policy: detach, not kill) so a reconnecting client can re-attach by
//! session id and resume from the replay tail. An explicit `close` always
//! kills and never parks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use super::session::PtySession;

#[derive(Default, Clone)]
pub struct TerminalRegistry {
    detached: Arc<StdMutex<HashMap<String, Arc<PtySession>>>>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a detached session for re-attachment. Sessions that exited while
    /// parked are still returned so the client receives the tail and the exit
    /// frame it missed.
    pub fn take(&self, id: &str) -> Option<Arc<PtySession>> {
        self.detached.lock().unwrap().remove(id)
    }

    /// Park sessions on socket loss. Already-exited sessions are dropped;
    /// there is nothing left to resume beyond what the client already saw.
    pub fn park(&self, sessions: impl IntoIterator<Item = Arc<PtySession>>) {
        let mut detached = self.detached.lock().unwrap();
        for session in sessions {
            if session.exit_code().is_none() {
                detached.insert(session.id.clone(), session);
            }
        }
    }

    pub fn detached_count(&self) -> usize {
        self.detached.lock().unwrap().len()
    }

    /// Kill every parked session. Used on shutdown.
    pub fn kill_all(&self) {
        let drained: Vec<Arc<PtySession>> = {
            let mut detached = self.detached.lock().unwrap();
            detached.drain().map(|(_, s)| s).collect()
        };
        for session in drained {
            session.kill();
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_park_and_take() {
        let registry = TerminalRegistry::new();
        let session = PtySession::spawn("t1", None, Some("sh"), 80, 24).unwrap();
        registry.park([session.clone()]);
        assert_eq!(registry.detached_count(), 1);

        let taken = registry.take("t1").expect("session parked");
        assert_eq!(taken.id, "t1");
        assert_eq!(registry.detached_count(), 0);
        assert!(registry.take("t1").is_none());
        taken.kill();
    }

    #[tokio::test]
    async fn test_exited_sessions_not_parked() {
        let registry = TerminalRegistry::new();
        let session = PtySession::spawn("t2", None, Some("sh"), 80, 24).unwrap();
        session.input(b"exit\n".to_vec());
        // Wait for the child to finish before parking.
        while session.exit_code().is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        registry.park([session]);
        assert_eq!(registry.detached_count(), 0);
    }
}
