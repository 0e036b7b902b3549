//! Wire frames for the terminal multiplexer.
//!
//! Control traffic travels as JSON text frames tagged by `type`. Terminal
//! bytes travel as binary frames with a one-byte id-length header:
//! `[id_len][id bytes][payload]`, in both directions. Session ids therefore
//! cap at 255 bytes of UTF-8.

use serde::{Deserialize, Serialize};

/// Control messages, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// client → server: create (or re-attach) a session.
    Open {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shell: Option<String>,
        cols: u16,
        rows: u16,
    },
    /// client → server: resize the pty.
    Resize { id: String, cols: u16, rows: u16 },
    /// client → server: kill the child and drop the session.
    Close { id: String },
    /// server → client: session is live.
    Opened { id: String },
    /// server → client: child exited.
    Exit { id: String, code: i32 },
    /// server → client: session-level failure; the socket stays alive.
    Error { id: String, message: String },
}

/// Prefix a payload with its session id.
pub fn encode_binary(id: &str, payload: &[u8]) -> Vec<u8> {
    let id_bytes = id.as_bytes();
    debug_assert!(id_bytes.len() <= u8::MAX as usize);
    let mut frame = Vec::with_capacity(1 + id_bytes.len() + payload.len());
    frame.push(id_bytes.len() as u8);
    frame.extend_from_slice(id_bytes);
    frame.extend_from_slice(payload);
    frame
}

/// Split a binary frame into `(session id, payload)`.
pub fn decode_binary(frame: &[u8]) -> Option<(&str, &[u8])> {
    let (&id_len, rest) = frame.split_first()?;
    let id_len = id_len as usize;
    if rest.len() < id_len {
        return None;
    }
    let (id_bytes, payload) = rest.split_at(id_len);
    let id = std::str::from_utf8(id_bytes).ok()?;
    Some((id, payload))
}
