//! agentdeck: loopback companion server for the Codex and Claude Code CLIs.
//!
//! The server exposes an HTTP + WebSocket surface for a browser UI and owns
//! three long-lived subsystems: a JSON-RPC gateway over a `codex app-server`
//! style child process, a multiplexed PTY terminal, and a statistics engine
//! over the CLIs' on-disk session archives.

pub mod api;
pub mod config;
pub mod dirs;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod launcher;
pub mod server;
pub mod sessions;
pub mod store;
pub mod terminal;

pub use error::{Error, Result};
