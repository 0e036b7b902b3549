//! Multiplexed PTY terminals over a single WebSocket.

pub mod frame;
pub mod registry;
pub mod session;
pub mod ws;

pub use registry::TerminalRegistry;
