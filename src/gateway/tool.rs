//! Per-tool wire vocabulary.
//!
//! Codex and Claude Code speak structurally similar JSON-RPC dialects with
//! different method names and parameter shapes. Everything name-specific
//! lives here so the gateway, scanner, and HTTP surface stay tool-agnostic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Which external CLI a project or gateway instance targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "claude")]
    ClaudeCode,
}

impl ToolKind {
    /// The logical executable name handed to the process launcher.
    pub fn program(self) -> &'static str {
        match self {
            ToolKind::Codex => "codex",
            ToolKind::ClaudeCode => "claude",
        }
    }

    /// Arguments that put the CLI into its long-lived JSON-RPC server mode.
    pub fn server_args(self) -> &'static [&'static str] {
        match self {
            ToolKind::Codex => &["app-server"],
            ToolKind::ClaudeCode => &["acp"],
        }
    }

    /// The npm package installing this tool globally.
    pub fn npm_package(self) -> &'static str {
        match self {
            ToolKind::Codex => "@openai/codex",
            ToolKind::ClaudeCode => "@anthropic-ai/claude-code",
        }
    }

    pub fn initialize_method(self) -> &'static str {
        "initialize"
    }

    /// The follow-up notification after a successful `initialize`, if the
    /// dialect expects one.
    pub fn initialized_notification(self) -> Option<&'static str> {
        match self {
            ToolKind::Codex => Some("initialized"),
            ToolKind::ClaudeCode => None,
        }
    }

    pub fn initialize_params(self) -> Value {
        match self {
            ToolKind::Codex => json!({
                "clientInfo": {
                    "name": "agentdeck",
                    "title": "agentdeck",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {},
            }),
            ToolKind::ClaudeCode => json!({
                "protocolVersion": 1,
                "clientCapabilities": {},
                "clientInfo": {
                    "name": "agentdeck",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        }
    }

    pub fn thread_start_method(self) -> &'static str {
        match self {
            ToolKind::Codex => "thread/start",
            ToolKind::ClaudeCode => "session/new",
        }
    }

    /// Approval and sandbox policy are fixed at system level for a local
    /// trusted user; they are never proxied from the browser.
    pub fn thread_start_params(self, cwd: &str) -> Value {
        match self {
            ToolKind::Codex => json!({
                "cwd": cwd,
                "approvalPolicy": "never",
                "sandboxPolicy": { "type": "dangerFullAccess" },
            }),
            ToolKind::ClaudeCode => json!({
                "cwd": cwd,
                "mcpServers": [],
            }),
        }
    }

    /// Extract `(thread_id, archive_path)` from a thread-start reply.
    pub fn parse_thread_start(self, result: &Value) -> Result<(String, Option<String>)> {
        let id = match self {
            ToolKind::Codex => result
                .pointer("/thread/id")
                .or_else(|| result.get("threadId"))
                .or_else(|| result.get("id"))
                .and_then(Value::as_str),
            ToolKind::ClaudeCode => result.get("sessionId").and_then(Value::as_str),
        };
        let id = id
            .map(str::to_string)
            .ok_or_else(|| Error::Upstream("thread start reply carried no thread id".into()))?;

        let archive = result
            .pointer("/thread/path")
            .or_else(|| result.get("rolloutPath"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok((id, archive))
    }

    pub fn turn_send_method(self) -> &'static str {
        match self {
            ToolKind::Codex => "turn/start",
            ToolKind::ClaudeCode => "session/prompt",
        }
    }

    pub fn turn_send_params(self, thread_id: &str, cwd: &str, texts: &[String]) -> Value {
        let parts: Vec<Value> = texts
            .iter()
            .map(|t| json!({ "type": "text", "text": t }))
            .collect();
        match self {
            ToolKind::Codex => json!({
                "threadId": thread_id,
                "input": parts,
                "cwd": cwd,
                "approvalPolicy": "never",
                "sandboxPolicy": { "type": "dangerFullAccess" },
            }),
            ToolKind::ClaudeCode => json!({
                "sessionId": thread_id,
                "prompt": parts,
            }),
        }
    }

    /// Does this notification end the turn?
    pub fn is_terminal_notification(self, method: &str, params: &Value) -> bool {
        match self {
            ToolKind::Codex => matches!(method, "turn/completed" | "turn/failed"),
            ToolKind::ClaudeCode => {
                method == "session/update" && params.get("stopReason").is_some()
            }
        }
    }

    pub fn is_failure_notification(self, method: &str, params: &Value) -> bool {
        match self {
            ToolKind::Codex => method == "turn/failed",
            ToolKind::ClaudeCode => {
                method == "session/update"
                    && params.get("stopReason").and_then(Value::as_str) == Some("error")
            }
        }
    }

    /// The thread id a notification belongs to, when it names one.
    pub fn notification_thread_id(self, params: &Value) -> Option<&str> {
        match self {
            ToolKind::Codex => params.get("threadId").and_then(Value::as_str),
            ToolKind::ClaudeCode => params.get("sessionId").and_then(Value::as_str),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for ToolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(ToolKind::Codex),
            "claude" | "claudecode" | "claude-code" => Ok(ToolKind::ClaudeCode),
            other => Err(Error::InvalidArgument(format!("Unknown tool: {other}"))),
        }
    }
}
