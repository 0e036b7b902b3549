//! A2A envelope shapes for the chat surface.
//!
//! The browser POSTs a JSON-RPC request whose method is `tasks/sendSubscribe`;
//! the reply is an SSE stream of JSON-RPC envelopes wrapping
//! `result.statusUpdate` objects, terminated by one with `final: true`. The
//! child's notification payloads are carried through verbatim under `raw` so
//! no field the gateway does not recognize is lost.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::protocol::JsonRpcNotification;
use super::tool::ToolKind;

/// The POSTed JSON-RPC envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct A2aRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    pub params: A2aParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aParams {
    pub task_id: String,
    pub context_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Which CLI to drive when `cwd` is given without a project. Defaults to
    /// Codex; a project's own tool kind always wins.
    #[serde(default)]
    pub tool_kind: Option<ToolKind>,
    pub message: A2aMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub parts: Vec<A2aPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct A2aPart {
    #[serde(default)]
    pub text: Option<String>,
}

impl A2aRequest {
    pub fn validate(&self) -> Result<()> {
        if self.method != "tasks/sendSubscribe" {
            return Err(Error::InvalidArgument(format!(
                "Unsupported method: {}",
                self.method
            )));
        }
        if self.params.task_id.is_empty() || self.params.context_id.is_empty() {
            return Err(Error::InvalidArgument(
                "taskId and contextId are required".to_string(),
            ));
        }
        Ok(())
    }

    /// The turn's text parts, in order, empty parts skipped.
    pub fn texts(&self) -> Vec<String> {
        self.params
            .message
            .parts
            .iter()
            .filter_map(|p| p.text.clone())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// The agent-side message id for a task, pre-computed before the turn is sent
/// so streamed fragments can be attributed to it.
pub fn agent_message_id(task_id: &str) -> String {
    format!("msg-agent-{task_id}")
}

/// One SSE payload wrapping a status update.
pub fn status_envelope(task_id: &str, status_update: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": task_id,
        "result": { "statusUpdate": status_update },
    })
}

/// One SSE payload carrying a JSON-RPC error; the stream closes after it.
pub fn error_envelope(task_id: &str, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": task_id,
        "error": { "message": message },
    })
}

/// A status update derived from one child notification, or `None` when the
/// notification does not belong to this turn.
pub struct StatusUpdate {
    pub payload: Value,
    pub is_final: bool,
}

/// Conservative turn filter plus translation into the A2A status shape.
///
/// A notification belongs to the turn when the message id it names equals
/// the pre-computed agent id, or when it names no message id at all and
/// arrives inside the turn window (the caller subscribes before `turn/send`
/// and stops at the terminal notification; the per-session turn guard keeps
/// a thread to one in-flight turn). Naming a different thread or a foreign
/// message id excludes it. Text is pulled from the usual delta/message
/// locations; the full original params ride along under `raw`.
pub fn status_update(
    tool: ToolKind,
    notification: &JsonRpcNotification,
    task_id: &str,
    context_id: &str,
    thread_id: &str,
    agent_msg_id: &str,
) -> Option<StatusUpdate> {
    let params = notification.params.clone().unwrap_or(Value::Null);

    if let Some(named) = tool.notification_thread_id(&params) {
        if named != thread_id {
            return None;
        }
    }

    if let Some(named) = embedded_message_id(&params) {
        if named != agent_msg_id {
            return None;
        }
    }

    let is_final = tool.is_terminal_notification(&notification.method, &params);
    let failed = tool.is_failure_notification(&notification.method, &params);

    let state = if failed {
        "failed"
    } else if is_final {
        "completed"
    } else {
        "working"
    };

    let mut status = json!({ "state": state });
    if let Some(text) = extract_text(&params) {
        status["message"] = json!({
            "messageId": agent_msg_id,
            "role": "agent",
            "parts": [ { "text": text } ],
        });
    }

    let payload = json!({
        "taskId": task_id,
        "contextId": context_id,
        "status": status,
        "final": is_final,
        "raw": { "method": notification.method, "params": params },
    });

    Some(StatusUpdate { payload, is_final })
}

/// The message id a payload names, when it names one. Raw child payloads
/// usually carry none; an A2A-shaped payload does.
fn embedded_message_id(params: &Value) -> Option<&str> {
    for pointer in [
        "/messageId",
        "/message/messageId",
        "/status/message/messageId",
    ] {
        if let Some(id) = params.pointer(pointer).and_then(Value::as_str) {
            return Some(id);
        }
    }
    None
}

/// Pull streamed text out of the places the dialects put it.
fn extract_text(params: &Value) -> Option<String> {
    for pointer in [
        "/delta",
        "/text",
        "/item/text",
        "/message",
        "/update/text",
        "/content/0/text",
    ] {
        if let Some(text) = params.pointer(pointer).and_then(Value::as_str) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: Value) -> A2aRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_request_parse_and_validate() {
        let req = request(json!({
            "id": 1,
            "method": "tasks/sendSubscribe",
            "params": {
                "taskId": "t-1",
                "contextId": "ctx-1",
                "cwd": "/tmp/ws",
                "message": { "messageId": "m-1", "parts": [ { "text": "hello" } ] },
            },
        }));
        req.validate().unwrap();
        assert_eq!(req.texts(), vec!["hello"]);
    }

    #[test]
    fn test_wrong_method_rejected() {
        let req = request(json!({
            "method": "tasks/get",
            "params": {
                "taskId": "t", "contextId": "c",
                "message": { "parts": [] },
            },
        }));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_agent_message_id() {
        assert_eq!(agent_message_id("t-1"), "msg-agent-t-1");
    }

    #[test]
    fn test_status_update_carries_text_and_raw() {
        let n = JsonRpcNotification::new(
            "item/updated",
            Some(json!({ "threadId": "th-1", "delta": "hi there" })),
        );
        let update =
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").unwrap();
        assert!(!update.is_final);
        assert_eq!(
            update.payload["status"]["message"]["messageId"],
            "msg-agent-t-1"
        );
        assert_eq!(
            update.payload["status"]["message"]["parts"][0]["text"],
            "hi there"
        );
        assert_eq!(update.payload["raw"]["method"], "item/updated");
        assert_eq!(update.payload["raw"]["params"]["delta"], "hi there");
    }

    #[test]
    fn test_foreign_thread_filtered() {
        let n = JsonRpcNotification::new(
            "item/updated",
            Some(json!({ "threadId": "th-other", "delta": "x" })),
        );
        assert!(
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").is_none()
        );
    }

    #[test]
    fn test_own_message_id_passes_filter() {
        let n = JsonRpcNotification::new(
            "status/update",
            Some(json!({
                "status": { "message": { "messageId": "msg-agent-t-1" } },
                "delta": "ours",
            })),
        );
        assert!(
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").is_some()
        );
    }

    #[test]
    fn test_foreign_message_id_filtered() {
        // Same thread, but another turn's message: must not leak in.
        let n = JsonRpcNotification::new(
            "status/update",
            Some(json!({
                "threadId": "th-1",
                "messageId": "msg-agent-t-other",
                "delta": "not ours",
            })),
        );
        assert!(
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").is_none()
        );
    }

    #[test]
    fn test_unaddressed_notification_passes_filter() {
        let n = JsonRpcNotification::new("turn/started", Some(json!({})));
        assert!(
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").is_some()
        );
    }

    #[test]
    fn test_terminal_notification_is_final() {
        let n = JsonRpcNotification::new("turn/completed", Some(json!({ "threadId": "th-1" })));
        let update =
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").unwrap();
        assert!(update.is_final);
        assert_eq!(update.payload["final"], true);
        assert_eq!(update.payload["status"]["state"], "completed");
    }

    #[test]
    fn test_failed_turn_state() {
        let n = JsonRpcNotification::new("turn/failed", Some(json!({ "threadId": "th-1" })));
        let update =
            status_update(ToolKind::Codex, &n, "t-1", "ctx-1", "th-1", "msg-agent-t-1").unwrap();
        assert!(update.is_final);
        assert_eq!(update.payload["status"]["state"], "failed");
    }

    #[test]
    fn test_envelopes() {
        let env = status_envelope("t-1", json!({ "final": false }));
        assert_eq!(env["id"], "t-1");
        assert_eq!(env["result"]["statusUpdate"]["final"], false);

        let err = error_envelope("t-1", "agent process exited with code 1");
        assert!(err["error"]["message"]
            .as_str()
            .unwrap()
            .contains("exited"));
    }
}
