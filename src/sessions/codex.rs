//! Decoder for Codex rollout records.
//!
//! Rollouts live under `~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl`. Each
//! line is `{timestamp, type, payload}`; the interesting payloads are
//! `session_meta`, streamed `event_msg` items, and recorded `response_item`s.
//! Anything unrecognized decodes as an `Other` event rather than failing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::event::{ArchiveEvent, EventKind, TokenUsage};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    timestamp: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    payload: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    input_tokens: i64,
    cached_input_tokens: i64,
    output_tokens: i64,
    reasoning_output_tokens: i64,
}

impl From<RawUsage> for TokenUsage {
    fn from(raw: RawUsage) -> Self {
        TokenUsage {
            input_tokens: raw.input_tokens,
            cached_input_tokens: raw.cached_input_tokens,
            output_tokens: raw.output_tokens,
            reasoning_output_tokens: raw.reasoning_output_tokens,
        }
    }
}

/// Decode one parsed JSONL line. `fallback` supplies the timestamp when the
/// record carries none (clamping keeps the timeline monotone anyway).
pub fn decode_line(value: &Value, fallback: DateTime<Utc>) -> Vec<ArchiveEvent> {
    let record: RawRecord = match serde_json::from_value(value.clone()) {
        Ok(record) => record,
        Err(_) => return vec![ArchiveEvent::new(fallback, EventKind::Other)],
    };

    let at = record
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(fallback);

    let mut event = match record.record_type.as_deref() {
        Some("session_meta") => {
            let mut event = ArchiveEvent::new(at, EventKind::SessionMeta);
            event.cwd = record
                .payload
                .get("cwd")
                .and_then(Value::as_str)
                .map(str::to_string);
            event
        }
        Some("event_msg") => decode_event_msg(&record.payload, at),
        Some("response_item") => decode_response_item(&record.payload, at),
        _ => ArchiveEvent::new(at, EventKind::Other),
    };

    // Some builds also record the workspace on turn context records.
    if event.cwd.is_none() {
        event.cwd = record
            .payload
            .get("cwd")
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    vec![event]
}

fn decode_event_msg(payload: &Value, at: DateTime<Utc>) -> ArchiveEvent {
    let kind = match payload.get("type").and_then(Value::as_str) {
        Some("user_message") => EventKind::Message,
        Some("agent_message_delta") => EventKind::GenerationStart,
        Some("agent_message") => EventKind::GenerationEnd,
        Some("agent_reasoning_delta") | Some("agent_reasoning_raw_content_delta") => {
            EventKind::ReasoningStart
        }
        Some("agent_reasoning") => EventKind::ReasoningEnd,
        Some("token_count") => EventKind::TokenCount,
        _ => EventKind::Other,
    };

    let mut event = ArchiveEvent::new(at, kind);
    if kind == EventKind::TokenCount {
        event.usage = payload
            .pointer("/info/last_token_usage")
            .or_else(|| payload.pointer("/info/total_token_usage"))
            .and_then(|u| serde_json::from_value::<RawUsage>(u.clone()).ok())
            .map(TokenUsage::from);
    }
    event
}

fn decode_response_item(payload: &Value, at: DateTime<Utc>) -> ArchiveEvent {
    let kind = match payload.get("type").and_then(Value::as_str) {
        Some("function_call") | Some("local_shell_call") | Some("custom_tool_call") => {
            EventKind::FunctionCall
        }
        Some("function_call_output") | Some("custom_tool_call_output") => {
            EventKind::FunctionResult
        }
        Some("message") => EventKind::Message,
        _ => EventKind::Other,
    };
    ArchiveEvent::new(at, kind)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
