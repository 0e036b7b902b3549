//! Decoder for Claude Code transcript records.
//!
//! Transcripts live under `~/.claude/projects/<workspace-slug>/*.jsonl`. Each
//! line is a `user`/`assistant`/`summary` record; assistant records carry
//! content blocks (`text`, `thinking`, `tool_use`) and a usage object, user
//! records carry `tool_result` blocks. One line can therefore decode into
//! several semantic events: a tool_use opens a tool window that the matching
//! tool_result in a later user record closes, and a thinking block opens a
//! think window spanning the gap since the previous record (the transcript
//! only records the finished reply, so that gap is where the thinking
//! happened), closed as the reply begins.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::event::{ArchiveEvent, EventKind, TokenUsage};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    content: Value,
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    input_tokens: i64,
    cache_read_input_tokens: i64,
    cache_creation_input_tokens: i64,
    output_tokens: i64,
}

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
    let cwd = record.cwd.clone();

    let mut events = Vec::new();

    match record.record_type.as_deref() {
        Some("summary") => events.push(event_at(at, EventKind::SessionMeta, &cwd)),
        Some("user") => {
            events.push(event_at(at, EventKind::Message, &cwd));
            for block in content_blocks(&record.message) {
                if block == "tool_result" {
                    events.push(event_at(at, EventKind::FunctionResult, &cwd));
                }
            }
        }
        Some("assistant") => {
            let blocks = content_blocks(&record.message);

            // A thinking block is a finished window: it opened when the
            // previous record ended and closes as this reply begins.
            if blocks.iter().any(|b| b == "thinking") {
                events.push(event_at(
                    fallback.min(at),
                    EventKind::ReasoningStart,
                    &cwd,
                ));
                events.push(event_at(at, EventKind::ReasoningEnd, &cwd));
            }

            events.push(event_at(at, EventKind::Message, &cwd));
            for block in &blocks {
                if block == "tool_use" {
                    events.push(event_at(at, EventKind::FunctionCall, &cwd));
                }
            }
            if let Some(usage) = record.message.as_ref().and_then(|m| m.usage.as_ref()) {
                let mut event = event_at(at, EventKind::TokenCount, &cwd);
                event.usage = Some(TokenUsage {
                    // Cache reads and writes both count as cached input.
                    input_tokens: usage.input_tokens
                        + usage.cache_read_input_tokens
                        + usage.cache_creation_input_tokens,
                    cached_input_tokens: usage.cache_read_input_tokens
                        + usage.cache_creation_input_tokens,
                    output_tokens: usage.output_tokens,
                    reasoning_output_tokens: 0,
                });
                events.push(event);
            }
        }
        _ => events.push(event_at(at, EventKind::Other, &cwd)),
    }

    events
}

fn event_at(at: DateTime<Utc>, kind: EventKind, cwd: &Option<String>) -> ArchiveEvent {
    let mut event = ArchiveEvent::new(at, kind);
    event.cwd = cwd.clone();
    event
}

/// The `type` of every content block, tolerating the string-content shorthand.
fn content_blocks(message: &Option<RawMessage>) -> Vec<String> {
    let Some(message) = message else {
        return Vec::new();
    };
    let Some(blocks) = message.content.as_array() else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter_map(|b| b.get("type").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
