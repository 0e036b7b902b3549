//! Semantic events reconstructed from archive JSONL records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The semantic kind of one archive record. Wire names differ per tool; the
/// per-tool decoders normalize into this vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionMeta,
    Message,
    FunctionCall,
    FunctionResult,
    ReasoningStart,
    ReasoningEnd,
    GenerationStart,
    GenerationEnd,
    TokenCount,
    Other,
}

/// The four token counters. Additive across snapshots, days, and sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub cached_input_tokens: i64,
    pub output_tokens: i64,
    pub reasoning_output_tokens: i64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.cached_input_tokens += other.cached_input_tokens;
        self.output_tokens += other.output_tokens;
        self.reasoning_output_tokens += other.reasoning_output_tokens;
    }

    /// Billable-ish total; cached input is a subset of input and not
    /// double-counted.
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens + self.reasoning_output_tokens
    }
}

/// One normalized archive event.
#[derive(Debug, Clone)]
pub struct ArchiveEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub usage: Option<TokenUsage>,
    pub cwd: Option<String>,
}

impl ArchiveEvent {
    pub fn new(at: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            at,
            kind,
            usage: None,
            cwd: None,
        }
    }
}

/// Per-kind record tallies for one historical session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventCounts {
    pub session_meta: u64,
    pub message: u64,
    pub function_call: u64,
    pub function_result: u64,
    pub reasoning_start: u64,
    pub reasoning_end: u64,
    pub generation_start: u64,
    pub generation_end: u64,
    pub token_count: u64,
    pub other: u64,
}

impl EventCounts {
    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::SessionMeta => self.session_meta += 1,
            EventKind::Message => self.message += 1,
            EventKind::FunctionCall => self.function_call += 1,
            EventKind::FunctionResult => self.function_result += 1,
            EventKind::ReasoningStart => self.reasoning_start += 1,
            EventKind::ReasoningEnd => self.reasoning_end += 1,
            EventKind::GenerationStart => self.generation_start += 1,
            EventKind::GenerationEnd => self.generation_end += 1,
            EventKind::TokenCount => self.token_count += 1,
            EventKind::Other => self.other += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.session_meta
            + self.message
            + self.function_call
            + self.function_result
            + self.reasoning_start
            + self.reasoning_end
            + self.generation_start
            + self.generation_end
            + self.token_count
            + self.other
    }
}
