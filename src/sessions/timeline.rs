//! Timeline reconstruction: archive events in, contiguous activity spans out.
//!
//! A cursor marks the start of the currently open span. Activity changes close
//! the open span at the incoming event's time and move the cursor there; EOF
//! closes whatever is still open at the last event's time. Span durations
//! therefore sum exactly to the session duration. Zero-duration spans are
//! elided. Timestamps that run backward are clamped to the cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{ArchiveEvent, EventKind, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Tool,
    Think,
    Gen,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSpan {
    pub kind: SpanKind,
    pub duration_ms: i64,
    pub token_count: i64,
    pub event_count: u64,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    pub spans: Vec<TimelineSpan>,
    pub duration_ms: i64,
    pub usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub cwd: Option<String>,
}

/// What the session is doing between two events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Tool,
    Think,
    Gen,
}

impl Activity {
    fn span_kind(self) -> SpanKind {
        match self {
            Activity::Idle => SpanKind::Waiting,
            Activity::Tool => SpanKind::Tool,
            Activity::Think => SpanKind::Think,
            Activity::Gen => SpanKind::Gen,
        }
    }
}

/// Walk events in chronological order and rebuild the activity spans.
/// `events` must already be sorted (stable, so parse order breaks ties).
pub fn reconstruct(events: &[ArchiveEvent]) -> Timeline {
    let Some(first) = events.first() else {
        let now = Utc::now();
        return Timeline {
            spans: Vec::new(),
            duration_ms: 0,
            usage: TokenUsage::default(),
            started_at: now,
            ended_at: now,
            cwd: None,
        };
    };

    let started_at = first.at;
    let mut cursor = first.at;
    let mut last_time = first.at;
    let mut activity = Activity::Idle;
    let mut tool_depth = 0u32;

    let mut spans = Vec::new();
    let mut span_tokens = 0i64;
    let mut span_events = 0u64;
    let mut usage = TokenUsage::default();
    let mut cwd: Option<String> = None;

    let close_span = |spans: &mut Vec<TimelineSpan>,
                          kind: SpanKind,
                          from: DateTime<Utc>,
                          to: DateTime<Utc>,
                          tokens: i64,
                          count: u64| {
        let duration_ms = (to - from).num_milliseconds();
        if duration_ms > 0 {
            spans.push(TimelineSpan {
                kind,
                duration_ms,
                token_count: tokens,
                event_count: count,
            });
        }
    };

    for event in events {
        // Backward clock: clamp to the cursor's frontier.
        let t = event.at.max(last_time);

        // Nested and overlapping windows coalesce; the outermost activity
        // wins and inner events only feed the counters.
        let next = match event.kind {
            EventKind::FunctionCall => match activity {
                Activity::Tool => {
                    tool_depth += 1;
                    Activity::Tool
                }
                Activity::Idle => {
                    tool_depth = 1;
                    Activity::Tool
                }
                other => other,
            },
            EventKind::FunctionResult => match activity {
                Activity::Tool => {
                    tool_depth = tool_depth.saturating_sub(1);
                    if tool_depth == 0 {
                        Activity::Idle
                    } else {
                        Activity::Tool
                    }
                }
                other => other,
            },
            EventKind::ReasoningStart => match activity {
                Activity::Idle => Activity::Think,
                other => other,
            },
            EventKind::ReasoningEnd => match activity {
                Activity::Think => Activity::Idle,
                other => other,
            },
            EventKind::GenerationStart => match activity {
                Activity::Idle => Activity::Gen,
                other => other,
            },
            EventKind::GenerationEnd => match activity {
                Activity::Gen => Activity::Idle,
                other => other,
            },
            _ => activity,
        };

        if next != activity {
            close_span(
                &mut spans,
                activity.span_kind(),
                cursor,
                t,
                span_tokens,
                span_events,
            );
            cursor = t;
            span_tokens = 0;
            span_events = 0;
            activity = next;
        }

        span_events += 1;

        if event.kind == EventKind::TokenCount {
            if let Some(snapshot) = &event.usage {
                usage.add(snapshot);
                if matches!(activity, Activity::Think | Activity::Gen) {
                    span_tokens += snapshot.total();
                }
            }
        }

        if cwd.is_none() {
            cwd.clone_from(&event.cwd);
        }

        last_time = t;
    }

    close_span(
        &mut spans,
        activity.span_kind(),
        cursor,
        last_time,
        span_tokens,
        span_events,
    );

    Timeline {
        spans,
        duration_ms: (last_time - started_at).num_milliseconds(),
        usage,
        started_at,
        ended_at: last_time,
        cwd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn event(ms: i64, kind: EventKind) -> ArchiveEvent {
        ArchiveEvent::new(at(ms), kind)
    }

    #[test]
    fn test_reference_session() {
        // session-meta, tool 1000..3000, gen 3000..5000 with a usage snapshot.
        let mut meta = event(0, EventKind::SessionMeta);
        meta.cwd = Some("/w".to_string());
        let mut token = event(4000, EventKind::TokenCount);
        token.usage = Some(TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
            ..Default::default()
        });
        let events = vec![
            meta,
            event(1000, EventKind::FunctionCall),
            event(3000, EventKind::FunctionResult),
            event(3000, EventKind::GenerationStart),
            token,
            event(5000, EventKind::GenerationEnd),
        ];

        let timeline = reconstruct(&events);
        assert_eq!(timeline.duration_ms, 5000);
        assert_eq!(timeline.cwd.as_deref(), Some("/w"));
        assert_eq!(timeline.spans.len(), 3);
        assert_eq!(timeline.spans[0].kind, SpanKind::Waiting);
        assert_eq!(timeline.spans[0].duration_ms, 1000);
        assert_eq!(timeline.spans[1].kind, SpanKind::Tool);
        assert_eq!(timeline.spans[1].duration_ms, 2000);
        assert_eq!(timeline.spans[2].kind, SpanKind::Gen);
        assert_eq!(timeline.spans[2].duration_ms, 2000);
        assert_eq!(timeline.spans[2].token_count, 30);
        assert_eq!(timeline.usage.input_tokens, 10);
        assert_eq!(timeline.usage.output_tokens, 20);
    }

    #[test]
    fn test_spans_sum_to_duration() {
        let events = vec![
            event(0, EventKind::SessionMeta),
            event(500, EventKind::ReasoningStart),
            event(1700, EventKind::ReasoningEnd),
            event(1700, EventKind::FunctionCall),
            event(2200, EventKind::FunctionResult),
            event(4100, EventKind::Message),
        ];
        let timeline = reconstruct(&events);
        let sum: i64 = timeline.spans.iter().map(|s| s.duration_ms).sum();
        assert_eq!(sum, timeline.duration_ms);
    }

    #[test]
    fn test_nested_tool_calls_coalesce() {
        let events = vec![
            event(0, EventKind::FunctionCall),
            event(100, EventKind::FunctionCall),
            event(200, EventKind::FunctionResult),
            event(1000, EventKind::FunctionResult),
        ];
        let timeline = reconstruct(&events);
        assert_eq!(timeline.spans.len(), 1);
        assert_eq!(timeline.spans[0].kind, SpanKind::Tool);
        assert_eq!(timeline.spans[0].duration_ms, 1000);
    }

    #[test]
    fn test_overlapping_start_outermost_wins() {
        // A generation start inside a tool window does not switch activity.
        let events = vec![
            event(0, EventKind::FunctionCall),
            event(100, EventKind::GenerationStart),
            event(900, EventKind::FunctionResult),
            event(1000, EventKind::Message),
        ];
        let timeline = reconstruct(&events);
        assert_eq!(timeline.spans[0].kind, SpanKind::Tool);
        assert_eq!(timeline.spans[0].duration_ms, 900);
    }

    #[test]
    fn test_missing_end_closes_at_eof() {
        let events = vec![
            event(0, EventKind::SessionMeta),
            event(100, EventKind::GenerationStart),
            event(2100, EventKind::Message),
        ];
        let timeline = reconstruct(&events);
        let last = timeline.spans.last().unwrap();
        assert_eq!(last.kind, SpanKind::Gen);
        assert_eq!(last.duration_ms, 2000);
    }

    #[test]
    fn test_backward_clock_clamps() {
        let events = vec![
            event(0, EventKind::SessionMeta),
            event(2000, EventKind::FunctionCall),
            event(1000, EventKind::FunctionResult),
            event(3000, EventKind::Message),
        ];
        let timeline = reconstruct(&events);
        assert_eq!(timeline.duration_ms, 3000);
        let sum: i64 = timeline.spans.iter().map(|s| s.duration_ms).sum();
        assert_eq!(sum, 3000);
    }

    #[test]
    fn test_empty_events() {
        let timeline = reconstruct(&[]);
        assert!(timeline.spans.is_empty());
        assert_eq!(timeline.duration_ms, 0);
    }

    #[test]
    fn test_zero_duration_spans_elided() {
        let events = vec![
            event(0, EventKind::FunctionCall),
            event(0, EventKind::FunctionResult),
            event(0, EventKind::GenerationStart),
            event(0, EventKind::GenerationEnd),
        ];
        let timeline = reconstruct(&events);
        assert!(timeline.spans.is_empty());
        assert_eq!(timeline.duration_ms, 0);
    }
}
