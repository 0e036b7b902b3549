//! Archive scanning scenarios over synthetic JSONL fixtures.

use std::io::Write;
use std::path::Path;

use chrono::{Duration, Local, Utc};

use agentdeck::gateway::tool::ToolKind;
use agentdeck::sessions::stats::{daily_usage, total_usage};
use agentdeck::sessions::{ArchiveScanner, SpanKind};

/// Write the reference rollout: waiting 1s, tool 2s, gen 2s, 30 tokens.
fn write_reference_rollout(dir: &Path, base: chrono::DateTime<Utc>) {
    let ts = |offset_ms: i64| {
        (base + Duration::milliseconds(offset_ms)).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    };
    let mut file = std::fs::File::create(dir.join("rollout-ref.jsonl")).unwrap();
    writeln!(
        file,
        r#"{{"timestamp":"{}","type":"session_meta","payload":{{"cwd":"/w"}}}}"#,
        ts(0)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"timestamp":"{}","type":"response_item","payload":{{"type":"function_call"}}}}"#,
        ts(1000)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"timestamp":"{}","type":"response_item","payload":{{"type":"function_call_output"}}}}"#,
        ts(3000)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"timestamp":"{}","type":"event_msg","payload":{{"type":"agent_message_delta"}}}}"#,
        ts(3000)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"timestamp":"{}","type":"event_msg","payload":{{"type":"token_count","info":{{"last_token_usage":{{"input_tokens":10,"output_tokens":20}}}}}}}}"#,
        ts(4000)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"timestamp":"{}","type":"event_msg","payload":{{"type":"agent_message"}}}}"#,
        ts(5000)
    )
    .unwrap();
}

#[test]
fn scan_reference_archive_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now() - Duration::seconds(30);
    write_reference_rollout(dir.path(), base);

    // File B: a single parse-broken line.
    std::fs::write(dir.path().join("rollout-broken.jsonl"), "{not json]\n").unwrap();

    let scanner = ArchiveScanner::new();
    let outcome = scanner.scan_root(ToolKind::Codex, dir.path(), |_| {});

    assert_eq!(outcome.sessions.len(), 2);
    assert!(outcome.partial);

    let reference = outcome
        .sessions
        .iter()
        .find(|s| s.id == "rollout-ref")
        .unwrap();
    assert!(!reference.partial);
    assert_eq!(reference.duration_ms, 5000);
    let spans: Vec<(SpanKind, i64)> = reference
        .spans
        .iter()
        .map(|s| (s.kind, s.duration_ms))
        .collect();
    assert_eq!(
        spans,
        vec![
            (SpanKind::Waiting, 1000),
            (SpanKind::Tool, 2000),
            (SpanKind::Gen, 2000),
        ]
    );
    assert_eq!(reference.spans[2].token_count, 30);

    // Span durations sum to the session duration.
    let sum: i64 = reference.spans.iter().map(|s| s.duration_ms).sum();
    assert_eq!(sum, reference.duration_ms);

    let broken = outcome
        .sessions
        .iter()
        .find(|s| s.id == "rollout-broken")
        .unwrap();
    assert!(broken.partial);
    assert_eq!(broken.event_counts.other, 1);
    assert_eq!(broken.event_counts.total(), 1);
}

#[test]
fn daily_bucket_lands_on_local_today() {
    let dir = tempfile::tempdir().unwrap();
    // A session that ended moments ago buckets under the local today.
    write_reference_rollout(dir.path(), Utc::now() - Duration::seconds(10));

    let scanner = ArchiveScanner::new();
    let outcome = scanner.scan_root(ToolKind::Codex, dir.path(), |_| {});

    // Anchor "today" to the session's own local end date so the test is
    // immune to running across midnight.
    let today = outcome.sessions[0].ended_at.with_timezone(&Local).date_naive();
    let days = daily_usage(&outcome.sessions, 7, today);
    assert_eq!(days.len(), 7);

    let last = days.last().unwrap();
    assert_eq!(last.date, today.format("%Y-%m-%d").to_string());
    assert_eq!(last.usage.input_tokens, 10);
    assert_eq!(last.usage.output_tokens, 20);

    let earlier: i64 = days[..6].iter().map(|d| d.usage.total()).sum();
    assert_eq!(earlier, 0);
}

#[test]
fn totals_accumulate_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now() - Duration::seconds(60);
    write_reference_rollout(dir.path(), base);

    // A second copy of the same session under another file name.
    let a = std::fs::read_to_string(dir.path().join("rollout-ref.jsonl")).unwrap();
    std::fs::write(dir.path().join("rollout-copy.jsonl"), a).unwrap();

    let scanner = ArchiveScanner::new();
    let outcome = scanner.scan_root(ToolKind::Codex, dir.path(), |_| {});
    let usage = total_usage(&outcome.sessions);
    assert_eq!(usage.input_tokens, 20);
    assert_eq!(usage.output_tokens, 40);
}

#[test]
fn claude_archive_tool_windows() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now() - Duration::seconds(120);
    let ts = |offset_ms: i64| {
        (base + Duration::milliseconds(offset_ms)).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    };

    let mut file = std::fs::File::create(dir.path().join("chat.jsonl")).unwrap();
    writeln!(
        file,
        r#"{{"type":"user","timestamp":"{}","cwd":"/w/app","message":{{"role":"user","content":"run the tests"}}}}"#,
        ts(0)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"type":"assistant","timestamp":"{}","cwd":"/w/app","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"tu_1","name":"Bash"}}],"usage":{{"input_tokens":100,"output_tokens":40}}}}}}"#,
        ts(1000)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"type":"user","timestamp":"{}","cwd":"/w/app","message":{{"role":"user","content":[{{"type":"tool_result","tool_use_id":"tu_1"}}]}}}}"#,
        ts(4000)
    )
    .unwrap();

    let scanner = ArchiveScanner::new();
    let outcome = scanner.scan_root(ToolKind::ClaudeCode, dir.path(), |_| {});
    assert_eq!(outcome.sessions.len(), 1);

    let session = &outcome.sessions[0];
    assert_eq!(session.cwd.as_deref(), Some("/w/app"));
    assert_eq!(session.event_counts.function_call, 1);
    assert_eq!(session.event_counts.function_result, 1);
    assert_eq!(session.usage.input_tokens, 100);
    assert_eq!(session.usage.output_tokens, 40);

    // The tool window spans tool_use (1s) to tool_result (4s).
    let tool_span = session
        .spans
        .iter()
        .find(|s| s.kind == SpanKind::Tool)
        .expect("tool span");
    assert_eq!(tool_span.duration_ms, 3000);
}

#[test]
fn claude_archive_thinking_windows() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now() - Duration::seconds(120);
    let ts = |offset_ms: i64| {
        (base + Duration::milliseconds(offset_ms)).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    };

    // A user prompt, then an assistant reply whose thinking filled the gap.
    let mut file = std::fs::File::create(dir.path().join("chat.jsonl")).unwrap();
    writeln!(
        file,
        r#"{{"type":"user","timestamp":"{}","cwd":"/w/app","message":{{"role":"user","content":"why is it slow"}}}}"#,
        ts(0)
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"type":"assistant","timestamp":"{}","cwd":"/w/app","message":{{"role":"assistant","content":[{{"type":"thinking","thinking":"profiling first"}},{{"type":"text","text":"It is the N+1 query."}}],"usage":{{"input_tokens":60,"output_tokens":25}}}}}}"#,
        ts(2000)
    )
    .unwrap();

    let scanner = ArchiveScanner::new();
    let outcome = scanner.scan_root(ToolKind::ClaudeCode, dir.path(), |_| {});
    assert_eq!(outcome.sessions.len(), 1);

    let session = &outcome.sessions[0];
    assert_eq!(session.event_counts.reasoning_start, 1);
    assert_eq!(session.event_counts.reasoning_end, 1);
    assert_eq!(session.duration_ms, 2000);

    // The gap between prompt and reply is a think span, not waiting.
    let think_span = session
        .spans
        .iter()
        .find(|s| s.kind == SpanKind::Think)
        .expect("think span");
    assert_eq!(think_span.duration_ms, 2000);
    assert!(session.spans.iter().all(|s| s.kind != SpanKind::Waiting));
}
