//! Archive walking and per-file parsing with a stat-based cache.
//!
//! Scans never mutate archives. A file is re-parsed only when its
//! `(mtime, size)` pair changes; otherwise the cached summary is served. A
//! missing archive root yields an empty result, and individual broken files
//! degrade to `partial` summaries instead of failing the scan.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::gateway::tool::ToolKind;

use super::event::{ArchiveEvent, EventCounts, TokenUsage};
use super::timeline::{self, TimelineSpan};
use super::{claude, codex};

/// One historical session, reconstructed from its JSONL file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub path: PathBuf,
    pub tool: ToolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub event_counts: EventCounts,
    pub usage: TokenUsage,
    pub spans: Vec<TimelineSpan>,
    /// At least one line failed to parse; spans cover the parseable prefix.
    pub partial: bool,
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub sessions: Vec<Arc<SessionSummary>>,
    /// True when any session in the result is partial.
    pub partial: bool,
    pub scanned_files: usize,
}

struct CacheEntry {
    mtime: SystemTime,
    size: u64,
    summary: Arc<SessionSummary>,
}

/// Process-wide scanner with the per-file summary cache.
#[derive(Default)]
pub struct ArchiveScanner {
    cache: StdMutex<HashMap<PathBuf, CacheEntry>>,
}

impl ArchiveScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the tool's archive under `root`, invoking `progress` once per
    /// visited file.
    pub fn scan_root(
        &self,
        tool: ToolKind,
        root: &Path,
        mut progress: impl FnMut(&Path),
    ) -> ScanOutcome {
        if !root.exists() {
            return ScanOutcome {
                sessions: Vec::new(),
                partial: false,
                scanned_files: 0,
            };
        }

        let mut sessions = Vec::new();
        let mut scanned_files = 0;

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }

            scanned_files += 1;
            progress(path);

            match self.summary_for(tool, path) {
                Some(summary) => sessions.push(summary),
                None => tracing::warn!(path = %path.display(), "unreadable session file skipped"),
            }
        }

        sessions.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        let partial = sessions.iter().any(|s| s.partial);

        ScanOutcome {
            sessions,
            partial,
            scanned_files,
        }
    }

    /// Serve from the cache when `(mtime, size)` still match; reparse
    /// otherwise. `None` only when the file cannot be stat'ed or opened.
    fn summary_for(&self, tool: ToolKind, path: &Path) -> Option<Arc<SessionSummary>> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime = meta.modified().ok()?;
        let size = meta.len();

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(path) {
                if entry.mtime == mtime && entry.size == size {
                    return Some(entry.summary.clone());
                }
            }
        }

        let summary = Arc::new(parse_file(tool, path, mtime).ok()?);
        self.cache.lock().unwrap().insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                size,
                summary: summary.clone(),
            },
        );
        Some(summary)
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn parse_file(tool: ToolKind, path: &Path, mtime: SystemTime) -> std::io::Result<SessionSummary> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let fallback_start: DateTime<Utc> = mtime.into();

    // Fallback timestamp for records that carry none, and the anchor for
    // decoders that reach back to the previous record: the latest event time
    // seen so far. The file mtime stands in only before the first event.
    let mut last_at: Option<DateTime<Utc>> = None;

    let mut events: Vec<ArchiveEvent> = Vec::new();
    let mut counts = EventCounts::default();
    let mut partial = false;

    for line in reader.lines() {
        let Ok(line) = line else {
            partial = true;
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            // Broken lines still count, and taint the whole file as partial.
            partial = true;
            counts.record(super::event::EventKind::Other);
            continue;
        };

        let fallback = last_at.unwrap_or(fallback_start);
        let decoded = match tool {
            ToolKind::Codex => codex::decode_line(&value, fallback),
            ToolKind::ClaudeCode => claude::decode_line(&value, fallback),
        };
        for event in decoded {
            counts.record(event.kind);
            last_at = Some(last_at.map_or(event.at, |seen| seen.max(event.at)));
            events.push(event);
        }
    }

    // Equal timestamps keep parse order; the sort is stable.
    events.sort_by_key(|e| e.at);
    let timeline = timeline::reconstruct(&events);

    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("session")
        .to_string();

    Ok(SessionSummary {
        id,
        path: path.to_path_buf(),
        tool,
        cwd: timeline.cwd,
        started_at: if events.is_empty() {
            fallback_start
        } else {
            timeline.started_at
        },
        ended_at: if events.is_empty() {
            fallback_start
        } else {
            timeline.ended_at
        },
        duration_ms: timeline.duration_ms,
        event_counts: counts,
        usage: timeline.usage,
        spans: timeline.spans,
        partial,
    })
}
