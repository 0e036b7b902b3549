//! Pure aggregations over scanner output, plus the short-TTL result cache
//! that absorbs repeated HTTP polls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::gateway::tool::ToolKind;

use super::event::TokenUsage;
use super::scanner::SessionSummary;

/// How long aggregate results stay fresh.
pub const AGGREGATE_TTL: Duration = Duration::from_secs(120);

/// Token usage bucketed by local calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    /// Local date, `YYYY-MM-DD`.
    pub date: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub session_count: u64,
}

/// Normalize a workspace path for comparison: separators unified, trailing
/// separator stripped, case folded on case-insensitive filesystems.
pub fn normalize_workspace(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    if cfg!(any(windows, target_os = "macos")) {
        normalized.to_lowercase()
    } else {
        normalized
    }
}

/// Sessions whose recorded workspace normalizes to the project's workspace.
pub fn sessions_for_workspace(
    sessions: &[Arc<SessionSummary>],
    workspace: &str,
) -> Vec<Arc<SessionSummary>> {
    let wanted = normalize_workspace(workspace);
    sessions
        .iter()
        .filter(|s| {
            s.cwd
                .as_deref()
                .map(|cwd| normalize_workspace(cwd) == wanted)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

pub fn total_usage(sessions: &[Arc<SessionSummary>]) -> TokenUsage {
    let mut total = TokenUsage::default();
    for session in sessions {
        total.add(&session.usage);
    }
    total
}

/// Bucket sessions by the local date of their last event. The result covers
/// `[today - (days-1), today]`; empty buckets are present with zeros.
pub fn daily_usage(
    sessions: &[Arc<SessionSummary>],
    days: u32,
    today: NaiveDate,
) -> Vec<DailyUsage> {
    let days = days.max(1);
    let mut buckets: HashMap<NaiveDate, (TokenUsage, u64)> = HashMap::new();

    for session in sessions {
        let date = session.ended_at.with_timezone(&Local).date_naive();
        let entry = buckets.entry(date).or_default();
        entry.0.add(&session.usage);
        entry.1 += 1;
    }

    (0..days)
        .rev()
        .map(|back| {
            let date = today - chrono::Days::new(back as u64);
            let (usage, session_count) = buckets.get(&date).copied().unwrap_or_default();
            DailyUsage {
                date: date.format("%Y-%m-%d").to_string(),
                usage,
                session_count,
            }
        })
        .collect()
}

/// TTL cache for the aggregate endpoints; `force` bypasses and refreshes.
pub struct StatsCache {
    ttl: Duration,
    totals: StdMutex<HashMap<ToolKind, (Instant, TokenUsage)>>,
    daily: StdMutex<HashMap<(ToolKind, u32), (Instant, Vec<DailyUsage>)>>,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(AGGREGATE_TTL)
    }
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            totals: StdMutex::new(HashMap::new()),
            daily: StdMutex::new(HashMap::new()),
        }
    }

    pub fn total(
        &self,
        tool: ToolKind,
        force: bool,
        compute: impl FnOnce() -> TokenUsage,
    ) -> TokenUsage {
        if !force {
            let totals = self.totals.lock().unwrap();
            if let Some((at, cached)) = totals.get(&tool) {
                if at.elapsed() < self.ttl {
                    return *cached;
                }
            }
        }
        let fresh = compute();
        self.totals
            .lock()
            .unwrap()
            .insert(tool, (Instant::now(), fresh));
        fresh
    }

    pub fn daily(
        &self,
        tool: ToolKind,
        days: u32,
        force: bool,
        compute: impl FnOnce() -> Vec<DailyUsage>,
    ) -> Vec<DailyUsage> {
        if !force {
            let daily = self.daily.lock().unwrap();
            if let Some((at, cached)) = daily.get(&(tool, days)) {
                if at.elapsed() < self.ttl {
                    return cached.clone();
                }
            }
        }
        let fresh = compute();
        self.daily
            .lock()
            .unwrap()
            .insert((tool, days), (Instant::now(), fresh.clone()));
        fresh
    }
}
