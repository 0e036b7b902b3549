//! Archive scan (SSE) and token-usage aggregation endpoints.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Local;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::dirs;
use crate::error::{Error, Result};
use crate::gateway::tool::ToolKind;
use crate::server::state::AppState;
use crate::sessions::stats::{daily_usage, total_usage, DailyUsage};
use crate::sessions::TokenUsage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanQuery {
    pub tool_type: String,
}

/// Walk the tool's archive, streaming one `log` event per file and a single
/// `done` event with the scan summary.
pub async fn scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let tool: ToolKind = query.tool_type.parse()?;

    let scanner = state.scanner.clone();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let task = tokio::task::spawn_blocking(move || {
        scanner.scan_root(tool, &dirs::archive_root(tool), |path| {
            let _ = tx.send(path.display().to_string());
        })
    });

    let stream = async_stream::stream! {
        while let Some(path) = rx.recv().await {
            yield Ok(Event::default().event("log").data(path));
        }
        match task.await {
            Ok(outcome) => {
                let summary = json!({
                    "sessionCount": outcome.sessions.len(),
                    "scannedFiles": outcome.scanned_files,
                    "partial": outcome.partial,
                });
                yield Ok(Event::default().event("done").data(summary.to_string()));
            }
            Err(e) => {
                yield Ok(Event::default().event("done").data(
                    json!({ "error": e.to_string() }).to_string(),
                ));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub tool: String,
    #[serde(default)]
    pub force: Option<bool>,
    #[serde(default)]
    pub days: Option<u32>,
}

/// Aggregate token usage across the tool's whole archive.
pub async fn total(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<axum::Json<TokenUsage>> {
    let tool: ToolKind = query.tool.parse()?;
    let force = query.force.unwrap_or(false);

    let cache = state.stats.clone();
    let scanner = state.scanner.clone();
    let usage = tokio::task::spawn_blocking(move || {
        cache.total(tool, force, || {
            let outcome = scanner.scan_root(tool, &dirs::archive_root(tool), |_| {});
            total_usage(&outcome.sessions)
        })
    })
    .await
    .map_err(|e| Error::Transport(format!("usage task failed: {e}")))?;

    Ok(axum::Json(usage))
}

/// Per-local-day token usage for the trailing `days` window (default 7).
pub async fn daily(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<axum::Json<Vec<DailyUsage>>> {
    let tool: ToolKind = query.tool.parse()?;
    let force = query.force.unwrap_or(false);
    let days = query.days.unwrap_or(7).clamp(1, 90);

    let cache = state.stats.clone();
    let scanner = state.scanner.clone();
    let buckets = tokio::task::spawn_blocking(move || {
        cache.daily(tool, days, force, || {
            let outcome = scanner.scan_root(tool, &dirs::archive_root(tool), |_| {});
            daily_usage(&outcome.sessions, days, Local::now().date_naive())
        })
    })
    .await
    .map_err(|e| Error::Transport(format!("usage task failed: {e}")))?;

    Ok(axum::Json(buckets))
}
