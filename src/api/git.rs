//! Thin wrappers over the `git` CLI for the bound workspace.
//!
//! Status uses porcelain v2 so the parse is stable across git versions; the
//! mutating endpoints (stage/unstage/commit/push/pull) relay git's own
//! success or failure, with stderr carried verbatim on failure.

use std::path::Path;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RepoQuery {
    pub path: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAction {
    pub path: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

async fn run_git(repo: &str, args: &[&str]) -> Result<String> {
    let repo_path = Path::new(repo);
    if !repo_path.is_dir() {
        return Err(Error::NotFound(format!("Directory not found: {repo}")));
    }

    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::Transport(format!("Failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("git {} failed", args.first().unwrap_or(&""))
        } else {
            stderr
        };
        return Err(Error::Upstream(message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub ahead: i64,
    pub behind: i64,
    pub entries: Vec<GitEntry>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitEntry {
    pub status: String,
    pub path: String,
}

pub async fn status(
    State(_state): State<AppState>,
    Query(query): Query<RepoQuery>,
) -> Result<Json<GitStatus>> {
    let raw = run_git(&query.path, &["status", "--porcelain=v2", "--branch"]).await?;
    Ok(Json(parse_porcelain_v2(&raw)))
}

/// Parse `git status --porcelain=v2 --branch`.
fn parse_porcelain_v2(raw: &str) -> GitStatus {
    let mut status = GitStatus {
        branch: None,
        ahead: 0,
        behind: 0,
        entries: Vec::new(),
    };

    for line in raw.lines() {
        let mut fields = line.split(' ');
        match fields.next() {
            Some("#") => match fields.next() {
                Some("branch.head") => {
                    status.branch = fields.next().map(str::to_string);
                }
                Some("branch.ab") => {
                    for field in fields {
                        if let Some(ahead) = field.strip_prefix('+') {
                            status.ahead = ahead.parse().unwrap_or(0);
                        } else if let Some(behind) = field.strip_prefix('-') {
                            status.behind = behind.parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            // Ordinary and rename/copy entries: XY is the second field, the
            // path is the last (rename targets come after the tab separator).
            Some("1") | Some("2") => {
                let xy = fields.next().unwrap_or("..").to_string();
                let path = line
                    .split('\t')
                    .next()
                    .and_then(|head| head.split(' ').next_back())
                    .unwrap_or_default()
                    .to_string();
                status.entries.push(GitEntry { status: xy, path });
            }
            Some("?") => {
                if let Some(path) = line.strip_prefix("? ") {
                    status.entries.push(GitEntry {
                        status: "??".to_string(),
                        path: path.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    status
}

#[derive(Debug, Serialize)]
pub struct GitDiff {
    pub diff: String,
}

pub async fn diff(
    State(_state): State<AppState>,
    Query(query): Query<RepoQuery>,
) -> Result<Json<GitDiff>> {
    let mut args = vec!["diff"];
    if let Some(file) = &query.file {
        args.push("--");
        args.push(file);
    }
    let diff = run_git(&query.path, &args).await?;
    Ok(Json(GitDiff { diff }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommitEntry {
    pub hash: String,
    pub author: String,
    pub date: String,
    pub message: String,
}

pub async fn log(
    State(_state): State<AppState>,
    Query(query): Query<RepoQuery>,
) -> Result<Json<Vec<GitCommitEntry>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500).to_string();
    let raw = run_git(
        &query.path,
        &["log", "--pretty=format:%H%x1f%an%x1f%aI%x1f%s", "-n", &limit],
    )
    .await?;

    let entries = raw
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\u{1f}');
            Some(GitCommitEntry {
                hash: parts.next()?.to_string(),
                author: parts.next()?.to_string(),
                date: parts.next()?.to_string(),
                message: parts.next().unwrap_or_default().to_string(),
            })
        })
        .collect();
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct GitOutput {
    pub output: String,
}

pub async fn stage(
    State(_state): State<AppState>,
    Json(action): Json<RepoAction>,
) -> Result<Json<GitOutput>> {
    let file = required_file(&action)?;
    let output = run_git(&action.path, &["add", "--", &file]).await?;
    Ok(Json(GitOutput { output }))
}

pub async fn unstage(
    State(_state): State<AppState>,
    Json(action): Json<RepoAction>,
) -> Result<Json<GitOutput>> {
    let file = required_file(&action)?;
    let output = run_git(&action.path, &["restore", "--staged", "--", &file]).await?;
    Ok(Json(GitOutput { output }))
}

pub async fn commit(
    State(_state): State<AppState>,
    Json(action): Json<RepoAction>,
) -> Result<Json<GitOutput>> {
    let message = action
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| Error::InvalidArgument("commit message is required".to_string()))?;
    let output = run_git(&action.path, &["commit", "-m", message]).await?;
    Ok(Json(GitOutput { output }))
}

pub async fn push(
    State(_state): State<AppState>,
    Json(action): Json<RepoAction>,
) -> Result<Json<GitOutput>> {
    let output = run_git(&action.path, &["push"]).await?;
    Ok(Json(GitOutput { output }))
}

pub async fn pull(
    State(_state): State<AppState>,
    Json(action): Json<RepoAction>,
) -> Result<Json<GitOutput>> {
    let output = run_git(&action.path, &["pull", "--ff-only"]).await?;
    Ok(Json(GitOutput { output }))
}

fn required_file(action: &RepoAction) -> Result<String> {
    action
        .file
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidArgument("file is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_porcelain_v2() {
        let raw = "\
# branch.oid 4f2d8a9
# branch.head main
# branch.upstream origin/main
# branch.ab +2 -1
1 .M N... 100644 100644 100644 aaaa bbbb src/lib.rs
1 M. N... 100644 100644 100644 cccc dddd src/main.rs
? notes.txt
";
        let status = parse_porcelain_v2(raw);
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.ahead, 2);
        assert_eq!(status.behind, 1);
        assert_eq!(status.entries.len(), 3);
        assert_eq!(
            status.entries[0],
            GitEntry {
                status: ".M".to_string(),
                path: "src/lib.rs".to_string()
            }
        );
        assert_eq!(
            status.entries[2],
            GitEntry {
                status: "??".to_string(),
                path: "notes.txt".to_string()
            }
        );
    }

    #[test]
    fn test_parse_empty_status() {
        let status = parse_porcelain_v2("# branch.head main\n");
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert!(status.entries.is_empty());
    }
}
