//! Filesystem browsing for the workspace picker and file viewer.

use std::path::{Path, PathBuf};

use axum::extract::{Query, State};
use axum::Json;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::server::state::AppState;

/// Files larger than this are returned truncated.
const MAX_READ_BYTES: usize = 512 * 1024;
/// Directories that never contain anything worth searching.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", ".venv"];

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirListing {
    pub current_path: String,
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

pub async fn list(
    State(_state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<DirListing>> {
    let path = absolute(&query.path)?;
    if !path.is_dir() {
        return Err(Error::NotFound(format!(
            "Directory not found: {}",
            path.display()
        )));
    }

    let mut directories = Vec::new();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() {
            directories.push(name);
        } else {
            files.push(name);
        }
    }
    directories.sort();
    files.sort();

    Ok(Json(DirListing {
        current_path: path.display().to_string(),
        directories,
        files,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub content: String,
    pub truncated: bool,
    pub is_binary: bool,
    pub size_bytes: u64,
}

pub async fn read(
    State(_state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileContent>> {
    let path = absolute(&query.path)?;
    if !path.is_file() {
        return Err(Error::NotFound(format!("File not found: {}", path.display())));
    }

    let size_bytes = std::fs::metadata(&path)?.len();
    let bytes = std::fs::read(&path)?;
    let is_binary = looks_binary(&bytes);
    let truncated = bytes.len() > MAX_READ_BYTES;

    let content = if is_binary {
        String::new()
    } else {
        let slice = &bytes[..bytes.len().min(MAX_READ_BYTES)];
        String::from_utf8_lossy(slice).to_string()
    };

    Ok(Json(FileContent {
        content,
        truncated,
        is_binary,
        size_bytes,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub path: String,
    pub query: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    200
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub file: String,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub matches: Vec<SearchMatch>,
    pub total_matches: usize,
    pub truncated: bool,
}

pub async fn search(
    State(_state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResult>> {
    let root = absolute(&request.path)?;
    if !root.is_dir() {
        return Err(Error::NotFound(format!(
            "Directory not found: {}",
            root.display()
        )));
    }
    if request.query.is_empty() {
        return Err(Error::InvalidArgument("query is required".to_string()));
    }

    let pattern = if request.is_regex {
        request.query.clone()
    } else {
        regex::escape(&request.query)
    };
    let matcher = RegexBuilder::new(&pattern)
        .case_insensitive(!request.case_sensitive)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("Invalid regex: {e}")))?;
    let max_results = request.max_results.clamp(1, 5000);

    let result = tokio::task::spawn_blocking(move || {
        let mut matches = Vec::new();
        let mut total_matches = 0usize;

        let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !SKIPPED_DIRS.contains(&name))
                .unwrap_or(true)
        });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            if looks_binary(&bytes) {
                continue;
            }
            let text = String::from_utf8_lossy(&bytes);
            for (index, line) in text.lines().enumerate() {
                if matcher.is_match(line) {
                    total_matches += 1;
                    if matches.len() < max_results {
                        matches.push(SearchMatch {
                            file: entry.path().display().to_string(),
                            line: index + 1,
                            text: line.chars().take(500).collect(),
                        });
                    }
                }
            }
        }

        SearchResult {
            truncated: total_matches > matches.len(),
            total_matches,
            matches,
        }
    })
    .await
    .map_err(|e| Error::Transport(format!("search task failed: {e}")))?;

    Ok(Json(result))
}

fn absolute(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw.trim());
    if raw.trim().is_empty() || !path.is_absolute() {
        return Err(Error::InvalidArgument(
            "path must be an absolute path".to_string(),
        ));
    }
    Ok(path.to_path_buf())
}

/// NUL-byte sniff over the head of the file.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_validation() {
        assert!(absolute("/tmp").is_ok());
        assert!(absolute("relative/path").is_err());
        assert!(absolute("  ").is_err());
    }

    #[test]
    fn test_binary_sniff() {
        assert!(!looks_binary(b"plain text\nmore text"));
        assert!(looks_binary(b"PK\x03\x04\x00binary"));
    }
}
