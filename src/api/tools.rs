//! Tool status probes and installer jobs.

use std::path::Path;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::tool::ToolKind;
use crate::jobs::JobRecord;
use crate::launcher::{self, ToolSpec};
use crate::server::state::AppState;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
    pub config_path: String,
    pub config_exists: bool,
    pub node_installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    pub npm_installed: bool,
    pub platform: String,
}

pub async fn status(
    State(_state): State<AppState>,
    AxumPath(tool): AxumPath<String>,
) -> Result<Json<ToolStatus>> {
    let tool: ToolKind = tool.parse()?;

    let executable = launcher::resolve(tool.program(), None).await.ok();
    let version = match &executable {
        Some(path) => probe_version(path).await,
        None => None,
    };

    let config_path = crate::dirs::tool_config_path(tool);
    let node = launcher::resolve("node", None).await.ok();
    let node_version = match &node {
        Some(path) => probe_version(path).await,
        None => None,
    };
    let npm_installed = launcher::resolve("npm", None).await.is_ok();

    Ok(Json(ToolStatus {
        installed: executable.is_some(),
        version,
        executable_path: executable.map(|p| p.display().to_string()),
        config_exists: config_path.exists(),
        config_path: config_path.display().to_string(),
        node_installed: node.is_some(),
        node_version,
        npm_installed,
        platform: std::env::consts::OS.to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStarted {
    pub job_id: Uuid,
}

/// Install (or update) a tool CLI through npm as a background job.
pub async fn install(
    State(state): State<AppState>,
    AxumPath(tool): AxumPath<String>,
) -> Result<Json<JobStarted>> {
    let tool: ToolKind = tool.parse()?;
    let description = format!("install {}", tool.program());

    let job_id = match launcher::spawn_spec("npm", None).await {
        Ok(spec) => state.jobs.run(
            &description,
            spec.args(["install", "-g", tool.npm_package()]),
        ),
        Err(e) => state.jobs.fail_immediately(
            &description,
            format!("npm is required to install {}: {e}", tool.program()),
        ),
    };

    Ok(Json(JobStarted { job_id }))
}

/// Install Node.js where a package manager makes that possible.
pub async fn install_node(State(state): State<AppState>) -> Json<JobStarted> {
    let description = "install node";

    let job_id = if cfg!(target_os = "macos") {
        match launcher::spawn_spec("brew", None).await {
            Ok(spec) => state.jobs.run(description, spec.args(["install", "node"])),
            Err(e) => state
                .jobs
                .fail_immediately(description, format!("Homebrew not found: {e}")),
        }
    } else {
        state.jobs.fail_immediately(
            description,
            format!(
                "Automatic Node.js install is not supported on {}; install it from nodejs.org",
                std::env::consts::OS
            ),
        )
    };

    Json(JobStarted { job_id })
}

pub async fn job_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<JobRecord>> {
    state
        .jobs
        .get(id)
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("Job not found: {id}")))
}

/// `<exe> --version`, first line, bounded.
async fn probe_version(path: &Path) -> Option<String> {
    let output = tokio::time::timeout(
        VERSION_PROBE_TIMEOUT,
        ToolSpec::new(path).arg("--version").command().output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
