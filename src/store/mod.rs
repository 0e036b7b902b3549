//! The projects/providers store: two human-editable JSON files.
//!
//! All mutations run under one write lock, enforce the `(toolKind, name)`
//! uniqueness constraint, and rewrite the affected files atomically
//! (write-to-temp-then-rename). Reads clone a point-in-time snapshot. A
//! provider delete nulls the `providerId` of every referencing project in the
//! same locked mutation, so no dangling reference can be observed.

pub mod types;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::tool::ToolKind;

pub use types::{Project, ProjectDraft, Provider, ProviderDraft};

const PROJECTS_FILE: &str = "projects.json";
const PROVIDERS_FILE: &str = "providers.json";

#[derive(Default)]
struct Tables {
    projects: Vec<Project>,
    providers: Vec<Provider>,
}

pub struct DataStore {
    dir: PathBuf,
    inner: RwLock<Tables>,
}

impl DataStore {
    /// Open the store, loading whatever files already exist.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let projects = read_json_file(&dir.join(PROJECTS_FILE)).await?;
        let providers = read_json_file(&dir.join(PROVIDERS_FILE)).await?;

        Ok(Self {
            dir,
            inner: RwLock::new(Tables {
                projects,
                providers,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn list_projects(&self, tool: Option<ToolKind>) -> Vec<Project> {
        let tables = self.inner.read().await;
        tables
            .projects
            .iter()
            .filter(|p| tool.map_or(true, |t| p.tool_kind == t))
            .cloned()
            .collect()
    }

    pub async fn get_project(&self, id: Uuid) -> Result<Project> {
        let tables = self.inner.read().await;
        tables
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Project not found: {id}")))
    }

    pub async fn create_project(&self, draft: ProjectDraft) -> Result<Project> {
        validate_project(&draft)?;
        let mut tables = self.inner.write().await;

        if conflicts(&tables.projects, draft.tool_kind, &draft.name, None) {
            return Err(Error::Conflict(format!(
                "A {} project named `{}` already exists",
                draft.tool_kind, draft.name
            )));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            tool_kind: draft.tool_kind,
            name: draft.name,
            workspace_path: draft.workspace_path,
            provider_id: draft.provider_id,
            model: draft.model,
            created_at: now,
            updated_at: now,
            last_started_at: None,
        };
        tables.projects.push(project.clone());
        self.persist_projects(&tables).await?;
        Ok(project)
    }

    pub async fn update_project(&self, id: Uuid, draft: ProjectDraft) -> Result<Project> {
        validate_project(&draft)?;
        let mut tables = self.inner.write().await;

        if conflicts(&tables.projects, draft.tool_kind, &draft.name, Some(id)) {
            return Err(Error::Conflict(format!(
                "A {} project named `{}` already exists",
                draft.tool_kind, draft.name
            )));
        }

        let project = tables
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("Project not found: {id}")))?;

        project.tool_kind = draft.tool_kind;
        project.name = draft.name;
        project.workspace_path = draft.workspace_path;
        project.provider_id = draft.provider_id;
        project.model = draft.model;
        project.updated_at = Utc::now();
        let updated = project.clone();

        self.persist_projects(&tables).await?;
        Ok(updated)
    }

    pub async fn touch_project_started(&self, id: Uuid) -> Result<()> {
        let mut tables = self.inner.write().await;
        let project = tables
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("Project not found: {id}")))?;
        project.last_started_at = Some(Utc::now());
        self.persist_projects(&tables).await
    }

    pub async fn delete_project(&self, id: Uuid) -> Result<()> {
        let mut tables = self.inner.write().await;
        let before = tables.projects.len();
        tables.projects.retain(|p| p.id != id);
        if tables.projects.len() == before {
            return Err(Error::NotFound(format!("Project not found: {id}")));
        }
        self.persist_projects(&tables).await
    }

    // ------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------

    pub async fn list_providers(&self) -> Vec<Provider> {
        self.inner.read().await.providers.clone()
    }

    pub async fn get_provider(&self, id: Uuid) -> Result<Provider> {
        let tables = self.inner.read().await;
        tables
            .providers
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Provider not found: {id}")))
    }

    pub async fn create_provider(&self, draft: ProviderDraft) -> Result<Provider> {
        validate_provider(&draft)?;
        let mut tables = self.inner.write().await;

        let provider = Provider {
            id: Uuid::new_v4(),
            name: draft.name,
            base_url: draft.base_url,
            api_key: draft.api_key,
            request_shape: draft.request_shape,
            azure_api_version: draft.azure_api_version,
            models: draft.models,
            refreshed_at: None,
        };
        tables.providers.push(provider.clone());
        self.persist_providers(&tables).await?;
        Ok(provider)
    }

    pub async fn update_provider(&self, id: Uuid, draft: ProviderDraft) -> Result<Provider> {
        validate_provider(&draft)?;
        let mut tables = self.inner.write().await;

        let provider = tables
            .providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("Provider not found: {id}")))?;

        provider.name = draft.name;
        provider.base_url = draft.base_url;
        provider.api_key = draft.api_key;
        provider.request_shape = draft.request_shape;
        provider.azure_api_version = draft.azure_api_version;
        provider.models = draft.models;
        provider.refreshed_at = Some(Utc::now());
        let updated = provider.clone();

        self.persist_providers(&tables).await?;
        Ok(updated)
    }

    /// Delete a provider and null the weak reference on every project that
    /// points at it. Both files are rewritten in the same locked mutation.
    pub async fn delete_provider(&self, id: Uuid) -> Result<()> {
        let mut tables = self.inner.write().await;
        let before = tables.providers.len();
        tables.providers.retain(|p| p.id != id);
        if tables.providers.len() == before {
            return Err(Error::NotFound(format!("Provider not found: {id}")));
        }

        for project in tables
            .projects
            .iter_mut()
            .filter(|p| p.provider_id == Some(id))
        {
            project.provider_id = None;
            project.updated_at = Utc::now();
        }

        self.persist_providers(&tables).await?;
        self.persist_projects(&tables).await
    }

    async fn persist_projects(&self, tables: &Tables) -> Result<()> {
        write_json_file(&self.dir.join(PROJECTS_FILE), &tables.projects).await
    }

    async fn persist_providers(&self, tables: &Tables) -> Result<()> {
        write_json_file(&self.dir.join(PROVIDERS_FILE), &tables.providers).await
    }
}

fn conflicts(projects: &[Project], tool: ToolKind, name: &str, except: Option<Uuid>) -> bool {
    projects.iter().any(|p| {
        p.tool_kind == tool && p.name == name && except.map_or(true, |id| p.id != id)
    })
}

fn validate_project(draft: &ProjectDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        return Err(Error::InvalidArgument("Project name is required".into()));
    }
    if !Path::new(&draft.workspace_path).is_absolute() {
        return Err(Error::InvalidArgument(
            "workspacePath must be an absolute path".into(),
        ));
    }
    Ok(())
}

fn validate_provider(draft: &ProviderDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        return Err(Error::InvalidArgument("Provider name is required".into()));
    }
    if draft.base_url.trim().is_empty() {
        return Err(Error::InvalidArgument("Provider baseUrl is required".into()));
    }
    Ok(())
}

async fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Corrupt store file {}: {e}", path.display())))
}

/// Write-to-temp-then-rename so a crash never leaves a torn file.
async fn write_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}
