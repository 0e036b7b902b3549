//! In-memory registry for installer jobs.
//!
//! A job wraps one subprocess (e.g. `npm install -g @openai/codex`), captures
//! its interleaved stdout/stderr as log lines, and exposes a poll-able status.
//! Jobs do not survive a server restart.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::launcher::ToolSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub description: String,
    pub status: JobStatus,
    pub logs: Vec<String>,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<StdMutex<HashMap<Uuid, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.inner.lock().unwrap().get(&id).cloned()
    }

    /// Record a job that failed before any process could start.
    pub fn fail_immediately(&self, description: &str, message: String) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().insert(
            id,
            JobRecord {
                id,
                description: description.to_string(),
                status: JobStatus::Failed,
                logs: vec![message],
            },
        );
        id
    }

    /// Spawn the command and stream its output into the job's log. Returns
    /// the job id immediately; the job completes in the background.
    pub fn run(&self, description: &str, spec: ToolSpec) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().insert(
            id,
            JobRecord {
                id,
                description: description.to_string(),
                status: JobStatus::Running,
                logs: Vec::new(),
            },
        );

        let registry = self.clone();
        tokio::spawn(async move {
            let mut cmd = spec.command();
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    registry.append(id, format!("spawn failed: {e}"));
                    registry.finish(id, false);
                    return;
                }
            };

            let mut readers = Vec::new();
            if let Some(stdout) = child.stdout.take() {
                let registry = registry.clone();
                readers.push(tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        registry.append(id, line);
                    }
                }));
            }
            if let Some(stderr) = child.stderr.take() {
                let registry = registry.clone();
                readers.push(tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        registry.append(id, line);
                    }
                }));
            }

            let status = child.wait().await;
            for reader in readers {
                let _ = reader.await;
            }

            let ok = status.map(|s| s.success()).unwrap_or(false);
            registry.finish(id, ok);
        });

        id
    }

    fn append(&self, id: Uuid, line: String) {
        if let Some(job) = self.inner.lock().unwrap().get_mut(&id) {
            job.logs.push(line);
        }
    }

    fn finish(&self, id: Uuid, ok: bool) {
        if let Some(job) = self.inner.lock().unwrap().get_mut(&id) {
            job.status = if ok {
                JobStatus::Succeeded
            } else {
                JobStatus::Failed
            };
        }
    }
}
