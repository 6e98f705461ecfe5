use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::domain::{ClientKey, JobId};

struct ActiveJob {
    job_id: JobId,
    cancel: CancellationToken,
}

/// Single-flight controller: at most one non-terminal job per client
/// key. Admitting a new job for a key cancels and supersedes whatever
/// job currently holds the slot.
pub struct AdmissionController {
    slots: Mutex<HashMap<ClientKey, ActiveJob>>,
    work_dir: PathBuf,
}

impl AdmissionController {
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            work_dir,
        }
    }

    /// Installs `job_id` as the client's active job and returns its
    /// cancellation token. A previously active job for the same key is
    /// cancelled first (cooperative signal, no forced termination) and
    /// its on-disk artifacts are removed opportunistically.
    pub fn admit(&self, client_key: &ClientKey, job_id: JobId) -> CancellationToken {
        let cancel = CancellationToken::new();
        let superseded = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.insert(
                client_key.clone(),
                ActiveJob {
                    job_id,
                    cancel: cancel.clone(),
                },
            )
        };

        if let Some(previous) = superseded {
            tracing::info!(
                client_key = %client_key.as_str(),
                superseded = %previous.job_id.as_uuid(),
                job_id = %job_id.as_uuid(),
                "Superseding active job for client"
            );
            previous.cancel.cancel();
            let work_dir = self.work_dir.clone();
            let prefix = previous.job_id.as_prefix();
            tokio::spawn(async move {
                remove_artifacts(&work_dir, &prefix).await;
            });
        }

        cancel
    }

    /// Frees the client's slot, but only if `job_id` still owns it.
    /// A job that has already been superseded must not evict its
    /// successor.
    pub fn release(&self, client_key: &ClientKey, job_id: JobId) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.get(client_key).map(|a| a.job_id) == Some(job_id) {
            slots.remove(client_key);
        }
    }

    pub fn active_job(&self, client_key: &ClientKey) -> Option<JobId> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(client_key).map(|a| a.job_id)
    }
}

/// Deletes every file in `work_dir` whose name starts with the job's
/// artifact prefix. Best-effort: failures are logged, never raised.
pub async fn remove_artifacts(work_dir: &Path, prefix: &str) {
    let marker = format!("{prefix}_");
    let mut entries = match tokio::fs::read_dir(work_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, dir = %work_dir.display(), "Artifact cleanup skipped");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&marker) {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(error = %e, file = name, "Failed to remove artifact");
            }
        }
    }
}
