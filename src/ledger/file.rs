//! File-backed ledger: `<directory>/<run_id>.json`, one pretty-printed
//! document per run. Writes go to a sibling temp file first and are renamed
//! into place, so a reader never sees a partial document.

use super::{sort_runs, RunLedger};
use crate::error::{FailoverError, FailoverResult};
use crate::models::FailoverRun;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileRunLedger {
    directory: PathBuf,
}

impl FileRunLedger {
    /// Open the ledger, creating the directory if needed
    pub async fn open(directory: impl AsRef<Path>) -> FailoverResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).await.map_err(|e| {
            FailoverError::Ledger(format!(
                "cannot create ledger directory {}: {e}",
                directory.display()
            ))
        })?;
        debug!(directory = %directory.display(), "Opened file run ledger");
        Ok(Self { directory })
    }

    fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.directory.join(format!("{run_id}.json"))
    }

    fn parse_run(path: &Path, contents: &[u8]) -> FailoverResult<FailoverRun> {
        serde_json::from_slice(contents).map_err(|e| {
            FailoverError::Ledger(format!("corrupt run document {}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl RunLedger for FileRunLedger {
    async fn persist(&self, run: &FailoverRun) -> FailoverResult<()> {
        let document = serde_json::to_vec_pretty(run)?;
        let path = self.run_path(run.id);
        let temp_path = self.directory.join(format!(".{}.json.tmp", run.id));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&document).await?;
        // Durable before it becomes visible under the real name
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &path).await?;

        debug!(run_id = %run.id, status = %run.status, path = %path.display(), "Persisted run");
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> FailoverResult<FailoverRun> {
        let path = self.run_path(run_id);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FailoverError::RunNotFound(run_id))
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse_run(&path, &contents)
    }

    async fn runs_for_plan(&self, plan_key: Uuid) -> FailoverResult<Vec<FailoverRun>> {
        let mut runs = Vec::new();
        let mut entries = fs::read_dir(&self.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_run_document = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_run_document {
                continue;
            }

            let parsed = match fs::read(&path).await {
                Ok(contents) => Self::parse_run(&path, &contents),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(run) if run.plan_key == plan_key => runs.push(run),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run document"),
            }
        }

        sort_runs(&mut runs);
        Ok(runs)
    }
}
