//! Filesystem store for produced audio artifacts.
//!
//! One file per job, named `{job_id}.mp3`. The store only owns the
//! directory; which files should still exist is the engine's call.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::warn;

use crate::job::JobId;

pub(crate) const ARTIFACT_EXT: &str = "mp3";

#[derive(Debug)]
pub(crate) struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Opens the store, creating the directory if needed.
    pub(crate) fn new(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Destination path for a job's artifact.
    pub(crate) fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.{ARTIFACT_EXT}"))
    }

    /// Removes a job's artifact if present. Returns whether a file was deleted.
    pub(crate) async fn remove(&self, job_id: JobId) -> bool {
        remove_artifact_file(&self.path_for(job_id)).await
    }

    /// Number of artifacts currently on disk.
    pub(crate) async fn count(&self) -> io::Result<usize> {
        let mut count = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if has_artifact_ext(&entry.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Artifacts whose last modification lies further back than `cutoff`,
    /// paired with the job id parsed from the file stem when it is one.
    ///
    /// Files that vanish mid-scan are skipped rather than reported as errors.
    pub(crate) async fn scan_older_than(
        &self,
        cutoff: Duration,
    ) -> io::Result<Vec<(PathBuf, Option<JobId>)>> {
        let mut stale = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_artifact_ext(&path) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if age > cutoff {
                let job_id = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse().ok());
                stale.push((path, job_id));
            }
        }
        Ok(stale)
    }
}

fn has_artifact_ext(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(ARTIFACT_EXT)
}

/// Best-effort removal of a (possibly partial) artifact file.
pub(crate) async fn remove_artifact_file(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(error) if error.kind() == io::ErrorKind::NotFound => false,
        Err(error) => {
            warn!("Failed to remove artifact {}: {error}", path.display());
            false
        }
    }
}
