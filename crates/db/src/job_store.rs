//! File-backed store for [`Job`] and [`Storyboard`] records.
//!
//! Layout under the store root:
//!
//! ```text
//! {root}/{job_id}.json
//! {root}/storyboards/{storyboard_id}.json
//! ```
//!
//! Every write goes to a uniquely named temporary file in the destination
//! directory, is flushed, then renamed over the target. Concurrent saves of
//! different ids never share a temp file; concurrent saves of the same id
//! are last-writer-wins with no torn documents.

use std::path::{Path, PathBuf};

use clipforge_core::error::CoreError;
use clipforge_core::job::Job;
use clipforge_core::layout::STORYBOARDS_DIR;
use clipforge_core::storyboard::Storyboard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

const RECORD_EXT: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record id: {0:?}")]
    InvalidId(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(id) => CoreError::Validation(format!("invalid id: {id:?}")),
            other => CoreError::Storage(other.to_string()),
        }
    }
}

/// Durable job/storyboard persistence.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store directories if missing.
    pub async fn init(&self) -> Result<(), StoreError> {
        let dir = self.storyboards_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io { path: dir, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ---------------------------------------------------------------------
    // Jobs
    // ---------------------------------------------------------------------

    pub async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.job_path(&job.id)?;
        write_atomic(&path, job).await?;
        tracing::trace!(job_id = %job.id, progress = job.progress_percentage, "Saved job");
        Ok(())
    }

    pub async fn load(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let path = self.job_path(job_id)?;
        read_record(&path).await
    }

    /// Remove a job record. Returns whether it existed.
    pub async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        let path = self.job_path(job_id)?;
        remove_record(&path).await
    }

    /// Ids of every stored job, in no particular order.
    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut ids = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    /// Load every job. Records that fail to parse are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        for id in self.list_ids().await? {
            match self.load(&id).await {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(e) => tracing::warn!(job_id = %id, error = %e, "Skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }

    // ---------------------------------------------------------------------
    // Storyboards
    // ---------------------------------------------------------------------

    pub async fn save_storyboard(&self, storyboard: &Storyboard) -> Result<(), StoreError> {
        let path = self.storyboard_path(&storyboard.id)?;
        write_atomic(&path, storyboard).await
    }

    pub async fn load_storyboard(&self, storyboard_id: &str) -> Result<Option<Storyboard>, StoreError> {
        let path = self.storyboard_path(storyboard_id)?;
        read_record(&path).await
    }

    pub async fn delete_storyboard(&self, storyboard_id: &str) -> Result<bool, StoreError> {
        let path = self.storyboard_path(storyboard_id)?;
        remove_record(&path).await
    }

    // ---- private helpers ----

    fn storyboards_dir(&self) -> PathBuf {
        self.root.join(STORYBOARDS_DIR)
    }

    fn job_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        check_id(id)?;
        Ok(self.root.join(format!("{id}.{RECORD_EXT}")))
    }

    fn storyboard_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        check_id(id)?;
        Ok(self.storyboards_dir().join(format!("{id}.{RECORD_EXT}")))
    }
}

fn check_id(id: &str) -> Result<(), StoreError> {
    clipforge_core::layout::check_id_component(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Serialize `value` and atomically replace `path` with it.
async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let result: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(source) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_record(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
