//! One pretty-printed JSON file per run: `<dir>/<run_id>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::{sort_newest_first, RunStore};
use crate::error::StoreError;
use crate::model::{Run, RunId, RunStatus};

const LOCK_ATTEMPTS: u32 = 100;
const LOCK_RETRY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct FileRunStore {
    dir: PathBuf,
}

impl FileRunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn run_path(&self, run_id: &RunId) -> Result<PathBuf, StoreError> {
        if !run_id.is_path_safe() {
            return Err(StoreError::Io {
                message: format!("run id is not a valid file name: {run_id}"),
            });
        }
        Ok(self.dir.join(format!("{run_id}.json")))
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("failed to create {}: {}", self.dir.display(), e),
            })
    }

    /// Take the exclusive `<id>.lock` marker next to the record.
    async fn lock_record(&self, run_id: &RunId) -> Result<RecordLock, StoreError> {
        let path = self.dir.join(format!("{run_id}.lock"));
        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(RecordLock { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => {
                    return Err(StoreError::Io {
                        message: format!("failed to lock {}: {}", path.display(), e),
                    })
                }
            }
        }
        Err(StoreError::Io {
            message: format!("run record is locked: {}", path.display()),
        })
    }

    async fn replace_if(path: &Path, run: &Run, expected: RunStatus) -> Result<bool, StoreError> {
        let current = Self::read_run(path).await?;
        if current.status() != expected {
            return Ok(false);
        }
        write_atomic(path, &serde_json::to_string_pretty(run)?).await?;
        Ok(true)
    }

    async fn read_run(path: &Path) -> Result<Run, StoreError> {
        let content = fs::read_to_string(path).await.map_err(|e| StoreError::Io {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

struct RecordLock {
    path: PathBuf,
}

impl RecordLock {
    async fn release(self) {
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove run lock");
        }
    }
}

/// Write to a unique temp file, then rename over the target.
async fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let temp_path = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));

    fs::write(&temp_path, content)
        .await
        .map_err(|e| StoreError::Io {
            message: format!("failed to write temp file: {}", e),
        })?;

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::Io {
            message: format!("failed to rename temp file: {}", e),
        });
    }

    Ok(())
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        let path = self.run_path(&run.id)?;
        self.ensure_dir().await?;
        let content = serde_json::to_string_pretty(run)?;

        // Reserve the name first so a concurrent create loses cleanly.
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists {
                    run_id: run.id.clone(),
                },
                _ => StoreError::Io {
                    message: format!("failed to create {}: {}", path.display(), e),
                },
            })?;

        write_atomic(&path, &content).await?;
        debug!(run_id = %run.id, path = %path.display(), "created run record");
        Ok(())
    }

    async fn save(&self, run: &Run) -> Result<(), StoreError> {
        let path = self.run_path(&run.id)?;
        self.ensure_dir().await?;
        let content = serde_json::to_string_pretty(run)?;
        write_atomic(&path, &content).await
    }

    async fn transition(&self, run: &Run, expected: RunStatus) -> Result<bool, StoreError> {
        let path = self.run_path(&run.id)?;
        match fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(StoreError::Io {
                    message: format!("failed to stat {}: {}", path.display(), e),
                })
            }
        }

        let lock = self.lock_record(&run.id).await?;
        let result = Self::replace_if(&path, run, expected).await;
        lock.release().await;
        result
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        if !run_id.is_path_safe() {
            return Ok(None);
        }
        let path = self.run_path(run_id)?;
        match fs::metadata(&path).await {
            Ok(_) => Self::read_run(&path).await.map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io {
                message: format!("failed to stat {}: {}", path.display(), e),
            }),
        }
    }

    async fn list(&self) -> Result<Vec<Run>, StoreError> {
        let mut runs = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(runs),
            Err(e) => {
                return Err(StoreError::Io {
                    message: format!("failed to list {}: {}", self.dir.display(), e),
                })
            }
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Io {
            message: format!("failed to list {}: {}", self.dir.display(), e),
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_run(&path).await {
                Ok(run) => runs.push(run),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable run record"),
            }
        }

        sort_newest_first(&mut runs);
        Ok(runs)
    }
}
