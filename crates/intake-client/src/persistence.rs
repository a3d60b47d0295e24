//! Local storage of the in-progress snapshot.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use intake_spec::FormSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the single keyed blob holding the saved form.
pub const STATE_FILE: &str = "discovery-form-state.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("saved state at {} is unreadable: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode form state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no directory available for saved state")]
    NoStateDir,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedState {
    saved_at: jiff::Timestamp,
    values: FormSnapshot,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The saved snapshot, or `None` when nothing has been saved.
    async fn load(&self) -> Result<Option<FormSnapshot>, StoreError>;
    async fn save(&self, snapshot: &FormSnapshot) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Stores the snapshot as JSON in a directory, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<FormSnapshot>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let saved: SavedState =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        debug!(saved_at = %saved.saved_at, fields = saved.values.len(), "loaded saved form");
        Ok(Some(saved.values))
    }

    async fn save(&self, snapshot: &FormSnapshot) -> Result<(), StoreError> {
        let saved = SavedState {
            saved_at: jiff::Timestamp::now(),
            values: snapshot.clone(),
        };
        let content = serde_json::to_vec_pretty(&saved)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        debug!(path = %self.path.display(), fields = snapshot.len(), "saved form");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// In-process store; counts writes so callers can observe debouncing.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    saved: Mutex<Option<FormSnapshot>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: FormSnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<FormSnapshot> {
        self.saved.lock().ok().and_then(|saved| saved.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<FormSnapshot>, StoreError> {
        Ok(self.current())
    }

    async fn save(&self, snapshot: &FormSnapshot) -> Result<(), StoreError> {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = Some(snapshot.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = None;
        }
        Ok(())
    }
}
