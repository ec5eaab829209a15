//! File-backed session store: one JSON document per session.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{SessionBlob, SessionMetadata, SessionStore, StorageResult};
use crate::session::SessionId;

const EXTENSION: &str = "json";

/// Stores each session as `<dir>/<session_id>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: SessionId) -> PathBuf {
        self.dir.join(format!("{}.{}", session_id, EXTENSION))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session_id: SessionId, blob: SessionBlob) -> StorageResult<()> {
        let path = self.path_for(session_id);
        let staging = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&blob)?;

        // Readers never see a half-written session.
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &path).await?;
        debug!(session = %session_id, path = %path.display(), "session written");
        Ok(())
    }

    async fn load(&self, session_id: SessionId) -> StorageResult<Option<SessionBlob>> {
        match tokio::fs::read(self.path_for(session_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> StorageResult<Vec<SessionMetadata>> {
        let mut listed = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let blob: SessionBlob = serde_json::from_slice(&bytes)?;
            listed.push(blob.metadata);
        }
        listed.sort_by_key(|metadata| metadata.session_id);
        Ok(listed)
    }

    async fn delete(&self, session_id: SessionId) -> StorageResult<()> {
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
