//! In-memory session store.
//!
//! Deterministic and test-friendly; contents are lost with the process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{SessionBlob, SessionMetadata, SessionStore, StorageError, StorageResult};
use crate::session::SessionId;

/// Session store backed by a map.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionBlob>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("sessions lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session_id: SessionId, blob: SessionBlob) -> StorageResult<()> {
        let mut guard = self.sessions.write().map_err(poisoned)?;
        guard.insert(session_id, blob);
        Ok(())
    }

    async fn load(&self, session_id: SessionId) -> StorageResult<Option<SessionBlob>> {
        let guard = self.sessions.read().map_err(poisoned)?;
        Ok(guard.get(&session_id).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<SessionMetadata>> {
        let guard = self.sessions.read().map_err(poisoned)?;
        let mut listed: Vec<SessionMetadata> =
            guard.values().map(|blob| blob.metadata.clone()).collect();
        listed.sort_by_key(|metadata| metadata.session_id);
        Ok(listed)
    }

    async fn delete(&self, session_id: SessionId) -> StorageResult<()> {
        let mut guard = self.sessions.write().map_err(poisoned)?;
        guard.remove(&session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionParams};
    use story_rules::PhaseThresholds;

    fn blob(title: &str) -> (SessionId, SessionBlob) {
        let session = Session::new(SessionParams::new(title).with_opening("Once."));
        let blob = session.to_blob(&PhaseThresholds::default()).unwrap();
        (session.id(), blob)
    }

    #[tokio::test]
    async fn test_save_then_load_returns_same_blob() {
        let store = InMemorySessionStore::new();
        let (id, saved) = blob("First");

        store.save(id, saved.clone()).await.unwrap();

        assert_eq!(store.load(id).await.unwrap(), Some(saved));
        assert_eq!(store.load(SessionId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let store = InMemorySessionStore::new();
        let (id, mut saved) = blob("Draft");
        store.save(id, saved.clone()).await.unwrap();

        saved.metadata.title = "Final".to_string();
        store.save(id, saved).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Final");
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_session_id() {
        let store = InMemorySessionStore::new();
        for title in ["a", "b", "c", "d"] {
            let (id, saved) = blob(title);
            store.save(id, saved).await.unwrap();
        }

        let ids: Vec<SessionId> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|metadata| metadata.session_id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemorySessionStore::new();
        let (id, saved) = blob("Gone");
        store.save(id, saved).await.unwrap();

        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();

        assert!(store.load(id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}
