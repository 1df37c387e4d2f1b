//! In-process session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::store::traits::SessionStore;
use crate::workflow::state::SessionState;

/// Session store backed by a `HashMap`. State is lost on drop.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, thread_id: &str) -> Result<Option<SessionState>, DatabaseError> {
        Ok(self.sessions.read().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &str, state: &SessionState) -> Result<(), DatabaseError> {
        self.sessions
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.sessions.write().await.remove(thread_id).is_some())
    }
}
