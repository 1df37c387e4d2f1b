//! `SessionStore` trait: the persistence contract for per-thread state.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::workflow::state::SessionState;

/// Key-value store of session state by thread id.
///
/// Last write wins. There is no locking contract: callers serialize access
/// per thread id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the state for `thread_id`, if any.
    async fn get(&self, thread_id: &str) -> Result<Option<SessionState>, DatabaseError>;

    /// Store (overwrite) the state for `thread_id`.
    async fn put(&self, thread_id: &str, state: &SessionState) -> Result<(), DatabaseError>;

    /// Remove the state for `thread_id`. Returns whether anything was removed.
    async fn delete(&self, thread_id: &str) -> Result<bool, DatabaseError>;
}
