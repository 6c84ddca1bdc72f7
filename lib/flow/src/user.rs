//! Read-through user cache.
//!
//! Each component that resolves users owns its own cache instance; there is
//! no process-wide singleton. Misses fall through to the backing
//! [`UserStore`] and populate the map.

use crate::error::FlowError;
use crate::permission::User;
use crate::store::UserStore;
use dashmap::DashMap;
use millrace_core::UserId;
use std::sync::Arc;

/// Concurrent read-through cache over a [`UserStore`].
pub struct UserCache<S: UserStore> {
    store: Arc<S>,
    cache: DashMap<UserId, User>,
}

impl<S: UserStore> UserCache<S> {
    /// Creates an empty cache over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Resolves a user, hitting the store on a cache miss.
    pub async fn get(&self, id: UserId) -> Result<Option<User>, FlowError> {
        if let Some(user) = self.cache.get(&id) {
            return Ok(Some(user.clone()));
        }
        tracing::warn!(user_id = %id, "user cache miss, fetching from store");
        let user = self.store.get(id).await?;
        if let Some(user) = &user {
            self.cache.insert(id, user.clone());
        }
        Ok(user)
    }

    /// Drops a cached entry. Called after user writes.
    pub fn invalidate(&self, id: UserId) {
        self.cache.remove(&id);
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
