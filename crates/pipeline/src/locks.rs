//! Per-session serialization.
//!
//! Turns and status changes on the same session run one at a time; work on
//! different sessions never waits. Lock entries are dropped from the map
//! once nobody holds or waits on them.

use std::sync::Arc;

use dashmap::DashMap;
use rigchat_core::session::SessionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    locks: Arc<DashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &SessionId) -> SessionGuard {
        let mutex = self.locks.entry(id.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        SessionGuard {
            guard: Some(guard),
            id: id.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Sessions with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one turn or one status change.
#[derive(Debug)]
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: SessionId,
    locks: Arc<DashMap<SessionId, Arc<Mutex<()>>>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left means no holder and no waiter
        self.locks.remove_if(&self.id, |_, m| Arc::strong_count(m) == 1);
    }
}
