//! Async mutexes created on demand per key.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockTable = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    table: LockTable,
}

/// Exclusive hold on one key. Dropping it releases the lock and forgets the table entry
/// once no other task is holding or waiting on it.
#[derive(Debug)]
pub struct KeyGuard {
    key: Uuid,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.table.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyedLocks {
    pub async fn lock(&self, key: Uuid) -> KeyGuard {
        let lock = Arc::clone(&self.table.entry(key).or_default());
        let guard = lock.lock_owned().await;
        KeyGuard {
            key,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
