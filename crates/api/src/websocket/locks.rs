//! Per-conversation write ordering
//!
//! Mutating operations on one conversation hold its lock from the store write
//! until the resulting broadcast has been queued, so every session observes
//! events in persistence order. Different conversations never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use salonchat_shared::ConversationId;

#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Weak<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `conversation_id`
    pub async fn acquire(&self, conversation_id: ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries whose guards are all gone are dropped lazily
            locks.retain(|_, weak| weak.strong_count() > 0);

            match locks.get(&conversation_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(conversation_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }

    /// Number of conversations with a live lock
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
