//! per-pair single-flight locks.
//!
//! one async mutex per (user, server) pair, created on first use and dropped
//! again once nobody holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

use keygate_types::GrantKey;

/// map size at which idle entries are swept on acquire.
const SWEEP_THRESHOLD: usize = 64;

type PairMutex = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct Arena {
    locks: HashMap<GrantKey, PairMutex>,
    sweep_at: usize,
}

impl Arena {
    /// drop entries only the arena still references.
    ///
    /// waiters cancelled before they got the lock leave such entries behind.
    fn sweep(&mut self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.sweep_at = (self.locks.len() * 2).max(SWEEP_THRESHOLD);
    }
}

/// keyed lock arena serializing operations on the same pair.
#[derive(Default)]
pub struct PairLocks {
    arena: Mutex<Arena>,
}

impl PairLocks {
    /// create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// wait until no other operation holds `key`, then hold it until the
    /// returned guard is dropped.
    pub async fn acquire(&self, key: GrantKey) -> PairGuard<'_> {
        let lock = {
            let mut arena = self.arena();
            if arena.locks.len() >= arena.sweep_at.max(SWEEP_THRESHOLD) {
                arena.sweep();
            }
            arena.locks.entry(key).or_default().clone()
        };

        let guard = lock.lock_owned().await;
        PairGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// number of pairs with a live lock entry.
    pub fn len(&self) -> usize {
        self.arena().locks.len()
    }

    /// whether no pair currently has a lock entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// exclusive hold on one pair.
pub struct PairGuard<'a> {
    locks: &'a PairLocks,
    key: GrantKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        let mut arena = self.locks.arena();
        // release under the arena lock so no one can clone the entry between
        // the unlock and the idle check
        self.guard.take();
        if let Some(lock) = arena.locks.get(&self.key)
            && Arc::strong_count(lock) == 1
        {
            arena.locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_types::{ServerId, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(user: u64, server: u64) -> GrantKey {
        GrantKey::new(UserId(user), ServerId(server))
    }

    #[tokio::test]
    async fn test_entry_collected_after_release() {
        let locks = PairLocks::new();
        {
            let _guard = locks.acquire(key(1, 1)).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_pair_is_exclusive() {
        let locks = Arc::new(PairLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(key(1, 1)).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_pairs_do_not_block() {
        let locks = PairLocks::new();
        let _a = locks.acquire(key(1, 1)).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(key(1, 2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_swept() {
        let locks = PairLocks::new();
        let held = locks.acquire(key(1, 1)).await;

        let waited =
            tokio::time::timeout(Duration::from_millis(10), locks.acquire(key(1, 1))).await;
        assert!(waited.is_err());

        drop(held);
        assert!(locks.is_empty());

        let mut arena = locks.arena();
        arena.locks.insert(key(9, 9), PairMutex::default());
        arena.sweep();
        assert!(arena.locks.is_empty());
    }
}
