use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

use crate::metrics;

/// A reusable lock-and-count: the async mutex carries the owner/waiter
/// discipline for one population episode, the holder count decides when the
/// slot may rejoin the pool. A slot with live holders must never be handed
/// to a new owner, otherwise a late waiter would block on someone else's
/// population.
#[derive(Debug)]
pub struct Slot {
    lock: Arc<AsyncMutex<()>>,
    holders: AtomicUsize,
}

impl Slot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            lock: Arc::new(AsyncMutex::new(())),
            holders: AtomicUsize::new(0),
        })
    }

    pub(crate) fn lock_handle(&self) -> Arc<AsyncMutex<()>> {
        self.lock.clone()
    }

    /// Register an additional holder (a waiter). Callers must hold the
    /// ownership-table lock so the count cannot be resurrected from zero.
    pub(crate) fn add_holder(&self) {
        self.holders.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one holder; returns true when this was the last one and the
    /// slot should be returned to the pool.
    pub(crate) fn drop_holder(&self) -> bool {
        self.holders.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// Fixed-capacity pool of free slots. This is pure admission control: it
/// bounds how many keys may be mid-population across the whole cache and
/// knows nothing about the keys themselves.
pub struct LockPool {
    free: Mutex<Vec<Arc<Slot>>>,
    permits: tokio::sync::Semaphore,
    capacity: usize,
}

impl LockPool {
    pub fn new(capacity: usize) -> Self {
        let free = (0..capacity).map(|_| Slot::new()).collect();
        metrics::set_lock_pool_free(capacity);
        Self {
            free: Mutex::new(free),
            permits: tokio::sync::Semaphore::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Check out one free slot, waiting up to `wait` for capacity. The
    /// returned slot has a single holder (the caller) and an unlocked
    /// mutex. `None` means the pool stayed exhausted for the full wait.
    pub(crate) async fn acquire(&self, wait: Duration) -> Option<Arc<Slot>> {
        let permit = match timeout(wait, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => return None,
        };
        permit.forget();
        // A forgotten permit guarantees the free list is non-empty.
        let slot = self.free.lock().pop()?;
        slot.holders.store(1, Ordering::Release);
        metrics::set_lock_pool_free(self.free_slots());
        Some(slot)
    }

    /// Return a drained slot (holder count zero) to the free set and wake
    /// one task blocked on `acquire`.
    pub(crate) fn release(&self, slot: Arc<Slot>) {
        self.free.lock().push(slot);
        self.permits.add_permits(1);
        metrics::set_lock_pool_free(self.free_slots());
    }
}

#[cfg(test)]
mod tests {
    use super::LockPool;
    use std::time::Duration;

    const SHORT_WAIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn pool_starts_full() {
        let pool = LockPool::new(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.free_slots(), 3);
    }

    #[tokio::test]
    async fn acquire_and_release_conserve_capacity() {
        let pool = LockPool::new(2);
        let first = pool.acquire(SHORT_WAIT).await.unwrap();
        let second = pool.acquire(SHORT_WAIT).await.unwrap();
        assert_eq!(pool.free_slots(), 0);

        assert!(first.drop_holder());
        pool.release(first);
        assert!(second.drop_holder());
        pool.release(second);
        assert_eq!(pool.free_slots(), 2);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = LockPool::new(1);
        let held = pool.acquire(SHORT_WAIT).await.unwrap();
        assert!(pool.acquire(SHORT_WAIT).await.is_none());

        assert!(held.drop_holder());
        pool.release(held);
        assert!(pool.acquire(SHORT_WAIT).await.is_some());
    }

    #[tokio::test]
    async fn release_wakes_a_blocked_acquirer() {
        use std::sync::Arc;

        let pool = Arc::new(LockPool::new(1));
        let held = pool.acquire(SHORT_WAIT).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(held.drop_holder());
        pool.release(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn waiters_keep_a_slot_out_of_the_pool() {
        let pool = LockPool::new(1);
        let slot = pool.acquire(SHORT_WAIT).await.unwrap();
        slot.add_holder();

        // Owner leaves; the waiter still holds the slot.
        assert!(!slot.drop_holder());
        assert_eq!(pool.free_slots(), 0);

        // Last holder returns it.
        assert!(slot.drop_holder());
        pool.release(slot);
        assert_eq!(pool.free_slots(), 1);
    }
}
