//! Single-slot, most-recent-wins handoff between two execution contexts.
//!
//! The producer never blocks on the consumer: `inject` only swaps the slot
//! contents under a lock held for that one operation. A displaced item is
//! dropped right away on the producer side, after the lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    injected: AtomicU64,
    discarded: AtomicU64,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            injected: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place `item` in the slot. Returns `true` if an unconsumed item was
    /// displaced (and destroyed).
    pub fn inject(&self, item: T) -> bool {
        let displaced = self.lock().replace(item);
        self.injected.fetch_add(1, Ordering::Relaxed);
        match displaced {
            Some(old) => {
                drop(old);
                self.discarded.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Take the pending item, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Drop the pending item, if any.
    pub fn clear(&self) -> bool {
        let pending = self.lock().take();
        pending.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Items injected since creation.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// Items replaced before the consumer got to them.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Counts its own drops.
    struct Tracked(Arc<AtomicU64>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_latest_wins() {
        let mb = Mailbox::new();
        assert!(!mb.inject("a"));
        assert!(mb.inject("b"));
        assert_eq!(mb.take(), Some("b"));
        assert_eq!(mb.take(), None);
        assert_eq!(mb.injected(), 2);
        assert_eq!(mb.discarded(), 1);
    }

    #[test]
    fn test_displaced_item_dropped_immediately() {
        let drops = Arc::new(AtomicU64::new(0));
        let mb = Mailbox::new();
        mb.inject(Tracked(drops.clone()));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        mb.inject(Tracked(drops.clone()));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(mb.clear());
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert!(mb.is_empty());
    }

    #[test]
    fn test_cross_thread_handoff() {
        let mb = Arc::new(Mailbox::new());
        let producer = {
            let mb = mb.clone();
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    mb.inject(i);
                }
            })
        };
        producer.join().unwrap();
        assert_eq!(mb.take(), Some(999));
        assert_eq!(mb.injected(), 1000);
        assert_eq!(mb.discarded(), 999);
    }
}
