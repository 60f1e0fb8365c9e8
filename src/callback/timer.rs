//! Free-list cache of timed callbacks.
//!
//! Per-cycle timers are created and retired at a very high rate. Any cached
//! entry can serve any new delay, so the cache is a plain stack of idle slots.

use super::table::{CallbackEntry, CallbackTable, Trigger};
use super::{CallbackId, CallbackState, Reaction};

#[derive(Debug)]
pub(crate) struct TimerCache {
    free: Vec<CallbackId>,
    capacity: usize,
    reused: u64,
}

impl TimerCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            reused: 0,
        }
    }

    /// Pops an idle timer or constructs a new one. The entry comes back FREE.
    pub(crate) fn acquire(&mut self, table: &mut CallbackTable, delay: u64, reaction: Reaction) -> CallbackId {
        while let Some(id) = self.free.pop() {
            if let Some(entry) = table.get_mut(id) {
                entry.trigger = Trigger::Timed { delay };
                entry.reaction = Some(reaction);
                entry.native = None;
                entry.queued = false;
                self.reused += 1;
                return id;
            }
        }
        table.insert(|id| CallbackEntry::new(id, Trigger::Timed { delay }, reaction, true))
    }

    /// Returns a FREE timer to the cache, or drops it once the cache is full.
    pub(crate) fn release(&mut self, table: &mut CallbackTable, id: CallbackId) {
        if self.free.len() >= self.capacity {
            table.remove(id);
            return;
        }
        let Some(entry) = table.get_mut(id) else {
            return;
        };
        debug_assert_eq!(entry.state, CallbackState::Free);
        entry.reaction = None;
        if let Some(fresh) = table.recycle(id) {
            self.free.push(fresh);
        }
    }

    pub(crate) fn idle(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn reused(&self) -> u64 {
        self.reused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_then_acquire_reuses_slot() {
        let mut table = CallbackTable::default();
        let mut cache = TimerCache::new(4);

        let a = cache.acquire(&mut table, 10, Box::new(|_, _| {}));
        cache.release(&mut table, a);
        assert_eq!(cache.idle(), 1);

        let b = cache.acquire(&mut table, 20, Box::new(|_, _| {}));
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(cache.reused(), 1);
        assert!(matches!(
            table.get(b).unwrap().trigger,
            Trigger::Timed { delay: 20 }
        ));
    }

    #[test]
    fn test_capacity_bounds_idle_entries() {
        let mut table = CallbackTable::default();
        let mut cache = TimerCache::new(1);

        let a = cache.acquire(&mut table, 1, Box::new(|_, _| {}));
        let b = cache.acquire(&mut table, 1, Box::new(|_, _| {}));
        cache.release(&mut table, a);
        cache.release(&mut table, b);
        assert_eq!(cache.idle(), 1);
        assert_eq!(table.len(), 1);
    }
}
