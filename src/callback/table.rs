//! Generational slot table owning every callback entry.

use crate::backend::{NativeRequest, NativeToken};
use crate::handle::Handle;
use crate::types::{CallbackReason, Edge};

use super::{CallbackId, CallbackState, Reaction, UserData};

/// What a callback waits for.
#[derive(Debug, Clone)]
pub(crate) enum Trigger {
    Timed { delay: u64 },
    ValueChange { signal: Handle, edge: Edge },
    /// Read-only, read-write or next-time-step.
    Phase(CallbackReason),
    /// Start or end of simulation.
    Lifecycle(CallbackReason),
}

impl Trigger {
    pub(crate) fn reason(&self) -> CallbackReason {
        match self {
            Self::Timed { .. } => CallbackReason::AfterDelay,
            Self::ValueChange { .. } => CallbackReason::ValueChange,
            Self::Phase(reason) | Self::Lifecycle(reason) => *reason,
        }
    }

    pub(crate) fn request(&self) -> NativeRequest {
        match self {
            Self::Timed { delay } => NativeRequest::AfterDelay(*delay),
            Self::ValueChange { signal, .. } => NativeRequest::ValueChange(signal.native()),
            Self::Phase(CallbackReason::ReadOnly) => NativeRequest::ReadOnly,
            Self::Phase(CallbackReason::ReadWrite) => NativeRequest::ReadWrite,
            Self::Phase(_) => NativeRequest::NextTimeStep,
            Self::Lifecycle(CallbackReason::StartOfSimulation) => NativeRequest::StartOfSimulation,
            Self::Lifecycle(_) => NativeRequest::EndOfSimulation,
        }
    }

    /// Requests a backend without per-signal callbacks must synthesize.
    pub(crate) fn needs_process(&self) -> bool {
        matches!(self, Self::ValueChange { .. } | Self::Phase(_))
    }
}

pub(crate) struct CallbackEntry {
    pub trigger: Trigger,
    pub state: CallbackState,
    pub reaction: Option<Reaction>,
    /// Boxed so the address handed to the simulator survives table growth.
    pub user_data: Box<UserData>,
    pub native: Option<NativeToken>,
    /// Owned by the timer cache; kept allocated after it goes FREE.
    pub cached: bool,
    /// Sitting in the re-entrancy queue.
    pub queued: bool,
}

impl CallbackEntry {
    pub(crate) fn new(id: CallbackId, trigger: Trigger, reaction: Reaction, cached: bool) -> Self {
        Self {
            trigger,
            state: CallbackState::Free,
            reaction: Some(reaction),
            user_data: Box::new(UserData::new(id)),
            native: None,
            cached,
            queued: false,
        }
    }
}

struct Slot {
    generation: u32,
    entry: Option<CallbackEntry>,
}

#[derive(Default)]
pub(crate) struct CallbackTable {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    live: usize,
}

fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        g => g,
    }
}

impl CallbackTable {
    pub(crate) fn insert(&mut self, make: impl FnOnce(CallbackId) -> CallbackEntry) -> CallbackId {
        let index = if let Some(index) = self.vacant.pop() {
            index
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Slot {
                generation: 1,
                entry: None,
            });
            index
        };
        let slot = &mut self.slots[index as usize];
        let id = CallbackId::new(index, slot.generation);
        slot.entry = Some(make(id));
        self.live += 1;
        id
    }

    fn slot(&self, id: CallbackId) -> Option<&Slot> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
    }

    pub(crate) fn get(&self, id: CallbackId) -> Option<&CallbackEntry> {
        self.slot(id)?.entry.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: CallbackId) -> Option<&mut CallbackEntry> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?
            .entry
            .as_mut()
    }

    pub(crate) fn remove(&mut self, id: CallbackId) -> Option<CallbackEntry> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?;
        let entry = slot.entry.take()?;
        slot.generation = next_generation(slot.generation);
        self.vacant.push(id.index());
        self.live -= 1;
        Some(entry)
    }

    /// Keeps the entry allocated but invalidates every outstanding token for it.
    pub(crate) fn recycle(&mut self, id: CallbackId) -> Option<CallbackId> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?;
        slot.generation = next_generation(slot.generation);
        let fresh = CallbackId::new(id.index(), slot.generation);
        let entry = slot.entry.as_mut()?;
        *entry.user_data = UserData::new(fresh);
        Some(fresh)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: CallbackId) -> CallbackEntry {
        CallbackEntry::new(
            id,
            Trigger::Timed { delay: 1 },
            Box::new(|_, _| {}),
            false,
        )
    }

    #[test]
    fn test_stale_ids_do_not_match() {
        let mut table = CallbackTable::default();
        let a = table.insert(entry);
        assert!(table.get(a).is_some());
        assert!(table.remove(a).is_some());
        assert!(table.get(a).is_none());

        let b = table.insert(entry);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_recycle_rewrites_user_data() {
        let mut table = CallbackTable::default();
        let a = table.insert(entry);
        let b = table.recycle(a).unwrap();
        assert_ne!(a, b);
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).unwrap().user_data.id, b);
        assert_eq!(table.len(), 1);
    }
}
