//! Callback state machine and dispatcher.
//!
//! Bridges simulator-initiated re-entry (timed, value-change, phase and
//! lifecycle callbacks) to reactions supplied by the embedding.

use std::fmt;

use crate::gpi::Gpi;

mod dispatch;
mod state;
mod table;
mod timer;

pub(crate) use dispatch::CallbackEngine;
pub use dispatch::{CallbackStats, ExecutionMode};
pub use state::CallbackState;
pub(crate) use table::Trigger;

/// Sentinel stored in every [`UserData`].
pub const CALLBACK_MAGIC: u32 = 0x4750_4943;

/// Token naming one callback.
///
/// Slots are reused, so every reuse bumps the generation and stale tokens stop
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct CallbackId {
    index: u32,
    generation: u32,
}

impl CallbackId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) const fn index(self) -> u32 {
        self.index
    }

    pub(crate) const fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the token into one integer. Never zero.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpacks a token produced by [`CallbackId::to_raw`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}.{}", self.index, self.generation)
    }
}

/// Payload handed to the simulator with every native registration and
/// validated on every re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct UserData {
    /// Must equal [`CALLBACK_MAGIC`].
    pub magic: u32,
    /// Callback this registration belongs to.
    pub id: CallbackId,
}

impl UserData {
    /// Tagged payload for `id`.
    #[must_use]
    pub const fn new(id: CallbackId) -> Self {
        Self {
            magic: CALLBACK_MAGIC,
            id,
        }
    }

    /// Returns true if the sentinel is intact.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.magic == CALLBACK_MAGIC
    }
}

/// Reaction invoked when a callback fires.
///
/// A reaction may call [`Gpi::rearm`] on its own id to stay armed; otherwise the
/// callback is cleaned up once the reaction returns.
pub type Reaction = Box<dyn FnMut(&Gpi, CallbackId)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_id_raw_roundtrip() {
        let id = CallbackId::new(7, 3);
        assert_eq!(CallbackId::from_raw(id.to_raw()), id);
        assert_ne!(CallbackId::new(0, 1).to_raw(), 0);
    }

    #[test]
    fn test_user_data_tag() {
        let ud = UserData::new(CallbackId::new(1, 1));
        assert!(ud.is_valid());
        let bad = UserData { magic: 0xdead_beef, ..ud };
        assert!(!bad.is_valid());
    }
}
