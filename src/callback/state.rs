//! The four-state callback lifecycle.

use serde::{Deserialize, Serialize};

use crate::error::{GpiError, GpiResult};

/// Lifecycle state of a callback.
///
/// ```text
/// FREE -> PRIMED -> CALL -> PRIMED   (re-armed by its own reaction)
///                        -> FREE
/// PRIMED -> FREE                      (cancelled before firing)
/// PRIMED | CALL -> DELETE -> FREE     (cancelled while queued or mid-fire)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackState {
    /// Not registered with the simulator.
    Free,
    /// Armed and waiting for the simulator.
    Primed,
    /// Reaction is running.
    Call,
    /// Cancelled; physical teardown waits for the in-flight fire to finish.
    Delete,
}

impl CallbackState {
    /// Returns true if `self -> to` is a permitted transition.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Free, Self::Primed)
                | (Self::Primed, Self::Call | Self::Free | Self::Delete)
                | (Self::Call, Self::Primed | Self::Free | Self::Delete)
                | (Self::Delete, Self::Free)
        )
    }

    /// Performs a checked transition.
    ///
    /// # Errors
    /// `InvalidTransition` if the state machine does not allow it.
    pub fn transition(self, to: Self) -> GpiResult<Self> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(GpiError::InvalidTransition { from: self, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CallbackState::{Call, Delete, Free, Primed};
    use super::*;

    #[test]
    fn test_normal_cycle() {
        let s = Free.transition(Primed).unwrap();
        let s = s.transition(Call).unwrap();
        let s = s.transition(Primed).unwrap();
        let s = s.transition(Call).unwrap();
        assert_eq!(s.transition(Free).unwrap(), Free);
    }

    #[test]
    fn test_states_are_never_skipped() {
        assert!(Free.transition(Call).is_err());
        assert!(Free.transition(Delete).is_err());
        assert!(Delete.transition(Primed).is_err());
        assert!(Delete.transition(Call).is_err());
    }

    #[test]
    fn test_delete_only_from_primed_or_call() {
        assert!(Primed.can_transition(Delete));
        assert!(Call.can_transition(Delete));
        assert!(!Free.can_transition(Delete));
        assert_eq!(Delete.transition(Free).unwrap(), Free);
    }
}
