//! Lifecycle event stream.
//!
//! Publishing never blocks the simulator: events go out with `try_send` and a
//! full or disconnected subscriber only bumps the dropped counter.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::types::CallbackReason;

/// Simulation lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    /// The simulator reached start of simulation.
    Started {
        /// Simulator product string.
        product: String,
        /// Simulator version string.
        version: String,
    },
    /// The simulator reached end of simulation.
    Ended {
        /// Final simulation time in precision units.
        time: u64,
    },
    /// An unrecoverable condition; the simulator has been asked to stop.
    Fatal {
        /// Reason code of the offending callback, when known.
        reason: Option<CallbackReason>,
        /// Simulator product string.
        product: String,
        /// Diagnostic.
        message: String,
    },
}

/// Fan-out of lifecycle events to every live subscriber.
#[derive(Debug)]
pub(crate) struct EventHub {
    capacity: usize,
    subscribers: RefCell<Vec<Sender<SimEvent>>>,
    dropped: AtomicU64,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RefCell::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.borrow_mut().push(tx);
        EventStream { rx }
    }

    pub(crate) fn publish(&self, event: &SimEvent) {
        self.subscribers.borrow_mut().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of a lifecycle subscription.
///
/// May be moved to another thread; the simulator side never waits on it.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<SimEvent>,
}

impl EventStream {
    /// Next event, if one is already queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<SimEvent> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SimEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Every queued event, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<SimEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_subscriber_counts_drops() {
        let hub = EventHub::new(1);
        let stream = hub.subscribe();
        hub.publish(&SimEvent::Ended { time: 1 });
        hub.publish(&SimEvent::Ended { time: 2 });
        assert_eq!(hub.dropped(), 1);
        assert_eq!(stream.drain(), vec![SimEvent::Ended { time: 1 }]);
    }

    #[test]
    fn test_dropped_stream_is_pruned() {
        let hub = EventHub::new(4);
        drop(hub.subscribe());
        hub.publish(&SimEvent::Ended { time: 0 });
        assert!(hub.subscribers.borrow().is_empty());
        assert_eq!(hub.dropped(), 0);
    }
}
