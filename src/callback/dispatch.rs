//! Arming, firing and cleanup of callbacks.
//!
//! The simulator re-enters through [`CallbackEngine::on_native`]. While a
//! reaction runs the engine is in [`ExecutionMode::Reaction`]; any native
//! re-entry in that window is queued and drained in FIFO order once the
//! active dispatch completes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, NativeToken, ProcessToken};
use crate::error::{GpiError, GpiResult};
use crate::gpi::Gpi;
use crate::types::{CallbackReason, Edge};

use super::table::{CallbackEntry, CallbackTable, Trigger};
use super::timer::TimerCache;
use super::{CallbackId, CallbackState, Reaction, UserData};

/// Who currently owns the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Control is inside the simulator kernel.
    Simulator,
    /// A reaction is running.
    Reaction,
}

/// Counters describing callback activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStats {
    /// Callbacks currently allocated (including idle cached timers).
    pub live: usize,
    /// Idle timers in the cache.
    pub idle_timers: usize,
    /// Timer acquisitions served from the cache.
    pub timers_reused: u64,
    /// Reactions invoked.
    pub fired: u64,
    /// Native re-entries deferred to the FIFO queue.
    pub deferred: u64,
}

struct ModeGuard<'a>(&'a Cell<ExecutionMode>);

impl<'a> ModeGuard<'a> {
    fn enter(mode: &'a Cell<ExecutionMode>) -> Self {
        mode.set(ExecutionMode::Reaction);
        Self(mode)
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.0.set(ExecutionMode::Simulator);
    }
}

pub(crate) struct CallbackEngine {
    table: RefCell<CallbackTable>,
    timers: RefCell<TimerCache>,
    mode: Cell<ExecutionMode>,
    queue: RefCell<VecDeque<CallbackId>>,
    /// Recurring registrations whose destruction waits for the next top-level re-entry.
    teardown: RefCell<Vec<(NativeToken, Box<UserData>)>>,
    process: Cell<Option<ProcessToken>>,
    fired: Cell<u64>,
    deferred: Cell<u64>,
}

impl CallbackEngine {
    pub(crate) fn new(timer_capacity: usize) -> Self {
        Self {
            table: RefCell::new(CallbackTable::default()),
            timers: RefCell::new(TimerCache::new(timer_capacity)),
            mode: Cell::new(ExecutionMode::Simulator),
            queue: RefCell::new(VecDeque::new()),
            teardown: RefCell::new(Vec::new()),
            process: Cell::new(None),
            fired: Cell::new(0),
            deferred: Cell::new(0),
        }
    }

    pub(crate) fn mode(&self) -> ExecutionMode {
        self.mode.get()
    }

    pub(crate) fn state(&self, id: CallbackId) -> Option<CallbackState> {
        self.table.borrow().get(id).map(|e| e.state)
    }

    pub(crate) fn stats(&self) -> CallbackStats {
        let timers = self.timers.borrow();
        CallbackStats {
            live: self.table.borrow().len(),
            idle_timers: timers.idle(),
            timers_reused: timers.reused(),
            fired: self.fired.get(),
            deferred: self.deferred.get(),
        }
    }

    /// Allocates a callback and arms it.
    pub(crate) fn register(
        &self,
        backend: &dyn Backend,
        trigger: Trigger,
        reaction: Reaction,
    ) -> GpiResult<CallbackId> {
        let id = {
            let mut table = self.table.borrow_mut();
            match trigger {
                Trigger::Timed { delay } => {
                    self.timers.borrow_mut().acquire(&mut table, delay, reaction)
                }
                trigger => table.insert(|id| CallbackEntry::new(id, trigger, reaction, false)),
            }
        };
        if let Err(err) = self.arm(backend, id) {
            self.release(id);
            return Err(err);
        }
        Ok(id)
    }

    /// FREE -> PRIMED, or CALL -> PRIMED when a reaction re-arms itself.
    pub(crate) fn arm(&self, backend: &dyn Backend, id: CallbackId) -> GpiResult<()> {
        let (request, needs_process, user_data) = {
            let mut table = self.table.borrow_mut();
            let entry = table.get_mut(id).ok_or(GpiError::UnknownCallback { id })?;
            entry.state = entry.state.transition(CallbackState::Primed)?;
            if entry.native.is_some() {
                trace!("{id} re-armed on its live registration");
                return Ok(());
            }
            let user_data: *const UserData = &*entry.user_data;
            (
                entry.trigger.request(),
                entry.trigger.needs_process(),
                user_data,
            )
        };
        // SAFETY: the box is owned by the table entry and is only freed by
        // `release`/`flush_teardown`, neither of which a backend registration
        // call can reach.
        let user_data = unsafe { &*user_data };

        let registered = if needs_process && !backend.capabilities().per_signal_callbacks {
            self.process(backend)
                .and_then(|process| backend.sensitize(process, request, user_data))
        } else {
            backend.register_callback(request, user_data)
        };

        let mut table = self.table.borrow_mut();
        let entry = table.get_mut(id).ok_or(GpiError::UnknownCallback { id })?;
        match registered {
            Ok(token) => {
                entry.native = Some(token);
                trace!("{id} primed for {}", request.reason());
                Ok(())
            }
            Err(err) => {
                error!(
                    "failed to register {} callback with {}: {err}",
                    request.reason(),
                    backend.kind()
                );
                entry.state = entry.state.transition(CallbackState::Free)?;
                Err(err)
            }
        }
    }

    /// Re-arms a callback from inside its own reaction.
    pub(crate) fn rearm(&self, backend: &dyn Backend, id: CallbackId) -> GpiResult<()> {
        match self.state(id) {
            Some(CallbackState::Primed) => Ok(()),
            Some(_) => self.arm(backend, id),
            None => Err(GpiError::UnknownCallback { id }),
        }
    }

    /// Cancels a callback. Mid-fire or queued callbacks are tagged DELETE and
    /// torn down once their fire completes.
    pub(crate) fn deregister(&self, backend: &dyn Backend, id: CallbackId) -> GpiResult<()> {
        {
            let mut table = self.table.borrow_mut();
            let entry = table.get_mut(id).ok_or(GpiError::UnknownCallback { id })?;
            match entry.state {
                CallbackState::Call => {
                    entry.state = entry.state.transition(CallbackState::Delete)?;
                    trace!("{id} tagged DELETE mid-fire");
                    return Ok(());
                }
                CallbackState::Primed if entry.queued => {
                    entry.state = entry.state.transition(CallbackState::Delete)?;
                    trace!("{id} tagged DELETE while queued");
                    return Ok(());
                }
                CallbackState::Delete => return Ok(()),
                CallbackState::Free => return Err(GpiError::UnknownCallback { id }),
                CallbackState::Primed => {}
            }
        }
        self.finish(backend, id);
        Ok(())
    }

    /// Entry point for every native re-entry.
    ///
    /// Edge-filtered value changes read the signal here, so a queued re-entry
    /// is judged on the value that caused it.
    pub(crate) fn on_native(
        &self,
        gpi: &Gpi,
        user_data: UserData,
        reason: Option<CallbackReason>,
    ) {
        let backend = gpi.backend();
        if self.mode.get() == ExecutionMode::Simulator {
            self.flush_teardown(backend);
        }

        if !user_data.is_valid() {
            gpi.corrupted(
                reason,
                format!("user data tag {:#010x} does not match", user_data.magic),
            );
            return;
        }

        let id = user_data.id;
        let filter = {
            let mut table = self.table.borrow_mut();
            let Some(entry) = table.get_mut(id) else {
                debug!("ignoring native re-entry for retired {id}");
                return;
            };
            if entry.trigger.reason().is_one_shot() {
                entry.native = None;
            }
            match &entry.trigger {
                Trigger::ValueChange { signal, edge } if *edge != Edge::Any => {
                    Some((signal.clone(), *edge))
                }
                _ => None,
            }
        };
        let sampled = match filter {
            Some((signal, edge)) => match backend.get_binstr(signal.native()) {
                Ok(value) => Some(edge.accepts(&value)),
                Err(err) => {
                    error!("{id}: cannot read {} for edge filter: {err}", signal.fullname());
                    return;
                }
            },
            None => None,
        };
        if sampled == Some(false) {
            trace!("{id}: value change rejected by edge filter");
            return;
        }

        if self.mode.get() == ExecutionMode::Reaction {
            if let Some(entry) = self.table.borrow_mut().get_mut(id) {
                entry.queued = true;
            }
            self.queue.borrow_mut().push_back(id);
            self.deferred.set(self.deferred.get() + 1);
            trace!("{id} re-entered during a reaction; queued");
            return;
        }

        let _guard = ModeGuard::enter(&self.mode);
        self.fire(gpi, id);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(next) = next else {
                break;
            };
            let still_queued = self.queue.borrow().contains(&next);
            if let Some(entry) = self.table.borrow_mut().get_mut(next) {
                entry.queued = still_queued;
            }
            self.fire(gpi, next);
        }
    }

    fn fire(&self, gpi: &Gpi, id: CallbackId) {
        let backend = gpi.backend();
        let Some(state) = self.state(id) else {
            return;
        };

        match state {
            CallbackState::Primed => {}
            CallbackState::Delete => {
                self.finish(backend, id);
                return;
            }
            other => {
                warn!("{id} fired while {other:?}; ignoring");
                return;
            }
        }

        let mut reaction = {
            let mut table = self.table.borrow_mut();
            let Some(entry) = table.get_mut(id) else {
                return;
            };
            match entry.state.transition(CallbackState::Call) {
                Ok(state) => entry.state = state,
                Err(err) => {
                    warn!("{id}: {err}");
                    return;
                }
            }
            entry.reaction.take()
        };

        self.fired.set(self.fired.get() + 1);
        if let Some(reaction) = reaction.as_mut() {
            reaction(gpi, id);
        }

        let post = {
            let mut table = self.table.borrow_mut();
            let Some(entry) = table.get_mut(id) else {
                return;
            };
            if entry.reaction.is_none() {
                entry.reaction = reaction;
            }
            entry.state
        };
        if post == CallbackState::Primed {
            trace!("{id} re-armed by its reaction");
        } else {
            self.finish(backend, id);
        }
    }

    /// Drives a callback to FREE, removes its native registration and returns
    /// the entry to the timer cache or the table's free slots.
    fn finish(&self, backend: &dyn Backend, id: CallbackId) {
        let (native, recurring) = {
            let mut table = self.table.borrow_mut();
            let Some(entry) = table.get_mut(id) else {
                return;
            };
            if entry.state != CallbackState::Free {
                match entry.state.transition(CallbackState::Free) {
                    Ok(state) => entry.state = state,
                    Err(err) => {
                        warn!("{id}: {err}");
                        return;
                    }
                }
            }
            (
                entry.native.take(),
                !entry.trigger.reason().is_one_shot(),
            )
        };

        if let Some(token) = native {
            if recurring {
                if let Err(err) = backend.desensitize(token) {
                    error!("{id}: failed to desensitize: {err}");
                }
                if let Some(entry) = self.table.borrow_mut().remove(id) {
                    self.teardown.borrow_mut().push((token, entry.user_data));
                }
                return;
            }
            if let Err(err) = backend.remove_callback(token) {
                error!("{id}: failed to remove native callback: {err}");
            }
        }
        self.release(id);
    }

    fn release(&self, id: CallbackId) {
        let mut table = self.table.borrow_mut();
        let cached = table.get(id).is_some_and(|e| e.cached);
        if cached {
            self.timers.borrow_mut().release(&mut table, id);
        } else {
            table.remove(id);
        }
    }

    fn flush_teardown(&self, backend: &dyn Backend) {
        let pending = std::mem::take(&mut *self.teardown.borrow_mut());
        for (token, _user_data) in pending {
            if let Err(err) = backend.remove_callback(token) {
                error!("failed to destroy desensitized callback: {err}");
            }
        }
    }

    fn process(&self, backend: &dyn Backend) -> GpiResult<ProcessToken> {
        if let Some(process) = self.process.get() {
            return Ok(process);
        }
        let process = backend.create_process()?;
        debug!("created sensitivity process for {}", backend.kind());
        self.process.set(Some(process));
        Ok(process)
    }
}
