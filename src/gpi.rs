//! The upward API: one object tying handles, values, iteration and callbacks
//! to the active backend.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, error, info, trace};

use crate::backend::{Backend, SimulatorInfo};
use crate::callback::{
    CallbackEngine, CallbackId, CallbackState, CallbackStats, ExecutionMode, Reaction, Trigger,
    UserData,
};
use crate::config::GpiConfig;
use crate::error::{GpiError, GpiResult};
use crate::events::{EventHub, EventStream, SimEvent};
use crate::handle::{Handle, ObjHandle};
use crate::hierarchy::{parse_indexed, resolve_by_index, resolve_by_name, resolve_root};
use crate::iterator::{Children, GpiIterator, IterSelector};
use crate::logging;
use crate::types::{split_time, CallbackReason, Edge, ObjectType, SetAction};
use crate::value::{check_read, check_write, Accessor, SignalValue};

/// Generic procedural interface over one backend.
///
/// Single-threaded: the simulator re-enters through
/// [`Gpi::on_native_callback`] while calls into the backend may still be on
/// the stack, so no internal borrow is held across a backend call or a
/// reaction.
pub struct Gpi {
    backend: Box<dyn Backend>,
    config: GpiConfig,
    callbacks: CallbackEngine,
    events: EventHub,
    handles: RefCell<HashMap<String, Weak<ObjHandle>>>,
}

impl Gpi {
    /// Wraps a backend. Lifecycle events are not published until
    /// [`Gpi::attach_lifecycle`] has run; [`crate::registry::install`] does both.
    #[must_use]
    pub fn new(backend: Box<dyn Backend>, config: GpiConfig) -> Self {
        let callbacks = CallbackEngine::new(config.timer_cache_capacity);
        let events = EventHub::new(config.event_capacity);
        Self {
            backend,
            config,
            callbacks,
            events,
            handles: RefCell::new(HashMap::new()),
        }
    }

    /// Registers the internal start- and end-of-simulation hooks that feed the
    /// lifecycle stream.
    ///
    /// # Errors
    /// `Native` if the backend cannot register lifecycle callbacks.
    pub fn attach_lifecycle(&self) -> GpiResult<()> {
        self.register(
            Trigger::Lifecycle(CallbackReason::StartOfSimulation),
            Box::new(|gpi, _| {
                let SimulatorInfo { product, version } = gpi.product();
                info!("running on {product} version {version}");
                gpi.events.publish(&SimEvent::Started { product, version });
            }),
        )?;
        self.register(
            Trigger::Lifecycle(CallbackReason::EndOfSimulation),
            Box::new(|gpi, _| {
                let time = gpi.sim_time();
                info!("simulation ended at {time}");
                gpi.events.publish(&SimEvent::Ended { time });
            }),
        )?;
        Ok(())
    }

    /// The active backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Configuration this layer was started with.
    #[must_use]
    pub const fn config(&self) -> &GpiConfig {
        &self.config
    }

    /// Simulator product and version.
    #[must_use]
    pub fn product(&self) -> SimulatorInfo {
        self.backend.product()
    }

    // ---- handles ----

    /// Returns the cached handle for the same object, or caches this one.
    pub(crate) fn intern(&self, handle: ObjHandle) -> Handle {
        let mut cache = self.handles.borrow_mut();
        if let Some(existing) = cache.get(handle.fullname()).and_then(Weak::upgrade) {
            if existing.native() == handle.native() && existing.object_type() == handle.object_type() {
                return existing;
            }
        }
        let handle = Rc::new(handle);
        cache.insert(handle.fullname().to_string(), Rc::downgrade(&handle));
        if cache.len() > 1024 && cache.len().is_power_of_two() {
            cache.retain(|_, weak| weak.strong_count() > 0);
        }
        handle
    }

    /// Top-level object, the first one if `name` is `None`.
    #[must_use]
    pub fn get_root(&self, name: Option<&str>) -> Option<Handle> {
        resolve_root(self.backend(), name).map(|h| self.intern(h))
    }

    /// Direct child of `parent` by short name.
    ///
    /// Naming a generate loop without an index yields a GENARRAY pseudo-region.
    #[must_use]
    pub fn get_child_by_name(&self, parent: &Handle, name: &str) -> Option<Handle> {
        let found = resolve_by_name(self.backend(), parent, name).map(|h| self.intern(h));
        if found.is_none() {
            debug!("{name} not found under {}", parent.fullname());
        }
        found
    }

    /// Element of `parent` at a logical index in its declared numbering.
    #[must_use]
    pub fn get_child_by_index(&self, parent: &Handle, index: i64) -> Option<Handle> {
        resolve_by_index(self.backend(), parent, index).map(|h| self.intern(h))
    }

    /// Resolves a dotted path such as `top.loop[2].sig` from the root.
    #[must_use]
    pub fn get_handle_by_path(&self, path: &str) -> Option<Handle> {
        let mut parts = path.split('.');
        let mut handle = self.get_root(parts.next())?;
        for part in parts {
            handle = match self.get_child_by_name(&handle, part) {
                Some(child) => child,
                None => {
                    let (base, index) = parse_indexed(part)?;
                    let array = self.get_child_by_name(&handle, base)?;
                    self.get_child_by_index(&array, index)?
                }
            };
        }
        Some(handle)
    }

    /// Drops a handle. The native reference is released once no live handle,
    /// including a generate pseudo-region, still refers to it.
    pub fn release_handle(&self, handle: Handle) {
        if Rc::strong_count(&handle) > 1 {
            return;
        }
        let shared = {
            let mut cache = self.handles.borrow_mut();
            let cached = cache
                .get(handle.fullname())
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(&handle)));
            if cached {
                cache.remove(handle.fullname());
            }
            cache
                .values()
                .filter_map(Weak::upgrade)
                .any(|other| other.native() == handle.native())
        };
        if shared {
            trace!("{} shares its native reference; not releasing it", handle.fullname());
            return;
        }
        self.backend.release(handle.native());
    }

    /// Starts enumerating the children of `parent`.
    #[must_use]
    pub fn iterate(&self, parent: &Handle, selector: IterSelector) -> GpiIterator {
        let relations = self.backend.relations(parent.object_type(), selector);
        GpiIterator::new(Rc::clone(parent), relations)
    }

    /// Hierarchical children of `parent` as a std iterator.
    #[must_use]
    pub fn children(&self, parent: &Handle) -> Children<'_> {
        Children::new(self, self.iterate(parent, IterSelector::Objects))
    }

    // ---- values ----

    fn checked<T>(&self, handle: &ObjHandle, result: GpiResult<T>) -> GpiResult<T> {
        if let Err(err) = &result {
            error!("{}: {err}", handle.fullname());
        }
        result
    }

    /// Reads the value as a bit-vector string.
    ///
    /// # Errors
    /// `Unsupported` for non-logic, non-integral objects; `Native` on simulator failure.
    pub fn read_binstr(&self, handle: &ObjHandle) -> GpiResult<String> {
        let result = check_read(handle, Accessor::BinStr)
            .and_then(|()| self.backend.get_binstr(handle.native()));
        self.checked(handle, result)
    }

    /// Reads a string object's raw bytes.
    ///
    /// # Errors
    /// `Unsupported` for non-string objects; `Native` on simulator failure.
    pub fn read_string(&self, handle: &ObjHandle) -> GpiResult<Vec<u8>> {
        let result =
            check_read(handle, Accessor::Str).and_then(|()| self.backend.get_str(handle.native()));
        self.checked(handle, result)
    }

    /// Reads a real object.
    ///
    /// # Errors
    /// `Unsupported` for non-real objects; `Native` on simulator failure.
    pub fn read_real(&self, handle: &ObjHandle) -> GpiResult<f64> {
        let result =
            check_read(handle, Accessor::Real).and_then(|()| self.backend.get_real(handle.native()));
        self.checked(handle, result)
    }

    /// Reads the value as an integer.
    ///
    /// # Errors
    /// `Unsupported` for objects without an integral reading; `Native` on
    /// simulator failure.
    pub fn read_long(&self, handle: &ObjHandle) -> GpiResult<i64> {
        let result =
            check_read(handle, Accessor::Long).and_then(|()| self.backend.get_long(handle.native()));
        self.checked(handle, result)
    }

    /// Reads the value in the object's natural encoding.
    ///
    /// # Errors
    /// As the matching typed reader.
    pub fn read(&self, handle: &ObjHandle) -> GpiResult<SignalValue> {
        match handle.object_type() {
            ObjectType::Real => self.read_real(handle).map(SignalValue::Real),
            ObjectType::String => self.read_string(handle).map(SignalValue::Str),
            t if t.is_logic() => self.read_binstr(handle).map(SignalValue::BinStr),
            _ => self.read_long(handle).map(SignalValue::Long),
        }
    }

    /// Writes a value with the given assignment semantics.
    ///
    /// RELEASE reads back the current value and releases onto it, so the
    /// object converges to a defined value; `value` only selects the encoding
    /// check in that case.
    ///
    /// # Errors
    /// `ReadOnly` for constants, `Unsupported` for an inapplicable encoding,
    /// `InvalidValue` for malformed bit strings, `Native` on simulator failure.
    pub fn write(&self, handle: &ObjHandle, value: &SignalValue, action: SetAction) -> GpiResult<()> {
        let result = check_write(handle, value).and_then(|()| {
            if action == SetAction::Release {
                let current = self.read(handle)?;
                trace!("releasing {} onto {current:?}", handle.fullname());
                self.backend.set_value(handle.native(), &current, action)
            } else {
                self.backend.set_value(handle.native(), value, action)
            }
        });
        self.checked(handle, result)
    }

    // ---- callbacks ----

    fn register(&self, trigger: Trigger, reaction: Reaction) -> GpiResult<CallbackId> {
        self.callbacks.register(self.backend(), trigger, reaction)
    }

    /// Fires `reaction` after `delay` precision units.
    ///
    /// # Errors
    /// `Native` if the simulator refuses the registration.
    pub fn register_timed(&self, delay: u64, reaction: Reaction) -> GpiResult<CallbackId> {
        self.register(Trigger::Timed { delay }, reaction)
    }

    /// Fires `reaction` on every change of `signal` that passes `edge`.
    ///
    /// # Errors
    /// `Unsupported` if `signal` carries no value; `Native` on simulator failure.
    pub fn register_value_change(
        &self,
        signal: &Handle,
        edge: Edge,
        reaction: Reaction,
    ) -> GpiResult<CallbackId> {
        if !signal.object_type().is_value() {
            let err = GpiError::Unsupported {
                operation: "value-change callback",
                object_type: signal.object_type(),
            };
            error!("{}: {err}", signal.fullname());
            return Err(err);
        }
        self.register(
            Trigger::ValueChange {
                signal: Rc::clone(signal),
                edge,
            },
            reaction,
        )
    }

    /// Fires at the end of the current read-only phase.
    ///
    /// # Errors
    /// `Native` if the simulator refuses the registration.
    pub fn register_readonly(&self, reaction: Reaction) -> GpiResult<CallbackId> {
        self.register(Trigger::Phase(CallbackReason::ReadOnly), reaction)
    }

    /// Fires at the end of the current read-write phase.
    ///
    /// # Errors
    /// `Native` if the simulator refuses the registration.
    pub fn register_readwrite(&self, reaction: Reaction) -> GpiResult<CallbackId> {
        self.register(Trigger::Phase(CallbackReason::ReadWrite), reaction)
    }

    /// Fires at the start of the next time step.
    ///
    /// # Errors
    /// `Native` if the simulator refuses the registration.
    pub fn register_nexttime(&self, reaction: Reaction) -> GpiResult<CallbackId> {
        self.register(Trigger::Phase(CallbackReason::NextTimeStep), reaction)
    }

    /// Fires at start of simulation.
    ///
    /// # Errors
    /// `Native` if the simulator refuses the registration.
    pub fn register_start_of_sim(&self, reaction: Reaction) -> GpiResult<CallbackId> {
        self.register(Trigger::Lifecycle(CallbackReason::StartOfSimulation), reaction)
    }

    /// Fires at end of simulation.
    ///
    /// # Errors
    /// `Native` if the simulator refuses the registration.
    pub fn register_end_of_sim(&self, reaction: Reaction) -> GpiResult<CallbackId> {
        self.register(Trigger::Lifecycle(CallbackReason::EndOfSimulation), reaction)
    }

    /// Keeps a callback armed; call from inside its own reaction.
    ///
    /// # Errors
    /// `UnknownCallback` for a retired id; `Native` if re-registration fails.
    pub fn rearm(&self, id: CallbackId) -> GpiResult<()> {
        self.callbacks.rearm(self.backend(), id)
    }

    /// Cancels a callback. Cancelling mid-fire is deferred until the fire completes.
    ///
    /// # Errors
    /// `UnknownCallback` for a retired id.
    pub fn deregister(&self, id: CallbackId) -> GpiResult<()> {
        self.callbacks.deregister(self.backend(), id)
    }

    /// Current state of a callback, `None` once it is retired.
    #[must_use]
    pub fn callback_state(&self, id: CallbackId) -> Option<CallbackState> {
        self.callbacks.state(id)
    }

    /// Callback counters.
    #[must_use]
    pub fn callback_stats(&self) -> CallbackStats {
        self.callbacks.stats()
    }

    /// Whether a reaction is currently running.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.callbacks.mode()
    }

    /// Native re-entry point; every backend trampoline ends here.
    pub fn on_native_callback(&self, user_data: UserData, reason: Option<CallbackReason>) {
        logging::set_sim_time(self.backend.sim_time());
        self.callbacks.on_native(self, user_data, reason);
    }

    /// Handles a corrupted callback: logs it, publishes `Fatal` and stops the simulator.
    pub(crate) fn corrupted(&self, reason: Option<CallbackReason>, detail: String) {
        let product = self.product().product;
        let err = GpiError::Corrupted {
            reason,
            product: product.clone(),
            detail,
        };
        error!("{err}");
        self.events.publish(&SimEvent::Fatal {
            reason,
            product,
            message: err.to_string(),
        });
        self.backend.stop();
    }

    // ---- simulation ----

    /// Current simulation time as `(high, low)` 32-bit words.
    #[must_use]
    pub fn get_sim_time(&self) -> (u32, u32) {
        split_time(self.sim_time())
    }

    /// Current simulation time in precision units.
    #[must_use]
    pub fn sim_time(&self) -> u64 {
        self.backend.sim_time()
    }

    /// Simulation precision as a power of ten seconds.
    #[must_use]
    pub fn get_sim_precision(&self) -> i32 {
        self.backend.sim_precision()
    }

    /// Asks the simulator to finish.
    pub fn stop_simulator(&self) {
        info!("stop requested at {}", self.sim_time());
        self.backend.stop();
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Lifecycle events lost to full subscribers.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }
}
