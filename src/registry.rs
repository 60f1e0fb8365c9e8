//! Process-wide active backend.
//!
//! Exactly one backend is active per simulator process. The simulator drives
//! the layer from a single thread, so the active [`Gpi`] lives in a
//! thread-local slot and every native trampoline reaches it through
//! [`deliver`].

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::{error, info, warn};

use crate::backend::Backend;
use crate::callback::UserData;
use crate::config::GpiConfig;
use crate::error::{GpiError, GpiResult};
use crate::gpi::Gpi;
use crate::logging;
use crate::types::CallbackReason;

thread_local! {
    static ACTIVE: RefCell<Option<Rc<Gpi>>> = const { RefCell::new(None) };
}

/// Makes `backend` the active backend.
///
/// # Errors
/// `BackendAlreadyActive` if another backend is installed; `Native` if the
/// lifecycle hooks cannot be registered.
pub fn install(backend: Box<dyn Backend>, config: GpiConfig) -> GpiResult<Rc<Gpi>> {
    if let Some(active) = active() {
        return Err(GpiError::BackendAlreadyActive {
            active: active.backend().kind().to_string(),
        });
    }
    let kind = backend.kind();
    let gpi = Rc::new(Gpi::new(backend, config));
    ACTIVE.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&gpi)));
    if let Err(err) = gpi.attach_lifecycle() {
        ACTIVE.with(|slot| slot.borrow_mut().take());
        return Err(err);
    }
    info!("{kind} backend active");
    Ok(gpi)
}

/// Library entry: configures logging, optionally waits for a debugger, then
/// installs `backend`.
///
/// # Errors
/// As [`install`], plus `Config` for an unusable log level.
pub fn startup(backend: Box<dyn Backend>, config: GpiConfig) -> GpiResult<Rc<Gpi>> {
    logging::init(config.level_filter()?);
    if config.attach_wait_secs > 0 {
        warn!(
            "waiting {}s for a debugger to attach to pid {}",
            config.attach_wait_secs,
            std::process::id()
        );
        std::thread::sleep(Duration::from_secs(config.attach_wait_secs));
    }
    if !config.extra_entry_points.is_empty() {
        info!("extra entry points: {}", config.extra_entry_points.join(", "));
    }
    install(backend, config)
}

/// The active layer, if any.
#[must_use]
pub fn active() -> Option<Rc<Gpi>> {
    ACTIVE.with(|slot| slot.borrow().clone())
}

/// Runs `f` against the active layer.
///
/// # Errors
/// `NoActiveBackend` if nothing is installed.
pub fn with_active<T>(f: impl FnOnce(&Gpi) -> T) -> GpiResult<T> {
    let gpi = active().ok_or(GpiError::NoActiveBackend)?;
    Ok(f(&gpi))
}

/// Hands a native re-entry to the active layer.
///
/// `reason` is what the native side says fired, when it can tell.
pub fn deliver(user_data: UserData, reason: Option<CallbackReason>) {
    if with_active(|gpi| gpi.on_native_callback(user_data, reason)).is_err() {
        error!("native callback {} arrived with no active backend", user_data.id);
    }
}

/// Uninstalls the active backend and returns it.
pub fn shutdown() -> Option<Rc<Gpi>> {
    let gpi = ACTIVE.with(|slot| slot.borrow_mut().take());
    if let Some(gpi) = &gpi {
        info!("{} backend shut down", gpi.backend().kind());
    }
    gpi
}
