//! C ABI exported to the embedding runtime.
//!
//! Handles cross the boundary as boxed [`Handle`]s and iterators as boxed
//! [`GpiIterator`]s; both must be handed back to their free function. Strings
//! returned to C are owned by the caller and released with [`gpi_free_string`].
//! Every call operates on the active backend; with none installed, calls
//! return null or a failure code.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::rc::Rc;
use std::slice;

use log::{error, Level};

use crate::callback::{CallbackId, Reaction};
use crate::error::GpiResult;
use crate::gpi::Gpi;
use crate::handle::Handle;
use crate::iterator::{GpiIterator, IterItem, IterSelector};
use crate::logging;
use crate::registry;
use crate::types::{Edge, RangeDirection, SetAction};
use crate::value::SignalValue;

/// Reaction entry point supplied by the embedding. A non-zero return keeps the
/// callback armed.
pub type GpiCallbackFn = unsafe extern "C" fn(user: *mut c_void) -> c_int;

/// Log sink supplied by the embedding.
pub type GpiLogFn = unsafe extern "C" fn(
    level: c_int,
    target: *const c_char,
    message: *const c_char,
    user: *mut c_void,
);

/// `gpi_next`: iteration finished.
pub const GPI_END: c_int = 0;
/// `gpi_next`: a native child with a name.
pub const GPI_NATIVE: c_int = 1;
/// `gpi_next`: a native child without a name.
pub const GPI_NATIVE_NO_NAME: c_int = 2;
/// `gpi_next`: a foreign-language child, named.
pub const GPI_NOT_NATIVE: c_int = 3;
/// `gpi_next`: a foreign-language child without a name.
pub const GPI_NOT_NATIVE_NO_NAME: c_int = 4;

fn active<T>(call: &str, f: impl FnOnce(&Gpi) -> T) -> Option<T> {
    match registry::with_active(f) {
        Ok(out) => Some(out),
        Err(err) => {
            error!("{call}: {err}");
            None
        }
    }
}

fn status(result: Option<GpiResult<()>>) -> c_int {
    match result {
        Some(Ok(())) => 0,
        _ => -1,
    }
}

fn into_c_string(text: &str) -> *mut c_char {
    match CString::new(text) {
        Ok(s) => s.into_raw(),
        Err(err) => {
            error!("string with interior NUL cannot cross the C ABI: {err}");
            ptr::null_mut()
        }
    }
}

fn export_handle(handle: Option<Handle>) -> *mut Handle {
    handle.map_or(ptr::null_mut(), |h| Box::into_raw(Box::new(h)))
}

/// # Safety
/// `handle` must be null or come from this module and not have been released.
unsafe fn borrow_handle<'a>(handle: *const Handle) -> Option<&'a Handle> {
    handle.as_ref()
}

/// # Safety
/// `text` must be null or a NUL-terminated string.
unsafe fn borrow_str<'a>(text: *const c_char) -> Option<&'a str> {
    if text.is_null() {
        return None;
    }
    CStr::from_ptr(text).to_str().ok()
}

fn set_action(raw: c_int) -> Option<SetAction> {
    SetAction::try_from(raw)
        .map_err(|err| error!("{err}"))
        .ok()
}

// ============================================================================
// Hierarchy
// ============================================================================

/// Top-level object by name, or the first one if `name` is null.
///
/// # Safety
/// `name` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_root_handle(name: *const c_char) -> *mut Handle {
    let name = borrow_str(name);
    export_handle(active("gpi_get_root_handle", |gpi| gpi.get_root(name)).flatten())
}

/// Direct child of `parent` by short name. Null if not found.
///
/// # Safety
/// `parent` must be a live handle from this module; `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_handle_by_name(
    parent: *const Handle,
    name: *const c_char,
) -> *mut Handle {
    let (Some(parent), Some(name)) = (borrow_handle(parent), borrow_str(name)) else {
        return ptr::null_mut();
    };
    export_handle(active("gpi_get_handle_by_name", |gpi| gpi.get_child_by_name(parent, name)).flatten())
}

/// Element of `parent` at a logical index. Null if not found.
///
/// # Safety
/// `parent` must be a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_handle_by_index(parent: *const Handle, index: i64) -> *mut Handle {
    let Some(parent) = borrow_handle(parent) else {
        return ptr::null_mut();
    };
    export_handle(active("gpi_get_handle_by_index", |gpi| gpi.get_child_by_index(parent, index)).flatten())
}

/// Releases a handle.
///
/// # Safety
/// `handle` must be null or a handle from this module; it is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn gpi_release_handle(handle: *mut Handle) {
    if handle.is_null() {
        return;
    }
    let handle = *Box::from_raw(handle);
    if let Some(gpi) = registry::active() {
        gpi.release_handle(handle);
    }
}

/// Classification tag as its integer code, -1 for a null handle.
///
/// # Safety
/// `handle` must be null or a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_object_type(handle: *const Handle) -> c_int {
    borrow_handle(handle).map_or(-1, |h| h.object_type() as c_int)
}

/// 1 for constant objects, 0 otherwise.
///
/// # Safety
/// `handle` must be null or a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_is_constant(handle: *const Handle) -> c_int {
    borrow_handle(handle).map_or(0, |h| c_int::from(h.is_const()))
}

/// Short name. Free with [`gpi_free_string`].
///
/// # Safety
/// `handle` must be null or a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_name(handle: *const Handle) -> *mut c_char {
    borrow_handle(handle).map_or(ptr::null_mut(), |h| into_c_string(h.name()))
}

/// Fully-qualified name. Free with [`gpi_free_string`].
///
/// # Safety
/// `handle` must be null or a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_fullname(handle: *const Handle) -> *mut c_char {
    borrow_handle(handle).map_or(ptr::null_mut(), |h| into_c_string(h.fullname()))
}

/// Element count, -1 for a null handle.
///
/// # Safety
/// `handle` must be null or a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_num_elems(handle: *const Handle) -> i64 {
    borrow_handle(handle).map_or(-1, |h| i64::try_from(h.num_elems()).unwrap_or(i64::MAX))
}

/// Writes the declared bounds and returns 1 for ascending, -1 for descending,
/// 0 when the object has no range.
///
/// # Safety
/// `handle` must be null or a live handle; `left` and `right` must be writable.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_range(handle: *const Handle, left: *mut i64, right: *mut i64) -> c_int {
    let Some(range) = borrow_handle(handle).and_then(|h| h.range()) else {
        return 0;
    };
    if !left.is_null() {
        *left = range.left;
    }
    if !right.is_null() {
        *right = range.right;
    }
    match range.direction {
        RangeDirection::Ascending => 1,
        RangeDirection::Descending => -1,
    }
}

// ============================================================================
// Iteration
// ============================================================================

/// Starts enumerating `parent`. `selector` is 0 for objects, 1 for drivers,
/// 2 for loads. Free with [`gpi_free_iterator`].
///
/// # Safety
/// `parent` must be a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_iterate(parent: *const Handle, selector: c_int) -> *mut GpiIterator {
    let Some(parent) = borrow_handle(parent) else {
        return ptr::null_mut();
    };
    let selector = match selector {
        1 => IterSelector::Drivers,
        2 => IterSelector::Loads,
        _ => IterSelector::Objects,
    };
    active("gpi_iterate", |gpi| gpi.iterate(parent, selector))
        .map_or(ptr::null_mut(), |iter| Box::into_raw(Box::new(iter)))
}

/// Steps an iterator and returns one of the `GPI_*` status codes.
///
/// Native results write a new handle to `handle_out`; named foreign results
/// write their name to `name_out` (free with [`gpi_free_string`]).
///
/// # Safety
/// `iter` must be a live iterator; the out-pointers must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn gpi_next(
    iter: *mut GpiIterator,
    handle_out: *mut *mut Handle,
    name_out: *mut *mut c_char,
) -> c_int {
    let Some(iter) = iter.as_mut() else {
        return GPI_END;
    };
    let Some(gpi) = registry::active() else {
        return GPI_END;
    };
    let Some(item) = iter.next_item(&gpi) else {
        return GPI_END;
    };
    let (code, handle, name) = match item {
        IterItem::Native(h) => (GPI_NATIVE, Some(h), None),
        IterItem::NativeNoName(h) => (GPI_NATIVE_NO_NAME, Some(h), None),
        IterItem::NotNative { name, .. } => (GPI_NOT_NATIVE, None, Some(name)),
        IterItem::NotNativeNoName(_) => (GPI_NOT_NATIVE_NO_NAME, None, None),
    };
    if !handle_out.is_null() {
        *handle_out = export_handle(handle);
    }
    if !name_out.is_null() {
        *name_out = name.map_or(ptr::null_mut(), |n| into_c_string(&n));
    }
    code
}

/// Frees an iterator, finished or not.
///
/// # Safety
/// `iter` must be null or an iterator from [`gpi_iterate`].
#[no_mangle]
pub unsafe extern "C" fn gpi_free_iterator(iter: *mut GpiIterator) {
    if !iter.is_null() {
        drop(Box::from_raw(iter));
    }
}

// ============================================================================
// Values
// ============================================================================

/// Bit-vector string value. Null on failure.
///
/// # Safety
/// `handle` must be a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_signal_value_binstr(handle: *const Handle) -> *mut c_char {
    let Some(handle) = borrow_handle(handle) else {
        return ptr::null_mut();
    };
    match active("gpi_get_signal_value_binstr", |gpi| gpi.read_binstr(handle)) {
        Some(Ok(bits)) => into_c_string(&bits),
        _ => ptr::null_mut(),
    }
}

/// Raw byte string value. Writes the length to `len`; free with [`gpi_free_bytes`].
///
/// # Safety
/// `handle` must be a live handle; `len` must be writable.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_signal_value_str(handle: *const Handle, len: *mut usize) -> *mut u8 {
    let Some(handle) = borrow_handle(handle) else {
        return ptr::null_mut();
    };
    match active("gpi_get_signal_value_str", |gpi| gpi.read_string(handle)) {
        Some(Ok(bytes)) => {
            if !len.is_null() {
                *len = bytes.len();
            }
            Box::into_raw(bytes.into_boxed_slice()).cast()
        }
        _ => ptr::null_mut(),
    }
}

/// Real value. NaN on failure.
///
/// # Safety
/// `handle` must be a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_signal_value_real(handle: *const Handle) -> f64 {
    let Some(handle) = borrow_handle(handle) else {
        return f64::NAN;
    };
    match active("gpi_get_signal_value_real", |gpi| gpi.read_real(handle)) {
        Some(Ok(real)) => real,
        _ => f64::NAN,
    }
}

/// Integer value. Returns 0 on success and writes `out`, -1 on failure.
///
/// # Safety
/// `handle` must be a live handle; `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_signal_value_long(handle: *const Handle, out: *mut i64) -> c_int {
    let Some(handle) = borrow_handle(handle) else {
        return -1;
    };
    match active("gpi_get_signal_value_long", |gpi| gpi.read_long(handle)) {
        Some(Ok(long)) => {
            if !out.is_null() {
                *out = long;
            }
            0
        }
        _ => -1,
    }
}

unsafe fn write(call: &str, handle: *const Handle, value: SignalValue, action: c_int) -> c_int {
    let (Some(handle), Some(action)) = (borrow_handle(handle), set_action(action)) else {
        return -1;
    };
    status(active(call, |gpi| gpi.write(handle, &value, action)))
}

/// Writes a bit-vector string. `action` is 0 deposit, 1 force, 2 release, 3 no-delay.
///
/// # Safety
/// `handle` must be a live handle; `value` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_signal_value_binstr(
    handle: *const Handle,
    value: *const c_char,
    action: c_int,
) -> c_int {
    let Some(value) = borrow_str(value) else {
        return -1;
    };
    write("gpi_set_signal_value_binstr", handle, SignalValue::binstr(value), action)
}

/// Writes a raw byte string.
///
/// # Safety
/// `handle` must be a live handle; `value` must point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_signal_value_str(
    handle: *const Handle,
    value: *const u8,
    len: usize,
    action: c_int,
) -> c_int {
    if value.is_null() && len > 0 {
        return -1;
    }
    let bytes = if len == 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(value, len).to_vec()
    };
    write("gpi_set_signal_value_str", handle, SignalValue::Str(bytes), action)
}

/// Writes a real.
///
/// # Safety
/// `handle` must be a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_signal_value_real(handle: *const Handle, value: f64, action: c_int) -> c_int {
    write("gpi_set_signal_value_real", handle, SignalValue::Real(value), action)
}

/// Writes an integer.
///
/// # Safety
/// `handle` must be a live handle from this module.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_signal_value_long(handle: *const Handle, value: i64, action: c_int) -> c_int {
    write("gpi_set_signal_value_long", handle, SignalValue::Long(value), action)
}

/// Frees a string returned by this module.
///
/// # Safety
/// `text` must be null or a string returned by this module, freed once.
#[no_mangle]
pub unsafe extern "C" fn gpi_free_string(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Frees a byte buffer returned by [`gpi_get_signal_value_str`].
///
/// # Safety
/// `bytes` and `len` must be exactly what that call returned.
#[no_mangle]
pub unsafe extern "C" fn gpi_free_bytes(bytes: *mut u8, len: usize) {
    if !bytes.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(bytes, len)));
    }
}

// ============================================================================
// Callbacks
// ============================================================================

fn reaction(callback: GpiCallbackFn, user: *mut c_void) -> Reaction {
    Box::new(move |gpi, id| {
        // SAFETY: the embedding guarantees `user` stays valid while registered.
        if unsafe { callback(user) } != 0 {
            if let Err(err) = gpi.rearm(id) {
                error!("cannot keep {id} armed: {err}");
            }
        }
    })
}

fn token(call: &str, result: Option<GpiResult<CallbackId>>) -> u64 {
    match result {
        Some(Ok(id)) => id.to_raw(),
        Some(Err(err)) => {
            error!("{call}: {err}");
            0
        }
        None => 0,
    }
}

/// Fires `callback(user)` after `delay` precision units. Returns a callback
/// token, 0 on failure.
///
/// # Safety
/// `user` must stay valid until the callback fires or is deregistered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_timed_callback(
    callback: GpiCallbackFn,
    user: *mut c_void,
    delay: u64,
) -> u64 {
    let call = "gpi_register_timed_callback";
    token(call, active(call, |gpi| gpi.register_timed(delay, reaction(callback, user))))
}

/// Fires on changes of `signal` passing `edge` (1 rising, 2 falling, 3 any).
///
/// # Safety
/// `signal` must be a live handle; `user` must stay valid while registered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_value_change_callback(
    callback: GpiCallbackFn,
    user: *mut c_void,
    signal: *const Handle,
    edge: c_int,
) -> u64 {
    let call = "gpi_register_value_change_callback";
    let Some(signal) = borrow_handle(signal) else {
        return 0;
    };
    let edge = match Edge::try_from(edge) {
        Ok(edge) => edge,
        Err(err) => {
            error!("{call}: {err}");
            return 0;
        }
    };
    let signal = Rc::clone(signal);
    token(
        call,
        active(call, |gpi| {
            gpi.register_value_change(&signal, edge, reaction(callback, user))
        }),
    )
}

/// Fires at the end of the read-only phase.
///
/// # Safety
/// `user` must stay valid until the callback fires or is deregistered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_readonly_callback(callback: GpiCallbackFn, user: *mut c_void) -> u64 {
    let call = "gpi_register_readonly_callback";
    token(call, active(call, |gpi| gpi.register_readonly(reaction(callback, user))))
}

/// Fires at the end of the read-write phase.
///
/// # Safety
/// `user` must stay valid until the callback fires or is deregistered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_readwrite_callback(callback: GpiCallbackFn, user: *mut c_void) -> u64 {
    let call = "gpi_register_readwrite_callback";
    token(call, active(call, |gpi| gpi.register_readwrite(reaction(callback, user))))
}

/// Fires at the start of the next time step.
///
/// # Safety
/// `user` must stay valid until the callback fires or is deregistered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_nexttime_callback(callback: GpiCallbackFn, user: *mut c_void) -> u64 {
    let call = "gpi_register_nexttime_callback";
    token(call, active(call, |gpi| gpi.register_nexttime(reaction(callback, user))))
}

/// Fires once the simulator has elaborated and is about to run.
///
/// # Safety
/// `user` must stay valid until the callback fires or is deregistered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_start_of_sim_callback(callback: GpiCallbackFn, user: *mut c_void) -> u64 {
    let call = "gpi_register_start_of_sim_callback";
    token(call, active(call, |gpi| gpi.register_start_of_sim(reaction(callback, user))))
}

/// Fires when the simulation finishes.
///
/// # Safety
/// `user` must stay valid until the callback fires or is deregistered.
#[no_mangle]
pub unsafe extern "C" fn gpi_register_end_of_sim_callback(callback: GpiCallbackFn, user: *mut c_void) -> u64 {
    let call = "gpi_register_end_of_sim_callback";
    token(call, active(call, |gpi| gpi.register_end_of_sim(reaction(callback, user))))
}

/// Cancels a callback by token. Returns 0 on success.
#[no_mangle]
pub extern "C" fn gpi_deregister_callback(token: u64) -> c_int {
    let id = CallbackId::from_raw(token);
    status(active("gpi_deregister_callback", |gpi| gpi.deregister(id)))
}

// ============================================================================
// Simulation
// ============================================================================

/// Current simulation time as two 32-bit words.
///
/// # Safety
/// `high` and `low` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_sim_time(high: *mut u32, low: *mut u32) {
    let (h, l) = active("gpi_get_sim_time", Gpi::get_sim_time).unwrap_or((0, 0));
    if !high.is_null() {
        *high = h;
    }
    if !low.is_null() {
        *low = l;
    }
}

/// Simulation precision as a power of ten seconds.
///
/// # Safety
/// `precision` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_sim_precision(precision: *mut i32) {
    if let Some(p) = active("gpi_get_sim_precision", Gpi::get_sim_precision) {
        if !precision.is_null() {
            *precision = p;
        }
    }
}

/// Asks the simulator to finish.
#[no_mangle]
pub extern "C" fn gpi_stop_simulator() {
    active("gpi_stop_simulator", Gpi::stop_simulator);
}

/// Simulator product name. Free with [`gpi_free_string`].
#[no_mangle]
pub extern "C" fn gpi_get_simulator_product() -> *mut c_char {
    active("gpi_get_simulator_product", |gpi| into_c_string(&gpi.product().product))
        .unwrap_or(ptr::null_mut())
}

/// Simulator version. Free with [`gpi_free_string`].
#[no_mangle]
pub extern "C" fn gpi_get_simulator_version() -> *mut c_char {
    active("gpi_get_simulator_version", |gpi| into_c_string(&gpi.product().version))
        .unwrap_or(ptr::null_mut())
}

// ============================================================================
// Logging
// ============================================================================

struct ForeignSink {
    log: GpiLogFn,
    user: *mut c_void,
}

// SAFETY: the embedding promises its sink may be called from any thread the
// simulator logs from.
unsafe impl Send for ForeignSink {}
unsafe impl Sync for ForeignSink {}

impl ForeignSink {
    fn emit(&self, level: Level, target: &str, message: &str) {
        let (Ok(target), Ok(message)) = (CString::new(target), CString::new(message)) else {
            return;
        };
        // SAFETY: both strings outlive the call; `user` is the embedding's.
        unsafe { (self.log)(level as c_int, target.as_ptr(), message.as_ptr(), self.user) };
    }
}

/// Routes log records to the embedding's own logger; a null `log` restores
/// stderr output. Levels are 1 (error) through 5 (trace).
///
/// # Safety
/// `user` must stay valid until the handler is replaced.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_log_handler(log: Option<GpiLogFn>, user: *mut c_void) {
    let Some(log) = log else {
        logging::clear_handler();
        return;
    };
    let sink = ForeignSink { log, user };
    logging::set_handler(Box::new(move |level: Level, target: &str, message: &str| {
        sink.emit(level, target, message);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ModelDesign, ModelKernel, ModelObject, ModelOptions};
    use crate::config::GpiConfig;

    fn install() -> ModelKernel {
        let top = ModelObject::module("top").with_children([
            ModelObject::logic_vector("bus", 3, 0),
            ModelObject::module("sub"),
        ]);
        let kernel = ModelKernel::new(ModelDesign::new(vec![top]), ModelOptions::default()).unwrap();
        registry::install(Box::new(kernel.backend()), GpiConfig::default()).unwrap();
        kernel
    }

    unsafe extern "C" fn count(user: *mut c_void) -> c_int {
        *user.cast::<u32>() += 1;
        0
    }

    #[test]
    fn test_values_through_c_abi() {
        let _kernel = install();
        unsafe {
            let top = gpi_get_root_handle(ptr::null());
            assert!(!top.is_null());
            let name = CString::new("bus").unwrap();
            let bus = gpi_get_handle_by_name(top, name.as_ptr());
            assert!(!bus.is_null());

            let (mut left, mut right) = (0, 0);
            assert_eq!(gpi_get_range(bus, &mut left, &mut right), -1);
            assert_eq!((left, right), (3, 0));

            let bits = CString::new("1010").unwrap();
            assert_eq!(gpi_set_signal_value_binstr(bus, bits.as_ptr(), 3), 0);
            let read = gpi_get_signal_value_binstr(bus);
            assert_eq!(CStr::from_ptr(read).to_str().unwrap(), "1010");
            gpi_free_string(read);

            assert!(gpi_get_signal_value_real(bus).is_nan());
            assert_eq!(gpi_set_signal_value_binstr(bus, bits.as_ptr(), 9), -1);

            gpi_release_handle(bus);
            gpi_release_handle(top);
        }
        registry::shutdown();
    }

    #[test]
    fn test_iteration_through_c_abi() {
        let _kernel = install();
        unsafe {
            let top = gpi_get_root_handle(ptr::null());
            let iter = gpi_iterate(top, 0);
            let mut names = Vec::new();
            loop {
                let mut child = ptr::null_mut();
                let code = gpi_next(iter, &mut child, ptr::null_mut());
                if code == GPI_END {
                    break;
                }
                assert_eq!(code, GPI_NATIVE);
                let name = gpi_get_name(child);
                names.push(CStr::from_ptr(name).to_str().unwrap().to_string());
                gpi_free_string(name);
                gpi_release_handle(child);
            }
            gpi_free_iterator(iter);
            gpi_release_handle(top);
            assert_eq!(names, ["bus", "sub"]);
        }
        registry::shutdown();
    }

    #[test]
    fn test_timed_callback_through_c_abi() {
        let kernel = install();
        let mut hits = 0u32;
        let token = unsafe {
            gpi_register_timed_callback(count, ptr::addr_of_mut!(hits).cast(), 10)
        };
        assert_ne!(token, 0);
        kernel.start();
        kernel.run_until(20);
        assert_eq!(hits, 1);
        assert_eq!(gpi_deregister_callback(token), -1);
        registry::shutdown();
    }

    #[test]
    fn test_lifecycle_callbacks_through_c_abi() {
        let kernel = install();
        let (mut started, mut ended) = (0u32, 0u32);
        let (start, end) = unsafe {
            (
                gpi_register_start_of_sim_callback(count, ptr::addr_of_mut!(started).cast()),
                gpi_register_end_of_sim_callback(count, ptr::addr_of_mut!(ended).cast()),
            )
        };
        assert_ne!(start, 0);
        assert_ne!(end, 0);
        assert_ne!(start, end);

        kernel.run_until(10);
        assert_eq!((started, ended), (1, 0));
        kernel.finish();
        assert_eq!((started, ended), (1, 1));
        registry::shutdown();
    }

    #[test]
    fn test_calls_without_backend_fail_cleanly() {
        unsafe {
            assert!(gpi_get_root_handle(ptr::null()).is_null());
            let (mut high, mut low) = (7, 7);
            gpi_get_sim_time(&mut high, &mut low);
            assert_eq!((high, low), (0, 0));
        }
        assert!(gpi_get_simulator_product().is_null());
        assert_eq!(gpi_deregister_callback(1), -1);
        assert_eq!(unsafe { gpi_register_end_of_sim_callback(count, ptr::null_mut()) }, 0);
    }
}
