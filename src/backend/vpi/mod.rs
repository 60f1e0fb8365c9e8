//! Verilog VPI backend.
//!
//! Loaded by the simulator through `vlog_startup_routines`. The symbols in
//! [`sys`] resolve against the simulator at load time, so this module only
//! links into the shared library, never into standalone binaries.

pub mod sys;

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use log::{debug, error, warn};

use crate::callback::UserData;
use crate::classify::{NativeKind, TypeDesc};
use crate::config::GpiConfig;
use crate::error::{GpiError, GpiResult};
use crate::iterator::Relation;
use crate::registry;
use crate::types::{CallbackReason, IndexRange, Language, SetAction};
use crate::value::SignalValue;

use super::{
    Backend, BackendKind, NativeInfo, NativeRef, NativeRequest, NativeToken, SimulatorInfo,
};

fn handle(native: NativeRef) -> sys::vpiHandle {
    native.as_ptr()
}

fn to_native(h: sys::vpiHandle) -> Option<NativeRef> {
    (!h.is_null()).then(|| NativeRef::from_ptr(h))
}

/// Copies a simulator-owned C string.
///
/// # Safety
/// `raw` must be null or point at a NUL-terminated string.
unsafe fn owned_str(raw: *const c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    Some(CStr::from_ptr(raw).to_string_lossy().into_owned())
}

/// Message of the error raised by the last VPI call, if any.
fn pending_error() -> Option<String> {
    // SAFETY: an all-null error record is valid; the simulator fills it in.
    let mut info = unsafe { std::mem::zeroed::<sys::s_vpi_error_info>() };
    // SAFETY: `info` is a valid out-parameter for the duration of the call.
    let level = unsafe { sys::vpi_chk_error(&mut info) };
    if level == 0 {
        return None;
    }
    // SAFETY: the simulator owns the message until the next VPI call.
    Some(unsafe { owned_str(info.message) }.unwrap_or_else(|| format!("error level {level}")))
}

fn last_error() -> String {
    pending_error().unwrap_or_else(|| "no error reported".to_string())
}

fn str_prop(property: sys::PLI_INT32, h: sys::vpiHandle) -> Option<String> {
    // SAFETY: `h` came from the simulator; vpi_get_str returns null or a C string.
    unsafe { owned_str(sys::vpi_get_str(property, h)) }
}

fn int_prop(property: sys::PLI_INT32, h: sys::vpiHandle) -> i32 {
    // SAFETY: `h` came from the simulator.
    unsafe { sys::vpi_get(property, h) }
}

/// Reads the integer value of a range-bound expression.
fn bound(relation: sys::PLI_INT32, h: sys::vpiHandle) -> Option<i64> {
    // SAFETY: `h` came from the simulator.
    let expr = unsafe { sys::vpi_handle(relation, h) };
    if expr.is_null() {
        return None;
    }
    let mut value = sys::s_vpi_value::with_format(sys::vpiIntVal);
    // SAFETY: `value` outlives the call; the union is read as the requested format.
    let integer = unsafe {
        sys::vpi_get_value(expr, &mut value);
        value.value.integer
    };
    Some(i64::from(integer))
}

fn declared_range(h: sys::vpiHandle) -> Option<IndexRange> {
    Some(IndexRange::from_bounds(
        bound(sys::vpiLeftRange, h)?,
        bound(sys::vpiRightRange, h)?,
    ))
}

fn four_state_vector(h: sys::vpiHandle) -> TypeDesc {
    let size = int_prop(sys::vpiSize, h);
    if int_prop(sys::vpiVector, h) == 0 && size <= 1 {
        return TypeDesc::std_logic();
    }
    let range = declared_range(h)
        .unwrap_or_else(|| IndexRange::from_bounds(i64::from(size - 1), 0));
    TypeDesc::array(TypeDesc::std_logic(), range)
}

/// Backend over the simulator's VPI.
#[derive(Debug)]
pub struct VpiBackend {
    info: SimulatorInfo,
}

impl VpiBackend {
    /// Queries the simulator for its identification.
    #[must_use]
    pub fn new() -> Self {
        let mut info = sys::s_vpi_vlog_info {
            argc: 0,
            argv: ptr::null_mut(),
            product: ptr::null_mut(),
            version: ptr::null_mut(),
        };
        // SAFETY: `info` is a valid out-parameter; the strings are simulator-owned.
        let (product, version) = unsafe {
            if sys::vpi_get_vlog_info(&mut info) == 0 {
                (None, None)
            } else {
                (owned_str(info.product), owned_str(info.version))
            }
        };
        Self {
            info: SimulatorInfo {
                product: product.unwrap_or_else(|| "unknown".to_string()),
                version: version.unwrap_or_else(|| "unknown".to_string()),
            },
        }
    }

    fn scan(&self, relation: sys::PLI_INT32, parent: sys::vpiHandle) -> Vec<NativeRef> {
        // SAFETY: `parent` came from the simulator; a null iterator means no children
        // and a completed scan frees the iterator.
        unsafe {
            let iter = sys::vpi_iterate(relation, parent);
            let mut out = Vec::new();
            if iter.is_null() {
                return out;
            }
            loop {
                let child = sys::vpi_scan(iter);
                match to_native(child) {
                    Some(child) => out.push(child),
                    None => break,
                }
            }
            out
        }
    }

    fn put(&self, h: sys::vpiHandle, value: &mut sys::s_vpi_value, action: SetAction) -> GpiResult<()> {
        let mut when = sys::s_vpi_time {
            type_: sys::vpiSimTime,
            ..sys::s_vpi_time::default()
        };
        let flags = match action {
            SetAction::Deposit => sys::vpiInertialDelay,
            SetAction::NoDelay => sys::vpiNoDelay,
            SetAction::Force => sys::vpiForceFlag,
            SetAction::Release => sys::vpiReleaseFlag,
        };
        // SAFETY: `value` and `when` outlive the call; the simulator copies them.
        unsafe { sys::vpi_put_value(h, value, &mut when, flags) };
        // vpi_put_value returns null for every flag except event scheduling, so
        // failures are only visible through the error channel.
        if let Some(detail) = pending_error() {
            return Err(GpiError::native("vpi_put_value", detail));
        }
        Ok(())
    }

    fn read(&self, native: NativeRef, format: sys::PLI_INT32) -> sys::s_vpi_value {
        let mut value = sys::s_vpi_value::with_format(format);
        // SAFETY: `value` outlives the call.
        unsafe { sys::vpi_get_value(handle(native), &mut value) };
        value
    }
}

impl Default for VpiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for VpiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vpi
    }

    fn language(&self) -> Language {
        Language::Verilog
    }

    fn product(&self) -> SimulatorInfo {
        self.info.clone()
    }

    fn root(&self, name: Option<&str>) -> Option<NativeRef> {
        let roots = self.scan(sys::vpiModule, ptr::null_mut());
        match name {
            None => roots.first().copied(),
            Some(name) => roots
                .into_iter()
                .find(|&r| str_prop(sys::vpiName, handle(r)).as_deref() == Some(name)),
        }
    }

    fn lookup(&self, parent: NativeRef, name: &str) -> Option<NativeRef> {
        let scope = str_prop(sys::vpiFullName, handle(parent))?;
        let path = CString::new(format!("{scope}.{name}")).ok()?;
        // SAFETY: `path` outlives the call; the simulator does not keep the pointer.
        to_native(unsafe { sys::vpi_handle_by_name(path.as_ptr().cast_mut(), ptr::null_mut()) })
    }

    fn element(&self, parent: NativeRef, offset: usize) -> Option<NativeRef> {
        let range = declared_range(handle(parent))?;
        let index = i32::try_from(range.index(offset)?).ok()?;
        // SAFETY: `parent` came from the simulator.
        to_native(unsafe { sys::vpi_handle_by_index(handle(parent), index) })
    }

    fn children(&self, parent: NativeRef, relation: Relation) -> GpiResult<Vec<NativeRef>> {
        let h = handle(parent);
        let codes: &[sys::PLI_INT32] = match relation {
            Relation::Parameters => &[sys::vpiParameter],
            Relation::Nets => &[sys::vpiNet, sys::vpiNetArray],
            Relation::Variables => &[sys::vpiReg, sys::vpiRegArray, sys::vpiVariables, sys::vpiMemory],
            Relation::SubScopes => &[sys::vpiInternalScope],
            Relation::Members => &[sys::vpiMember],
            Relation::Elements => match int_prop(sys::vpiType, h) {
                sys::vpiNetArray => &[sys::vpiNet],
                sys::vpiRegArray => &[sys::vpiReg],
                sys::vpiMemory => &[sys::vpiMemoryWord],
                other => {
                    return Err(GpiError::native(
                        "vpi_iterate",
                        format!("no element relation for vpiType {other}"),
                    ))
                }
            },
            Relation::Drivers => &[sys::vpiDriver],
            Relation::Loads => &[sys::vpiLoad],
        };
        // Simulators disagree on whether regs also appear under vpiVariables.
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for &code in codes {
            for child in self.scan(code, h) {
                let key = str_prop(sys::vpiFullName, handle(child)).unwrap_or_default();
                if key.is_empty() || seen.insert(key) {
                    out.push(child);
                }
            }
        }
        Ok(out)
    }

    fn describe(&self, native: NativeRef) -> GpiResult<NativeInfo> {
        let h = handle(native);
        let vpi_type = int_prop(sys::vpiType, h);
        let mut language = Language::Verilog;
        let mut size = None;
        let (kind, ty) = match vpi_type {
            sys::vpiModule => (NativeKind::Module, TypeDesc::None),
            sys::vpiPackage => (NativeKind::Package, TypeDesc::None),
            sys::vpiGenScope => (NativeKind::GenerateScope, TypeDesc::None),
            sys::vpiGenScopeArray => (NativeKind::GenerateArray, TypeDesc::None),
            sys::vpiNet => (NativeKind::Net, four_state_vector(h)),
            sys::vpiReg | sys::vpiBitVar => (NativeKind::Reg, four_state_vector(h)),
            sys::vpiIntegerVar
            | sys::vpiIntVar
            | sys::vpiLongIntVar
            | sys::vpiShortIntVar
            | sys::vpiByteVar => (NativeKind::Variable, TypeDesc::Integer),
            sys::vpiRealVar => (NativeKind::Variable, TypeDesc::Floating),
            sys::vpiStringVar => (NativeKind::Variable, TypeDesc::Str),
            sys::vpiEnumVar => (NativeKind::Variable, TypeDesc::Enumeration { literals: Vec::new() }),
            sys::vpiEnumNet => (NativeKind::Net, TypeDesc::Enumeration { literals: Vec::new() }),
            sys::vpiParameter => (NativeKind::Constant, TypeDesc::Integer),
            sys::vpiStructVar | sys::vpiStructNet => {
                size = usize::try_from(int_prop(sys::vpiSize, h)).ok();
                let kind = if vpi_type == sys::vpiStructNet {
                    NativeKind::Net
                } else {
                    NativeKind::Variable
                };
                let packed = int_prop(sys::vpiPacked, h) != 0;
                (kind, TypeDesc::Record { packed })
            }
            sys::vpiNetArray | sys::vpiRegArray | sys::vpiMemory => {
                let range = declared_range(h).ok_or_else(|| {
                    GpiError::native("vpi_handle", "array without a declared range")
                })?;
                let kind = if vpi_type == sys::vpiNetArray {
                    NativeKind::Net
                } else {
                    NativeKind::Reg
                };
                (kind, TypeDesc::array(TypeDesc::None, range))
            }
            0 => return Err(GpiError::native("vpi_get", last_error())),
            other => {
                // Objects VPI cannot model belong to the other language world
                // of a mixed-language simulation.
                debug!("vpiType {other} is not a Verilog object");
                language = Language::Vhdl;
                (NativeKind::Other, TypeDesc::None)
            }
        };
        Ok(NativeInfo {
            kind,
            ty,
            name: str_prop(sys::vpiName, h),
            language,
            size,
        })
    }

    fn release(&self, native: NativeRef) {
        // SAFETY: `native` came from the simulator and is not used afterwards.
        unsafe { sys::vpi_release_handle(handle(native)) };
    }

    fn get_binstr(&self, native: NativeRef) -> GpiResult<String> {
        let value = self.read(native, sys::vpiBinStrVal);
        // SAFETY: the simulator filled `str_` for vpiBinStrVal.
        unsafe { owned_str(value.value.str_) }
            .ok_or_else(|| GpiError::native("vpi_get_value", last_error()))
    }

    fn get_str(&self, native: NativeRef) -> GpiResult<Vec<u8>> {
        let value = self.read(native, sys::vpiStringVal);
        // SAFETY: the simulator filled `str_` for vpiStringVal.
        let raw = unsafe { value.value.str_ };
        if raw.is_null() {
            return Err(GpiError::native("vpi_get_value", last_error()));
        }
        // SAFETY: non-null and NUL-terminated per the VPI contract.
        Ok(unsafe { CStr::from_ptr(raw) }.to_bytes().to_vec())
    }

    fn get_real(&self, native: NativeRef) -> GpiResult<f64> {
        let value = self.read(native, sys::vpiRealVal);
        // SAFETY: the simulator filled `real` for vpiRealVal.
        Ok(unsafe { value.value.real })
    }

    fn get_long(&self, native: NativeRef) -> GpiResult<i64> {
        let value = self.read(native, sys::vpiIntVal);
        // SAFETY: the simulator filled `integer` for vpiIntVal.
        Ok(i64::from(unsafe { value.value.integer }))
    }

    fn set_value(&self, native: NativeRef, value: &SignalValue, action: SetAction) -> GpiResult<()> {
        let h = handle(native);
        match value {
            SignalValue::BinStr(bits) => {
                let text = CString::new(bits.as_str())
                    .map_err(|e| GpiError::invalid_value(e.to_string()))?;
                let mut raw = sys::s_vpi_value::with_format(sys::vpiBinStrVal);
                raw.value.str_ = text.as_ptr().cast_mut();
                self.put(h, &mut raw, action)
            }
            SignalValue::Str(bytes) => {
                let text = CString::new(bytes.clone())
                    .map_err(|e| GpiError::invalid_value(e.to_string()))?;
                let mut raw = sys::s_vpi_value::with_format(sys::vpiStringVal);
                raw.value.str_ = text.as_ptr().cast_mut();
                self.put(h, &mut raw, action)
            }
            SignalValue::Real(real) => {
                let mut raw = sys::s_vpi_value::with_format(sys::vpiRealVal);
                raw.value.real = *real;
                self.put(h, &mut raw, action)
            }
            SignalValue::Long(long) => {
                let integer = i32::try_from(*long).map_err(|_| {
                    GpiError::invalid_value(format!("{long} does not fit vpiIntVal"))
                })?;
                let mut raw = sys::s_vpi_value::with_format(sys::vpiIntVal);
                raw.value.integer = integer;
                self.put(h, &mut raw, action)
            }
        }
    }

    fn register_callback(&self, request: NativeRequest, user_data: &UserData) -> GpiResult<NativeToken> {
        let mut time = sys::s_vpi_time {
            type_: sys::vpiSimTime,
            ..sys::s_vpi_time::default()
        };
        let mut value = sys::s_vpi_value::with_format(sys::vpiSuppressVal);
        let (reason, obj) = match request {
            NativeRequest::AfterDelay(delay) => {
                let (high, low) = crate::types::split_time(delay);
                time.high = high;
                time.low = low;
                (sys::cbAfterDelay, ptr::null_mut())
            }
            NativeRequest::ValueChange(signal) => {
                time.type_ = sys::vpiSuppressTime;
                (sys::cbValueChange, handle(signal))
            }
            NativeRequest::ReadWrite => (sys::cbReadWriteSynch, ptr::null_mut()),
            NativeRequest::ReadOnly => (sys::cbReadOnlySynch, ptr::null_mut()),
            NativeRequest::NextTimeStep => (sys::cbNextSimTime, ptr::null_mut()),
            NativeRequest::StartOfSimulation => (sys::cbStartOfSimulation, ptr::null_mut()),
            NativeRequest::EndOfSimulation => (sys::cbEndOfSimulation, ptr::null_mut()),
        };
        let mut data = sys::s_cb_data {
            reason,
            cb_rtn: Some(vpi_trampoline),
            obj,
            time: &mut time,
            value: &mut value,
            index: 0,
            user_data: (user_data as *const UserData).cast_mut().cast(),
        };
        // SAFETY: `data`, `time` and `value` outlive the call and are copied by
        // the simulator; the user data pointer stays valid until removal.
        let cb = unsafe { sys::vpi_register_cb(&mut data) };
        if cb.is_null() {
            return Err(GpiError::native("vpi_register_cb", last_error()));
        }
        Ok(NativeToken(cb as usize))
    }

    fn remove_callback(&self, token: NativeToken) -> GpiResult<()> {
        // SAFETY: the token is a callback handle returned by vpi_register_cb.
        let ok = unsafe { sys::vpi_remove_cb(token.0 as sys::vpiHandle) };
        if ok == 0 {
            return Err(GpiError::native("vpi_remove_cb", last_error()));
        }
        Ok(())
    }

    fn sim_time(&self) -> u64 {
        let mut time = sys::s_vpi_time {
            type_: sys::vpiSimTime,
            ..sys::s_vpi_time::default()
        };
        // SAFETY: `time` is a valid out-parameter.
        unsafe { sys::vpi_get_time(ptr::null_mut(), &mut time) };
        (u64::from(time.high) << 32) | u64::from(time.low)
    }

    fn sim_precision(&self) -> i32 {
        int_prop(sys::vpiTimePrecision, ptr::null_mut())
    }

    fn stop(&self) {
        // SAFETY: vpiFinish takes one integer diagnostic-level argument.
        unsafe { sys::vpi_control(sys::vpiFinish, 1i32) };
    }
}

fn callback_reason(reason: sys::PLI_INT32) -> Option<CallbackReason> {
    Some(match reason {
        sys::cbAfterDelay => CallbackReason::AfterDelay,
        sys::cbValueChange => CallbackReason::ValueChange,
        sys::cbReadOnlySynch => CallbackReason::ReadOnly,
        sys::cbReadWriteSynch => CallbackReason::ReadWrite,
        sys::cbNextSimTime => CallbackReason::NextTimeStep,
        sys::cbStartOfSimulation => CallbackReason::StartOfSimulation,
        sys::cbEndOfSimulation => CallbackReason::EndOfSimulation,
        _ => return None,
    })
}

/// Native trampoline for every VPI callback reason.
unsafe extern "C" fn vpi_trampoline(data: *mut sys::s_cb_data) -> sys::PLI_INT32 {
    if data.is_null() || (*data).user_data.is_null() {
        error!("VPI callback delivered without user data");
        return 0;
    }
    let user_data = *((*data).user_data as *const UserData);
    registry::deliver(user_data, callback_reason((*data).reason));
    0
}

unsafe extern "C" fn gpi_vpi_entry() {
    let config = GpiConfig::from_env().unwrap_or_else(|err| {
        warn!("ignoring environment configuration: {err}");
        GpiConfig::default()
    });
    if let Err(err) = registry::startup(Box::new(VpiBackend::new()), config) {
        error!("GPI startup failed: {err}");
    }
}

/// Startup table the simulator scans when it loads the library.
#[no_mangle]
#[used]
pub static vlog_startup_routines: [sys::StartupRoutine; 2] = [Some(gpi_vpi_entry), None];
